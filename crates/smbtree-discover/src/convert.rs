//! Conversion of raw enumerator entries into typed network items.
//!
//! Runs inside the job, before reconciliation, so that address lookups
//! happen off the model lock. Entries that make no sense for the scope
//! that was enumerated are ignored.

use smbtree_core::types::normalize_path;
use smbtree_core::{BrowseSettings, FileItem, Host, NetworkItem, Share, ShareType, Workgroup};

use crate::enumerator::{DirectoryEnumerator, Entry};

/// Turn the entries found below `scope` into children of `scope`.
pub async fn entries_to_items(
    scope: &NetworkItem,
    entries: Vec<Entry>,
    enumerator: &dyn DirectoryEnumerator,
    settings: &BrowseSettings,
) -> Vec<NetworkItem> {
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let item = match scope {
            NetworkItem::Network => to_workgroup(entry, enumerator, settings).await,
            NetworkItem::Workgroup(workgroup) => {
                to_host(workgroup, entry, enumerator, settings).await
            }
            NetworkItem::Host(host) => to_share(host, entry),
            NetworkItem::Share(share) => to_file(&share.root(), entry),
            NetworkItem::File(dir) if dir.is_directory => to_file(dir, entry),
            NetworkItem::File(_) => None,
        };
        items.extend(item);
    }

    items
}

async fn to_workgroup(
    entry: Entry,
    enumerator: &dyn DirectoryEnumerator,
    settings: &BrowseSettings,
) -> Option<NetworkItem> {
    let Entry::Workgroup {
        name,
        master_browser,
        master_ip,
    } = entry
    else {
        tracing::trace!("Ignoring non-workgroup entry in domain listing");
        return None;
    };

    let master_browser_ip = match (master_ip, &master_browser) {
        (Some(ip), _) => Some(ip),
        (None, Some(master)) => enumerator.resolve_address(master).await,
        (None, None) => None,
    };

    if master_browser.is_some() && master_browser_ip.is_none() && settings.drop_unresolved_items {
        tracing::debug!(workgroup = %name, "Dropping workgroup with unresolvable master browser");
        return None;
    }

    Some(NetworkItem::Workgroup(Workgroup {
        name,
        master_browser_name: master_browser,
        master_browser_ip,
        comment: None,
    }))
}

async fn to_host(
    workgroup: &Workgroup,
    entry: Entry,
    enumerator: &dyn DirectoryEnumerator,
    settings: &BrowseSettings,
) -> Option<NetworkItem> {
    let Entry::Server { name, comment, ip } = entry else {
        tracing::trace!(workgroup = %workgroup.name, "Ignoring non-server entry in workgroup listing");
        return None;
    };

    let ip = match ip {
        Some(ip) => Some(ip),
        None => enumerator.resolve_address(&name).await,
    };

    if ip.is_none() && settings.drop_unresolved_items {
        tracing::debug!(host = %name, "Dropping host with unresolvable address");
        return None;
    }

    let mut host = Host::new(&workgroup.name, &name);
    host.ip = ip;
    host.comment = comment.filter(|c| !c.is_empty());
    Some(NetworkItem::Host(host))
}

fn to_share(host: &Host, entry: Entry) -> Option<NetworkItem> {
    let (name, comment, share_type) = match entry {
        Entry::FileShare { name, comment } => (name, comment, ShareType::File),
        Entry::PrinterShare { name, comment } => (name, comment, ShareType::Printer),
        Entry::IpcShare { name, comment } => (name, comment, ShareType::Ipc),
        other => {
            tracing::trace!(entry = ?other, "Ignoring non-share entry in host listing");
            return None;
        }
    };

    let mut share = Share::new(&host.workgroup, &host.name, &name);
    share.host_ip = host.ip;
    share.comment = comment.filter(|c| !c.is_empty());
    share.share_type = share_type;
    share.credentials = host.credentials.clone();
    Some(NetworkItem::Share(share))
}

fn to_file(parent: &FileItem, entry: Entry) -> Option<NetworkItem> {
    let (name, is_directory) = match entry {
        Entry::Directory { name } => (name, true),
        Entry::File { name } => (name, false),
        other => {
            tracing::trace!(entry = ?other, "Ignoring entry in directory listing");
            return None;
        }
    };
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }

    let path = if parent.path.is_empty() {
        normalize_path(&name)
    } else {
        normalize_path(&format!("{}/{}", parent.path, name))
    };

    Some(NetworkItem::File(FileItem {
        workgroup: parent.workgroup.clone(),
        host: parent.host.clone(),
        share: parent.share.clone(),
        path,
        is_directory,
        host_ip: parent.host_ip,
        credentials: parent.credentials.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use async_trait::async_trait;
    use smbtree_core::ItemKey;

    use crate::enumerator::{EnumerationRequest, PrintRequest};
    use crate::error::Result;

    /// Resolves `SRV*` names to 10.0.0.x and nothing else.
    struct FakeResolver;

    #[async_trait]
    impl DirectoryEnumerator for FakeResolver {
        async fn enumerate(&self, _request: &EnumerationRequest) -> Result<Vec<Entry>> {
            Ok(Vec::new())
        }

        async fn resolve_address(&self, name: &str) -> Option<IpAddr> {
            let n: u8 = name.strip_prefix("SRV")?.parse().ok()?;
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)))
        }

        async fn print(&self, _request: &PrintRequest) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_workgroup_master_ip_is_resolved() {
        let entries = vec![Entry::Workgroup {
            name: "WG1".into(),
            master_browser: Some("SRV7".into()),
            master_ip: None,
        }];
        let items = entries_to_items(
            &NetworkItem::Network,
            entries,
            &FakeResolver,
            &BrowseSettings::default(),
        )
        .await;

        let NetworkItem::Workgroup(wg) = &items[0] else {
            panic!("expected workgroup");
        };
        assert_eq!(wg.master_browser_ip, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))));
    }

    #[tokio::test]
    async fn test_unresolved_hosts_kept_unless_dropping() {
        let scope = NetworkItem::Workgroup(Workgroup::new("WG1"));
        let entries = vec![
            Entry::Server {
                name: "SRV1".into(),
                comment: Some(String::new()),
                ip: None,
            },
            Entry::Server {
                name: "LAPTOP".into(),
                comment: None,
                ip: None,
            },
        ];

        let kept =
            entries_to_items(&scope, entries.clone(), &FakeResolver, &BrowseSettings::default())
                .await;
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].ip(), None);
        assert_eq!(kept[0].comment(), None);

        let settings = BrowseSettings {
            drop_unresolved_items: true,
            ..Default::default()
        };
        let dropped = entries_to_items(&scope, entries, &FakeResolver, &settings).await;
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].key(), ItemKey::host("WG1", "SRV1"));
    }

    #[tokio::test]
    async fn test_shares_inherit_host_address() {
        let mut host = Host::new("WG1", "SRV1");
        host.ip = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        let entries = vec![
            Entry::FileShare {
                name: "DATA".into(),
                comment: Some("Data".into()),
            },
            Entry::PrinterShare {
                name: "PRINT".into(),
                comment: None,
            },
            Entry::Directory { name: "stray".into() },
        ];
        let items = entries_to_items(
            &NetworkItem::Host(host),
            entries,
            &FakeResolver,
            &BrowseSettings::default(),
        )
        .await;

        assert_eq!(items.len(), 2);
        let NetworkItem::Share(printer) = &items[1] else {
            panic!("expected share");
        };
        assert!(printer.is_printer());
        assert_eq!(printer.host_ip, Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
    }

    #[tokio::test]
    async fn test_file_paths_are_joined() {
        let share = Share::new("WG1", "SRV1", "DATA");
        let entries = vec![
            Entry::Directory { name: ".".into() },
            Entry::Directory { name: "docs".into() },
            Entry::File { name: "a.txt".into() },
            Entry::UnsupportedLink { name: "lnk".into() },
        ];
        let items = entries_to_items(
            &NetworkItem::Share(share),
            entries,
            &FakeResolver,
            &BrowseSettings::default(),
        )
        .await;
        assert_eq!(items.len(), 2);

        let NetworkItem::File(docs) = items[0].clone() else {
            panic!("expected directory");
        };
        assert!(docs.is_directory);
        let nested = entries_to_items(
            &NetworkItem::File(docs),
            vec![Entry::File { name: "b.txt".into() }],
            &FakeResolver,
            &BrowseSettings::default(),
        )
        .await;
        assert_eq!(nested[0].key(), ItemKey::file("WG1", "SRV1", "DATA", "docs/b.txt"));
    }
}
