//! Reconciliation: merge a job's fresh items into the network model.
//!
//! Each pass is scoped to the item the job enumerated. Children of the scope
//! that are missing from the fresh list are removed together with their
//! subtrees, known children are updated in place, new ones are attached.
//! The caller holds the model's write lock for the whole pass, so readers
//! never observe a half-applied result.

use std::collections::HashSet;
use std::sync::Arc;

use smbtree_core::types::normalize_path;
use smbtree_core::{
    EventPayload, FileItem, Host, ItemKey, NetworkItem, NetworkModel, SettingsProvider, Share,
    Workgroup,
};

/// Counts of direct children touched by one reconciliation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
}

impl ReconcileSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

pub struct Reconciler {
    settings: Arc<dyn SettingsProvider>,
}

impl Reconciler {
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Self {
        Self { settings }
    }

    /// Apply `fresh` below `scope`, dispatching on the scope's type.
    ///
    /// Returns `None` when the scope is no longer in the model or cannot
    /// have children; the model is then left untouched.
    pub fn apply(
        &self,
        model: &mut NetworkModel,
        scope: &NetworkItem,
        fresh: Vec<NetworkItem>,
    ) -> Option<(ReconcileSummary, EventPayload)> {
        let key = scope.key();
        if !model.contains(&key) {
            tracing::debug!(scope = %key, "Scope vanished before its result arrived");
            return None;
        }

        match scope {
            NetworkItem::Network => {
                let workgroups = fresh
                    .into_iter()
                    .filter_map(|item| match item {
                        NetworkItem::Workgroup(w) => Some(w),
                        _ => None,
                    })
                    .collect();
                Some((
                    self.process_workgroups(model, workgroups),
                    EventPayload::WorkgroupsChanged,
                ))
            }
            NetworkItem::Workgroup(_) => {
                let hosts = fresh
                    .into_iter()
                    .filter_map(|item| match item {
                        NetworkItem::Host(h) => Some(h),
                        _ => None,
                    })
                    .collect();
                let summary = self.process_hosts(model, &key, hosts);
                Some((summary, EventPayload::HostsChanged { workgroup: key }))
            }
            NetworkItem::Host(_) => {
                let shares = fresh
                    .into_iter()
                    .filter_map(|item| match item {
                        NetworkItem::Share(s) => Some(s),
                        _ => None,
                    })
                    .collect();
                let summary = self.process_shares(model, &key, shares);
                Some((summary, EventPayload::SharesChanged { host: key }))
            }
            NetworkItem::Share(_) | NetworkItem::File(FileItem { is_directory: true, .. }) => {
                let files = fresh
                    .into_iter()
                    .filter_map(|item| match item {
                        NetworkItem::File(f) => Some(f),
                        _ => None,
                    })
                    .collect();
                let summary = self.process_files(model, &key, files);
                Some((summary, EventPayload::FilesChanged { parent: key }))
            }
            NetworkItem::File(_) => None,
        }
    }

    /// Rebuild the workgroup list. New workgroups get a placeholder host for
    /// their master browser until their members are looked up.
    pub fn process_workgroups(
        &self,
        model: &mut NetworkModel,
        fresh: Vec<Workgroup>,
    ) -> ReconcileSummary {
        let fresh = fresh.into_iter().map(NetworkItem::Workgroup).collect();
        let (summary, added) = merge(model, &ItemKey::Network, fresh, update_workgroup);

        for key in model.child_keys(&ItemKey::Network).to_vec() {
            if added.contains(&key) {
                insert_master_placeholder(model, &key);
            } else {
                apply_master_flags(model, &key);
            }
        }

        summary
    }

    /// Rebuild a workgroup's host list and re-derive the master browser flag.
    pub fn process_hosts(
        &self,
        model: &mut NetworkModel,
        workgroup: &ItemKey,
        fresh: Vec<Host>,
    ) -> ReconcileSummary {
        let fresh = fresh.into_iter().map(NetworkItem::Host).collect();
        let (summary, _) = merge(model, workgroup, fresh, update_host);
        apply_master_flags(model, workgroup);
        summary
    }

    /// Rebuild a host's share list, honouring the visibility settings.
    pub fn process_shares(
        &self,
        model: &mut NetworkModel,
        host: &ItemKey,
        fresh: Vec<Share>,
    ) -> ReconcileSummary {
        let settings = self.settings.settings();
        let fresh = fresh
            .into_iter()
            .filter(|share| {
                if share.is_hidden() && !settings.detect_hidden_shares {
                    tracing::trace!(share = %share.unc(), "Hidden share filtered");
                    return false;
                }
                if share.is_printer() && !settings.detect_printer_shares {
                    tracing::trace!(share = %share.unc(), "Printer share filtered");
                    return false;
                }
                true
            })
            .map(NetworkItem::Share)
            .collect();

        merge(model, host, fresh, update_share).0
    }

    /// Rebuild the listing of a share or directory.
    pub fn process_files(
        &self,
        model: &mut NetworkModel,
        parent: &ItemKey,
        fresh: Vec<FileItem>,
    ) -> ReconcileSummary {
        let fresh = fresh.into_iter().map(NetworkItem::File).collect();
        merge(model, parent, fresh, update_file).0
    }

    /// Drop everything below `scope` after its lookup failed for good.
    pub fn clear_scope(&self, model: &mut NetworkModel, scope: &ItemKey) -> usize {
        model.clear_children(scope)
    }

    /// Make a directly addressed item and its ancestors known, so a lookup
    /// of it has somewhere to land. Items already in the model are kept as
    /// they are. Returns how many items were attached.
    pub fn seed(&self, model: &mut NetworkModel, item: NetworkItem) -> usize {
        let mut chain = vec![item];
        while let Some(parent) = chain.last().and_then(ancestor) {
            chain.push(parent);
        }

        let mut added = 0;
        for item in chain.into_iter().rev() {
            let key = item.key();
            if model.contains(&key) {
                continue;
            }
            if model.insert(item) {
                added += 1;
                if let Some(parent) = key.parent() {
                    model.sort_children(&parent);
                }
            }
        }
        added
    }
}

fn ancestor(item: &NetworkItem) -> Option<NetworkItem> {
    match item {
        NetworkItem::Network | NetworkItem::Workgroup(_) => None,
        NetworkItem::Host(h) => Some(NetworkItem::Workgroup(Workgroup::new(&h.workgroup))),
        NetworkItem::Share(s) => Some(NetworkItem::Host(Host::new(&s.workgroup, &s.host))),
        NetworkItem::File(f) => {
            let share = f.share_item();
            let path = normalize_path(&f.path);
            Some(match path.rsplit_once('/') {
                Some((parent, _)) => {
                    let mut dir = share.root();
                    dir.path = parent.to_string();
                    dir.is_directory = true;
                    NetworkItem::File(dir)
                }
                None => NetworkItem::Share(share),
            })
        }
    }
}

/// Removal pass, upsert pass, full resort. Returns the summary and the keys
/// of the children that were newly attached.
fn merge(
    model: &mut NetworkModel,
    scope: &ItemKey,
    fresh: Vec<NetworkItem>,
    update: fn(&mut NetworkItem, NetworkItem),
) -> (ReconcileSummary, Vec<ItemKey>) {
    let mut summary = ReconcileSummary::default();

    // First sighting of a key wins; items filed under another scope are ignored.
    let mut seen = HashSet::new();
    let fresh: Vec<NetworkItem> = fresh
        .into_iter()
        .filter(|item| {
            let key = item.key();
            key.parent().as_ref() == Some(scope) && seen.insert(key)
        })
        .collect();

    let stale: Vec<ItemKey> = model
        .child_keys(scope)
        .iter()
        .filter(|key| !seen.contains(*key))
        .cloned()
        .collect();
    for key in &stale {
        let count = model.remove(key);
        tracing::trace!(item = %key, cascade = count, "Removed vanished item");
        summary.removed += 1;
    }

    let mut added = Vec::new();
    for item in fresh {
        let key = item.key();
        if let Some(existing) = model.get_mut(&key) {
            let before = existing.clone();
            update(existing, item);
            if *existing != before {
                summary.updated += 1;
            }
            continue;
        }
        if model.insert(item) {
            summary.added += 1;
            added.push(key);
        }
    }

    model.sort_children(scope);
    (summary, added)
}

fn update_workgroup(existing: &mut NetworkItem, fresh: NetworkItem) {
    let (NetworkItem::Workgroup(old), NetworkItem::Workgroup(new)) = (existing, fresh) else {
        return;
    };

    if let Some(master) = new.master_browser_name {
        if old.is_master_browser(&master) {
            old.master_browser_ip = new.master_browser_ip.or(old.master_browser_ip);
        } else {
            old.master_browser_ip = new.master_browser_ip;
        }
        old.master_browser_name = Some(master);
    }
    old.comment = new.comment;
}

fn update_host(existing: &mut NetworkItem, fresh: NetworkItem) {
    let (NetworkItem::Host(old), NetworkItem::Host(new)) = (existing, fresh) else {
        return;
    };
    old.comment = new.comment;
    old.ip = new.ip.or(old.ip);
}

fn update_share(existing: &mut NetworkItem, fresh: NetworkItem) {
    let (NetworkItem::Share(old), NetworkItem::Share(new)) = (existing, fresh) else {
        return;
    };
    // Mount status and credentials belong to other components.
    old.comment = new.comment;
    old.share_type = new.share_type;
    old.host_ip = new.host_ip.or(old.host_ip);
}

fn update_file(existing: &mut NetworkItem, fresh: NetworkItem) {
    let (NetworkItem::File(old), NetworkItem::File(new)) = (existing, fresh) else {
        return;
    };
    old.is_directory = new.is_directory;
    old.host_ip = new.host_ip.or(old.host_ip);
}

fn insert_master_placeholder(model: &mut NetworkModel, workgroup: &ItemKey) {
    let Some(NetworkItem::Workgroup(wg)) = model.get(workgroup).cloned() else {
        return;
    };
    let Some(master) = wg.master_browser_name.as_deref() else {
        return;
    };

    let mut host = Host::new(&wg.name, master);
    host.ip = wg.master_browser_ip;
    host.is_master_browser = true;
    model.insert(NetworkItem::Host(host));
    model.sort_children(workgroup);
}

/// Flag the workgroup's recorded master browser and clear every other host.
fn apply_master_flags(model: &mut NetworkModel, workgroup: &ItemKey) {
    let Some(NetworkItem::Workgroup(wg)) = model.get(workgroup).cloned() else {
        return;
    };

    for key in model.child_keys(workgroup).to_vec() {
        if let Some(NetworkItem::Host(host)) = model.get_mut(&key) {
            host.is_master_browser = wg.is_master_browser(&host.name);
            if host.is_master_browser && host.ip.is_none() {
                host.ip = wg.master_browser_ip;
            }
        }
    }
}
