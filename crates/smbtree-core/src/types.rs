//! Core item model for the SMB network neighborhood.
//!
//! The neighborhood is a strict hierarchy: workgroups contain hosts, hosts
//! expose shares, shares hold directories and files. Every item carries an
//! identity key ([`ItemKey`]) whose components are stored uppercased so that
//! equality is case-insensitive.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

// ── Identity ──────────────────────────────────────────────────────

/// Case-insensitive identity of an item in the network model.
///
/// Always build keys through the constructors; they normalise every
/// component so two sightings of the same resource compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemKey {
    /// The root of the neighborhood.
    Network,
    Workgroup {
        workgroup: String,
    },
    Host {
        workgroup: String,
        host: String,
    },
    Share {
        workgroup: String,
        host: String,
        share: String,
    },
    /// A file or directory, `path` relative to the share root.
    File {
        workgroup: String,
        host: String,
        share: String,
        path: String,
    },
}

impl ItemKey {
    pub fn workgroup(workgroup: &str) -> Self {
        Self::Workgroup {
            workgroup: normalize(workgroup),
        }
    }

    pub fn host(workgroup: &str, host: &str) -> Self {
        Self::Host {
            workgroup: normalize(workgroup),
            host: normalize_host(host),
        }
    }

    pub fn share(workgroup: &str, host: &str, share: &str) -> Self {
        Self::Share {
            workgroup: normalize(workgroup),
            host: normalize_host(host),
            share: normalize(share),
        }
    }

    pub fn file(workgroup: &str, host: &str, share: &str, path: &str) -> Self {
        Self::File {
            workgroup: normalize(workgroup),
            host: normalize_host(host),
            share: normalize(share),
            path: normalize_path(path).to_uppercase(),
        }
    }

    /// The key of the scope this item is listed under.
    pub fn parent(&self) -> Option<ItemKey> {
        match self {
            Self::Network => None,
            Self::Workgroup { .. } => Some(Self::Network),
            Self::Host { workgroup, .. } => Some(Self::Workgroup {
                workgroup: workgroup.clone(),
            }),
            Self::Share {
                workgroup, host, ..
            } => Some(Self::Host {
                workgroup: workgroup.clone(),
                host: host.clone(),
            }),
            Self::File {
                workgroup,
                host,
                share,
                path,
            } => match path.rsplit_once('/') {
                Some((dir, _)) => Some(Self::File {
                    workgroup: workgroup.clone(),
                    host: host.clone(),
                    share: share.clone(),
                    path: dir.to_string(),
                }),
                None => Some(Self::Share {
                    workgroup: workgroup.clone(),
                    host: host.clone(),
                    share: share.clone(),
                }),
            },
        }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "<network>"),
            Self::Workgroup { workgroup } => write!(f, "{workgroup}"),
            Self::Host { workgroup, host } => write!(f, "{workgroup}/{host}"),
            Self::Share {
                workgroup,
                host,
                share,
            } => write!(f, "{workgroup}//{host}/{share}"),
            Self::File {
                workgroup,
                host,
                share,
                path,
            } => write!(f, "{workgroup}//{host}/{share}/{path}"),
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Reduce a host component to its bare name: userinfo and port are dropped.
///
/// `bob@SRV1:445` → `SRV1`, `[fe80::1]:445` → `FE80::1`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host.rsplit_once('@').map_or(host, |(_, h)| h);

    let bare = if let Some(rest) = host.strip_prefix('[') {
        rest.split_once(']').map_or(rest, |(h, _)| h)
    } else if host.matches(':').count() == 1 {
        // Exactly one colon means host:port; more would be a bare IPv6 literal.
        host.split_once(':').map_or(host, |(h, _)| h)
    } else {
        host
    };

    bare.to_uppercase()
}

/// Relative share path with `/` separators and no leading or trailing slash.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

// ── Supporting enums ──────────────────────────────────────────────

/// The kind of enumeration or action a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    LookupDomains,
    LookupDomainMembers,
    LookupShares,
    LookupFiles,
    PrintFile,
    WakeUp,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LookupDomains => "lookup-domains",
            Self::LookupDomainMembers => "lookup-domain-members",
            Self::LookupShares => "lookup-shares",
            Self::LookupFiles => "lookup-files",
            Self::PrintFile => "print-file",
            Self::WakeUp => "wake-up",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareType {
    #[default]
    File,
    Printer,
    Ipc,
}

/// Type discriminator over [`NetworkItem`], splitting files from directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Network,
    Workgroup,
    Host,
    Share,
    Directory,
    File,
}

/// Login and password handed out by the credential provider.
///
/// Transient: never serialised with the model, never printed.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub login: Option<String>,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            login: Some(login.into()),
            password: Some(password.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.login.as_deref().map_or(true, str::is_empty)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

// ── Items ─────────────────────────────────────────────────────────

/// A workgroup or NT domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workgroup {
    pub name: String,
    pub master_browser_name: Option<String>,
    pub master_browser_ip: Option<IpAddr>,
    pub comment: Option<String>,
}

impl Workgroup {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            master_browser_name: None,
            master_browser_ip: None,
            comment: None,
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::workgroup(&self.name)
    }

    /// Whether `host` is this workgroup's recorded master browser.
    pub fn is_master_browser(&self, host: &str) -> bool {
        self.master_browser_name
            .as_deref()
            .is_some_and(|master| normalize_host(master) == normalize_host(host))
    }
}

/// A server advertised in a workgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    pub workgroup: String,
    pub name: String,
    pub ip: Option<IpAddr>,
    pub comment: Option<String>,
    pub is_master_browser: bool,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Host {
    pub fn new(workgroup: &str, name: &str) -> Self {
        Self {
            workgroup: workgroup.to_string(),
            name: name.to_string(),
            ip: None,
            comment: None,
            is_master_browser: false,
            credentials: Credentials::default(),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::host(&self.workgroup, &self.name)
    }
}

/// A file, printer or IPC resource exported by a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Share {
    pub workgroup: String,
    pub host: String,
    pub name: String,
    pub host_ip: Option<IpAddr>,
    pub comment: Option<String>,
    pub share_type: ShareType,
    /// Mount status, maintained by the mounter and only read here.
    pub mounted: bool,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl Share {
    pub fn new(workgroup: &str, host: &str, name: &str) -> Self {
        Self {
            workgroup: workgroup.to_string(),
            host: host.to_string(),
            name: name.to_string(),
            host_ip: None,
            comment: None,
            share_type: ShareType::File,
            mounted: false,
            credentials: Credentials::default(),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::share(&self.workgroup, &self.host, &self.name)
    }

    /// Administrative shares end in `$` and are hidden by default.
    pub fn is_hidden(&self) -> bool {
        self.name.ends_with('$')
    }

    pub fn is_printer(&self) -> bool {
        self.share_type == ShareType::Printer
    }

    /// UNC form, `//HOST/SHARE`.
    pub fn unc(&self) -> String {
        format!("//{}/{}", self.host, self.name)
    }

    /// The share's root directory, as the parent of its top-level entries.
    pub fn root(&self) -> FileItem {
        FileItem {
            workgroup: self.workgroup.clone(),
            host: self.host.clone(),
            share: self.name.clone(),
            path: String::new(),
            is_directory: true,
            host_ip: self.host_ip,
            credentials: self.credentials.clone(),
        }
    }
}

/// A file or directory inside a share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub workgroup: String,
    pub host: String,
    pub share: String,
    /// Path relative to the share root, `/` separated.
    pub path: String,
    pub is_directory: bool,
    pub host_ip: Option<IpAddr>,
    #[serde(skip)]
    pub credentials: Credentials,
}

impl FileItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::file(&self.workgroup, &self.host, &self.share, &self.path)
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The share this item lives in, carrying over any credentials.
    pub fn share_item(&self) -> Share {
        let mut share = Share::new(&self.workgroup, &self.host, &self.share);
        share.host_ip = self.host_ip;
        share.credentials = self.credentials.clone();
        share
    }
}

/// Tagged union over every entity the browser knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkItem {
    Network,
    Workgroup(Workgroup),
    Host(Host),
    Share(Share),
    File(FileItem),
}

impl NetworkItem {
    pub fn key(&self) -> ItemKey {
        match self {
            Self::Network => ItemKey::Network,
            Self::Workgroup(w) => w.key(),
            Self::Host(h) => h.key(),
            Self::Share(s) => s.key(),
            Self::File(f) => f.key(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Network => "",
            Self::Workgroup(w) => &w.name,
            Self::Host(h) => &h.name,
            Self::Share(s) => &s.name,
            Self::File(f) => f.name(),
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Network => ItemType::Network,
            Self::Workgroup(_) => ItemType::Workgroup,
            Self::Host(_) => ItemType::Host,
            Self::Share(_) => ItemType::Share,
            Self::File(f) if f.is_directory => ItemType::Directory,
            Self::File(_) => ItemType::File,
        }
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Self::Network => None,
            Self::Workgroup(w) => w.master_browser_ip,
            Self::Host(h) => h.ip,
            Self::Share(s) => s.host_ip,
            Self::File(f) => f.host_ip,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        match self {
            Self::Workgroup(w) => w.comment.as_deref(),
            Self::Host(h) => h.comment.as_deref(),
            Self::Share(s) => s.comment.as_deref(),
            Self::Network | Self::File(_) => None,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Self::Host(h) => Some(&h.credentials),
            Self::Share(s) => Some(&s.credentials),
            Self::File(f) => Some(&f.credentials),
            Self::Network | Self::Workgroup(_) => None,
        }
    }

    /// Attach credentials. Network and workgroup items have nowhere to keep
    /// them and ignore the call.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        match self {
            Self::Host(h) => h.credentials = credentials,
            Self::Share(s) => s.credentials = credentials,
            Self::File(f) => f.credentials = credentials,
            Self::Network | Self::Workgroup(_) => {}
        }
    }

    /// Sibling ordering key.
    pub fn sort_key(&self) -> String {
        self.name().to_uppercase()
    }

    /// The scoped address an enumerator is pointed at for this item.
    pub fn address(&self) -> SmbAddress {
        match self {
            Self::Network => SmbAddress::default(),
            Self::Workgroup(w) => SmbAddress {
                workgroup: Some(w.name.clone()),
                ..Default::default()
            },
            Self::Host(h) => SmbAddress {
                workgroup: Some(h.workgroup.clone()),
                host: Some(h.name.clone()),
                user: h.credentials.login.clone(),
                ..Default::default()
            },
            Self::Share(s) => SmbAddress {
                workgroup: Some(s.workgroup.clone()),
                host: Some(s.host.clone()),
                share: Some(s.name.clone()),
                user: s.credentials.login.clone(),
                ..Default::default()
            },
            Self::File(f) => SmbAddress {
                workgroup: Some(f.workgroup.clone()),
                host: Some(f.host.clone()),
                share: Some(f.share.clone()),
                path: Some(f.path.clone()),
                user: f.credentials.login.clone(),
            },
        }
    }
}

/// A scoped `smb://` address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbAddress {
    pub workgroup: Option<String>,
    pub host: Option<String>,
    pub share: Option<String>,
    pub path: Option<String>,
    pub user: Option<String>,
}

impl fmt::Display for SmbAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("smb://")?;
        if let Some(user) = self.user.as_deref().filter(|u| !u.is_empty()) {
            write!(f, "{user}@")?;
        }
        match (&self.host, &self.workgroup) {
            (Some(host), _) => f.write_str(host)?,
            (None, Some(workgroup)) => return f.write_str(workgroup),
            (None, None) => return Ok(()),
        }
        if let Some(share) = &self.share {
            write!(f, "/{share}")?;
            if let Some(path) = self.path.as_deref().filter(|p| !p.is_empty()) {
                write!(f, "/{path}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_compare_case_insensitively() {
        assert_eq!(ItemKey::host("wg1", "srv1"), ItemKey::host("WG1", "Srv1"));
        assert_eq!(
            ItemKey::share("wg1", "srv1", "data"),
            ItemKey::share("WG1", "SRV1", "DATA")
        );
        assert_ne!(
            ItemKey::share("wg1", "srv1", "data"),
            ItemKey::share("wg2", "srv1", "data")
        );
    }

    #[test]
    fn share_key_ignores_userinfo_and_port() {
        assert_eq!(
            ItemKey::share("WG", "bob@srv1:445", "data"),
            ItemKey::share("WG", "SRV1", "DATA")
        );
        assert_eq!(normalize_host("[fe80::1]:445"), "FE80::1");
        assert_eq!(normalize_host("fe80::1"), "FE80::1");
        assert_eq!(normalize_host("10.0.0.1:139"), "10.0.0.1");
    }

    #[test]
    fn parent_chain_walks_to_network() {
        let file = ItemKey::file("wg", "srv", "data", "docs\\2024\\report.pdf");
        let dir = file.parent().unwrap();
        assert_eq!(dir, ItemKey::file("wg", "srv", "data", "docs/2024"));
        let top = dir.parent().unwrap().parent().unwrap();
        assert_eq!(top, ItemKey::share("wg", "srv", "data"));
        let host = top.parent().unwrap();
        assert_eq!(host, ItemKey::host("wg", "srv"));
        assert_eq!(host.parent().unwrap().parent(), Some(ItemKey::Network));
    }

    #[test]
    fn hidden_and_printer_shares() {
        let mut share = Share::new("WG", "SRV", "ADMIN$");
        assert!(share.is_hidden());
        assert!(!share.is_printer());
        share.share_type = ShareType::Printer;
        assert!(share.is_printer());
        assert_eq!(share.unc(), "//SRV/ADMIN$");
    }

    #[test]
    fn address_rendering() {
        let mut share = Share::new("WG", "SRV", "DATA");
        share.credentials = Credentials::new("bob", "secret");
        assert_eq!(
            NetworkItem::Share(share).address().to_string(),
            "smb://bob@SRV/DATA"
        );
        assert_eq!(
            NetworkItem::Workgroup(Workgroup::new("WG")).address().to_string(),
            "smb://WG"
        );
        assert_eq!(NetworkItem::Network.address().to_string(), "smb://");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("bob", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bob"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn file_item_name_and_type() {
        let file = FileItem {
            workgroup: "WG".into(),
            host: "SRV".into(),
            share: "DATA".into(),
            path: "docs/Report.pdf".into(),
            is_directory: false,
            host_ip: None,
            credentials: Credentials::default(),
        };
        assert_eq!(file.name(), "Report.pdf");
        assert_eq!(NetworkItem::File(file).item_type(), ItemType::File);
    }

    #[test]
    fn item_serialization_skips_credentials() {
        let mut host = Host::new("WG", "SRV");
        host.credentials = Credentials::new("bob", "secret");
        let json = serde_json::to_string(&NetworkItem::Host(host)).unwrap();
        assert!(json.contains("\"type\":\"host\""));
        assert!(!json.contains("secret"));
    }
}
