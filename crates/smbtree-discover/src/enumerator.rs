//! The directory enumerator contract.
//!
//! An enumerator speaks the SMB browsing protocols on the engine's behalf:
//! given a scoped address and credentials it returns the flat list of
//! entries found directly below that address.

use std::net::IpAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use smbtree_core::{Credentials, ProcessKind, Share, SmbAddress};

use crate::error::Result;
use crate::resolver;

/// One discovered sub-item, tagged by what the enumerator saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Workgroup {
        name: String,
        master_browser: Option<String>,
        master_ip: Option<IpAddr>,
    },
    Server {
        name: String,
        comment: Option<String>,
        ip: Option<IpAddr>,
    },
    FileShare {
        name: String,
        comment: Option<String>,
    },
    PrinterShare {
        name: String,
        comment: Option<String>,
    },
    IpcShare {
        name: String,
        comment: Option<String>,
    },
    Directory {
        name: String,
    },
    File {
        name: String,
    },
    UnsupportedLink {
        name: String,
    },
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Self::Workgroup { name, .. }
            | Self::Server { name, .. }
            | Self::FileShare { name, .. }
            | Self::PrinterShare { name, .. }
            | Self::IpcShare { name, .. }
            | Self::Directory { name }
            | Self::File { name }
            | Self::UnsupportedLink { name } => name,
        }
    }
}

/// Everything an enumerator needs for one call.
#[derive(Debug, Clone)]
pub struct EnumerationRequest {
    pub address: SmbAddress,
    pub process: ProcessKind,
    /// Known IP of the addressed host or master browser.
    pub ip: Option<IpAddr>,
    pub credentials: Credentials,
    /// Upper bound on master browsers consulted for a domain listing.
    pub max_master_browsers: Option<usize>,
}

/// A file to send to a printer share.
#[derive(Debug, Clone)]
pub struct PrintRequest {
    pub share: Share,
    pub file: PathBuf,
    pub copies: u32,
}

#[async_trait]
pub trait DirectoryEnumerator: Send + Sync {
    /// List the entries directly below `request.address`.
    ///
    /// Dropping the returned future must abort the underlying call.
    async fn enumerate(&self, request: &EnumerationRequest) -> Result<Vec<Entry>>;

    /// Resolve a NetBIOS or DNS name, preferring IPv4.
    async fn resolve_address(&self, name: &str) -> Option<IpAddr> {
        resolver::resolve_address(name).await
    }

    async fn print(&self, request: &PrintRequest) -> Result<()>;
}
