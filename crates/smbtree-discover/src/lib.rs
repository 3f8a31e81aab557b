//! smbtree-discover: SMB network discovery and reconciliation engine.
//!
//! Enumerates workgroups, hosts, shares and files through a pluggable
//! directory enumerator, runs every enumeration as an asynchronous job,
//! merges job results into the shared network model and retries once with
//! fresh credentials when a lookup is refused.

pub mod auth;
pub mod config;
pub mod convert;
pub mod credentials;
pub mod enumerator;
pub mod error;
pub mod job;
pub mod mimetype;
pub mod notify;
pub mod reconcile;
pub mod resolver;
pub mod scheduler;
pub mod smbclient;
pub mod wol;

pub use enumerator::{DirectoryEnumerator, EnumerationRequest, Entry, PrintRequest};
pub use error::{DiscoverError, Result};
pub use scheduler::NetworkController;
