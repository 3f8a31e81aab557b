//! smbtree-core: Shared types for the smbtree network browser.
//!
//! This crate provides the foundational pieces used by the discovery engine
//! and by anything rendering its results:
//! - The network item model (workgroups, hosts, shares, files) and identity keys
//! - The in-memory model arena with a shared read-write handle
//! - Events and user-facing notifications
//! - Browse settings
//! - The closed error taxonomy for enumeration failures

pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod types;

pub use config::{BrowseSettings, SettingsProvider, SharedSettings};
pub use error::{ErrorCategory, NetworkError};
pub use events::{BrowseEvent, EventPayload, Notification};
pub use model::{NetworkModel, SharedModel};
pub use types::{
    Credentials, FileItem, Host, ItemKey, ItemType, NetworkItem, ProcessKind, Share, ShareType,
    SmbAddress, Workgroup,
};
