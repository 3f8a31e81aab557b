//! Error types for the smbtree-discover crate.

use smbtree_core::NetworkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Command not found: {command}")]
    CommandNotFound { command: String },

    #[error("Unsupported mimetype: {mimetype}")]
    UnsupportedMimetype { mimetype: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiscoverError {
    /// The enumeration failure behind this error, if it is one.
    pub fn network(&self) -> Option<&NetworkError> {
        match self {
            Self::Network(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        self.network().is_some_and(NetworkError::is_access_denied)
    }
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
