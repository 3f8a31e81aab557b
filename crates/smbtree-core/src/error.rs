use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed taxonomy of failures an enumeration can end with.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("Out of memory")]
    OutOfMemory,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid address")]
    InvalidAddress,

    #[error("Address does not exist")]
    NotFound,

    #[error("Not a directory")]
    NotADirectory,

    #[error("Operation not permitted")]
    NotPermitted,

    #[error("Host unreachable")]
    HostUnreachable,

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Coarse grouping of [`NetworkError`] used to decide recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Resource,
    Input,
    NotFound,
    Permission,
    Structural,
    Unknown,
}

impl NetworkError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::OutOfMemory => ErrorCategory::Resource,
            Self::InvalidAddress => ErrorCategory::Input,
            Self::NotFound | Self::HostUnreachable => ErrorCategory::NotFound,
            Self::AccessDenied | Self::NotPermitted => ErrorCategory::Permission,
            Self::NotADirectory => ErrorCategory::Structural,
            Self::Unknown(_) => ErrorCategory::Unknown,
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied)
    }
}
