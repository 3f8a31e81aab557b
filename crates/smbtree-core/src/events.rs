//! Events produced by the browser.
//!
//! Lifecycle and model-changed events are fanned out to any number of
//! subscribers. Notifications are failures meant for the user and go to the
//! notification sink instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ItemKey, ProcessKind};

/// Unique identifier for an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl BrowseEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Job lifecycle ─────────────────────────────────────────
    AboutToStart {
        scope: ItemKey,
        process: ProcessKind,
    },
    Finished {
        scope: ItemKey,
        process: ProcessKind,
    },

    // ── Model changes ─────────────────────────────────────────
    WorkgroupsChanged,
    HostsChanged {
        workgroup: ItemKey,
    },
    SharesChanged {
        host: ItemKey,
    },
    FilesChanged {
        parent: ItemKey,
    },
}

/// User-facing failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notification", rename_all = "snake_case")]
pub enum Notification {
    CommandNotFound { command: String },
    CommunicationFailed { scope: ItemKey, details: String },
    MimetypeUnsupported { mimetype: String },
}
