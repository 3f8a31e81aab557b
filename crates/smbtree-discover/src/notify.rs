//! Notification sink seam.

use smbtree_core::Notification;

/// Receives user-facing failure reports. Fire and forget.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::CommandNotFound { command } => {
                tracing::warn!(command = %command, "Required command not found");
            }
            Notification::CommunicationFailed { scope, details } => {
                tracing::warn!(scope = %scope, details = %details, "Network communication failed");
            }
            Notification::MimetypeUnsupported { mimetype } => {
                tracing::warn!(mimetype = %mimetype, "Mimetype not supported for printing");
            }
        }
    }
}
