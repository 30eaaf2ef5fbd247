//! Diagnostic records emitted while the model works.

use std::fmt;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

/// Severity and purpose of a [`Notification`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// Progress of an operation.
    Information,
    /// Tabulated intermediate values.
    Data,
    /// A fallback was taken.
    Warning,
    /// An operation failed.
    Error,
}

/// A diagnostic record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// What kind of record this is.
    pub kind: NotificationKind,
    /// Model operation that emitted it.
    pub method: String,
    /// Free text, possibly multi-line.
    pub message: String,
}

impl Notification {
    /// Create a new notification.
    pub fn new(
        kind: NotificationKind,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            method: method.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.method, self.message)
    }
}

/// Receiver of the model's notifications.
pub trait NotificationSink: Send + Sync {
    /// Handle one notification. Called with the model lock held, so it must not call back into
    /// the model.
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to the `log` facade.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Information => info!("{}: {}", n.method, n.message),
            NotificationKind::Data => debug!("{}: {}", n.method, n.message),
            NotificationKind::Warning => warn!("{}: {}", n.method, n.message),
            NotificationKind::Error => error!("{}: {}", n.method, n.message),
        }
    }
}
