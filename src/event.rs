//! Board events and the notifications published to the UI layer.
//!
//! [`BoardEvent`] is what the inspector extracts from a console line.
//! [`Notification`] is the wire form: a kind name plus string fields, with
//! free-form text base64 encoded so it can travel through any message channel.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

/// Maximum number of notifications buffered per subscriber.
const EVENT_BUFFER_SIZE: usize = 256;

/// Something the board reported on its console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    PowerOnReset,
    SoftwareReset,
    DeepSleepReset,
    BlockStart {
        block: String,
    },
    BlockEnd {
        block: String,
    },
    BlockError {
        block: String,
        error: String,
    },
    /// A Lua error line, `where:line: code: message`.
    ///
    /// `code` is `"0"` when the board did not print one.
    RuntimeError {
        location: String,
        line: String,
        code: String,
        message: String,
    },
}

impl BoardEvent {
    /// Convert into the notification published for this event.
    pub fn to_notification(&self) -> Notification {
        match self {
            Self::PowerOnReset => Notification::new(NotificationKind::BoardPowerOnReset),
            Self::SoftwareReset => Notification::new(NotificationKind::BoardSoftwareReset),
            Self::DeepSleepReset => Notification::new(NotificationKind::BoardDeepSleepReset),
            Self::BlockStart { block } => {
                Notification::new(NotificationKind::BlockStart).with_encoded("block", block)
            }
            Self::BlockEnd { block } => {
                Notification::new(NotificationKind::BlockEnd).with_encoded("block", block)
            }
            Self::BlockError { block, error } => Notification::new(NotificationKind::BlockError)
                .with_encoded("block", block)
                .with_encoded("error", error),
            Self::RuntimeError {
                location,
                line,
                code,
                message,
            } => Notification::new(NotificationKind::BoardRuntimeError)
                .with_field("where", location)
                .with_field("line", line)
                .with_field("exception", code)
                .with_encoded("message", message),
        }
    }
}

/// Notification kinds understood by the IDE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationKind {
    BoardAttached,
    BoardDetached,
    BoardPowerOnReset,
    BoardSoftwareReset,
    BoardDeepSleepReset,
    BlockStart,
    BlockEnd,
    BlockError,
    BoardRuntimeError,
    BoardUpdate,
}

impl NotificationKind {
    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BoardAttached => "boardAttached",
            Self::BoardDetached => "boardDetached",
            Self::BoardPowerOnReset => "boardPowerOnReset",
            Self::BoardSoftwareReset => "boardSoftwareReset",
            Self::BoardDeepSleepReset => "boardDeepSleepReset",
            Self::BlockStart => "blockStart",
            Self::BlockEnd => "blockEnd",
            Self::BlockError => "blockError",
            Self::BoardRuntimeError => "boardRuntimeError",
            Self::BoardUpdate => "boardUpdate",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with no fields.
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Progress message for long running operations.
    pub fn update(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::BoardUpdate).with_field("message", message)
    }

    /// Add a plain text field.
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Add a field whose value is base64 encoded.
    pub fn with_encoded(mut self, key: &str, value: &str) -> Self {
        self.fields
            .insert(key.to_string(), BASE64.encode(value.as_bytes()));
        self
    }

    /// Get a field value as sent on the wire.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Decode a base64 field back to text.
    pub fn decoded(&self, key: &str) -> Option<String> {
        let raw = self.fields.get(key)?;
        let bytes = BASE64.decode(raw).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Fan-out channel for notifications.
///
/// Publishing never blocks; with no subscriber the notification is dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Notification>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { tx }
    }

    /// Publish a notification to every current subscriber.
    pub fn publish(&self, notification: Notification) {
        tracing::debug!(kind = %notification.kind, fields = ?notification.fields, "notify");
        // Ignore send errors - they just mean no active receivers
        let _ = self.tx.send(notification);
    }

    /// Subscribe to notifications published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
