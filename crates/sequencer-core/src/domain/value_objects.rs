//! Value objects for the sequencing domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Wall-clock instant used for every persisted timestamp.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a sequence instance row.
pub type InstanceId = Uuid;

/// Identifier of a sequenced message row (shared by its buffered payload).
pub type MessageId = Uuid;

/// Separator between a base type and its resolved subtype.
pub const SUBTYPE_SEPARATOR: char = '.';

/// Qualified message type: `type` or `type.subtype`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Build `base.subtype`.
    pub fn with_subtype(base: &str, subtype: &str) -> Self {
        Self(format!("{base}{SUBTYPE_SEPARATOR}{subtype}"))
    }

    /// The base type, i.e. everything before the first separator.
    pub fn base_type(&self) -> &str {
        match self.0.split_once(SUBTYPE_SEPARATOR) {
            Some((base, _)) => base,
            None => &self.0,
        }
    }

    /// The resolved subtype, if this name carries one.
    pub fn subtype(&self) -> Option<&str> {
        self.0.split_once(SUBTYPE_SEPARATOR).map(|(_, sub)| sub)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Lifecycle of a sequence instance. `Closed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    Open,
    Closed,
}

/// Lifecycle of a sequenced message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    /// Buffered until its release condition holds.
    Waiting,
    /// Delivered to its handler successfully.
    Processed,
    /// Handler or decoding failed, or the message was expired.
    Failed,
    /// Claimed by the delivery or release whose handler is running now.
    InFlight,
}

impl MessageState {
    /// Rows in these states turn a redelivery into a duplicate.
    pub fn blocks_redelivery(self) -> bool {
        matches!(
            self,
            MessageState::Waiting | MessageState::Processed | MessageState::InFlight
        )
    }
}

/// Administrative override attached to a sequence instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstancePendingAction {
    /// Force the instance to CLOSED.
    Close,
    /// Force-release every waiting message, then close if complete.
    ConsumeAll,
}

/// Administrative override attached to a single sequenced message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagePendingAction {
    /// Release regardless of predecessor state.
    Consume,
    /// Discard without invoking the handler.
    Expire,
}

/// One broker record header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordHeader {
    pub key: String,
    pub value: Vec<u8>,
}

impl RecordHeader {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Result of an insert guarded by a unique constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The row was written.
    Inserted(T),
    /// A row with the same unique key already exists.
    Conflict,
}
