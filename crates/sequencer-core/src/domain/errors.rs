//! # Domain Errors
//!
//! - Configuration errors are fatal at startup.
//! - Unconfigured types are fatal at message time.
//! - Decode and handler failures are recovered at the state layer.
//! - Store errors surface unchanged through [`SequencingError::Store`].

use super::value_objects::{InstanceId, MessageId, QualifiedName};
use thiserror::Error;

/// Invalid or inconsistent sequencing configuration document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Malformed configuration document: {0}")]
    Malformed(String),

    #[error("Failed to read configuration document {path}: {message}")]
    Io { path: String, message: String },

    #[error("Sequence '{0}' is declared more than once")]
    DuplicateSequence(String),

    #[error("Sequence '{sequence}' must declare a retention period greater than zero that fits the timestamp range")]
    InvalidRetention { sequence: String },

    #[error("Sequence '{0}' declares no message types")]
    EmptySequence(String),

    #[error("Message type '{0}' is declared more than once")]
    DuplicateMessageType(QualifiedName),

    #[error("Base type '{base_type}' is bound to conflicting topics/clusters: {first} vs {second}")]
    ConflictingTopic {
        base_type: String,
        first: String,
        second: String,
    },

    #[error("Message type '{0}' has no context id extractor")]
    MissingExtractor(QualifiedName),

    #[error("Message type '{qualified_name}' references unknown context id extractor '{name}'")]
    UnknownExtractor {
        qualified_name: QualifiedName,
        name: String,
    },

    #[error("Message type '{qualified_name}' references unknown message filter '{name}'")]
    UnknownFilter {
        qualified_name: QualifiedName,
        name: String,
    },

    #[error("Base type '{base_type}' references unknown subtype resolver '{name}'")]
    UnknownResolver { base_type: String, name: String },

    #[error("Message type '{0}' declares a subtype but its base type has no subtype resolver")]
    MissingResolver(QualifiedName),

    #[error("Message type '{0}' must declare a subtype: its base type has a subtype resolver")]
    MissingSubtypeQualifier(QualifiedName),

    #[error("Message type '{qualified_name}' declares subtype outside {base_type}'s enumeration")]
    UnexpectedSubtype {
        qualified_name: QualifiedName,
        base_type: String,
    },

    #[error("Subtype '{subtype}' of '{base_type}' is enumerated but never configured")]
    MissingSubtype { base_type: String, subtype: String },

    #[error("Release condition of '{qualified_name}' is malformed: {reason}")]
    MalformedCondition {
        qualified_name: QualifiedName,
        reason: String,
    },

    #[error("Release condition of '{qualified_name}' lists predecessor '{predecessor}' twice in one group")]
    DuplicatePredecessor {
        qualified_name: QualifiedName,
        predecessor: QualifiedName,
    },

    #[error("Release condition of '{qualified_name}' references unknown predecessor '{predecessor}'")]
    UnknownPredecessor {
        qualified_name: QualifiedName,
        predecessor: QualifiedName,
    },

    #[error("Message type '{0}' depends on itself through its release condition")]
    CyclicDependency(QualifiedName),

    #[error("Invalid sequencer setting: {0}")]
    InvalidSetting(String),
}

/// Failures raised by the storage ports.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Sequence instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("Sequenced message {0} not found")]
    MessageNotFound(MessageId),

    #[error("Lock on sequence instance {0} was lost (idle timeout exceeded)")]
    LockLost(InstanceId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Error returned by an application message handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Handler failed: {message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error decoding a buffered payload back into a business message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to decode buffered message: {0}")]
pub struct DecodeError(pub String);

/// Errors surfaced by the sequencing entry points.
#[derive(Debug, Error)]
pub enum SequencingError {
    /// A message type that no sequence declares reached the sequencer.
    #[error("Message type '{0}' is not configured in any sequence")]
    UnconfiguredType(QualifiedName),

    /// Insert lost a race but the winning row could not be re-read.
    #[error("Sequence instance ({sequence}, {context_id}) vanished after a creation conflict")]
    InstanceVanished { sequence: String, context_id: String },

    /// Handler failure on the immediate path; state already recorded as FAILED.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}
