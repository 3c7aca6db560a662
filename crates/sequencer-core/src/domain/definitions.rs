//! # Sequence Definitions
//!
//! Immutable, validated configuration objects built once at startup by the
//! catalog loader. Per-message capabilities (context-id extraction,
//! filtering, subtype resolution) are narrow function values rather than
//! trait hierarchies so that each message type can plug in a closure.

use super::release::ReleaseCondition;
use super::value_objects::QualifiedName;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A decoded business message as seen by the sequencer.
pub trait SequencedPayload: Send + Sync + 'static {
    /// Base type name (before subtype resolution).
    fn message_type(&self) -> &str;

    /// Deduplication key, scoped to the qualified type.
    fn idempotence_id(&self) -> String;
}

/// Extract the context id; `None` means "do not sequence this message".
pub type ContextIdExtractor<M> = Arc<dyn Fn(&M) -> Option<String> + Send + Sync>;

/// Return `false` to bypass sequencing entirely.
pub type MessageFilter<M> = Arc<dyn Fn(&M) -> bool + Send + Sync>;

/// Resolve the subtype of a message from its enumerated subtype space.
pub type SubTypeResolver<M> = Arc<dyn Fn(&M) -> String + Send + Sync>;

/// One configured message type within a sequence definition.
pub struct MessageTypeSpec<M> {
    pub qualified_name: QualifiedName,
    pub topic: String,
    pub cluster: String,
    pub context_id_extractor: ContextIdExtractor<M>,
    pub message_filter: Option<MessageFilter<M>>,
    pub release_condition: Option<ReleaseCondition>,
}

impl<M> MessageTypeSpec<M> {
    /// Whether the message should go through sequencing at all.
    pub fn accepts(&self, message: &M) -> bool {
        self.message_filter.as_ref().map_or(true, |filter| filter(message))
    }

    pub fn context_id(&self, message: &M) -> Option<String> {
        (self.context_id_extractor)(message)
    }
}

impl<M> fmt::Debug for MessageTypeSpec<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTypeSpec")
            .field("qualified_name", &self.qualified_name)
            .field("topic", &self.topic)
            .field("cluster", &self.cluster)
            .field("has_filter", &self.message_filter.is_some())
            .field("release_condition", &self.release_condition)
            .finish()
    }
}

/// A named group of message types sharing one context and retention period.
pub struct SequenceDefinition<M> {
    pub name: String,
    pub retention_period: Duration,
    pub message_types: Vec<Arc<MessageTypeSpec<M>>>,
}

impl<M> SequenceDefinition<M> {
    /// Every qualified name this definition requires before it can close.
    pub fn required_types(&self) -> HashSet<QualifiedName> {
        self.message_types
            .iter()
            .map(|spec| spec.qualified_name.clone())
            .collect()
    }

    /// Complete iff the processed set is exactly the configured type set.
    pub fn is_complete(&self, processed: &HashSet<QualifiedName>) -> bool {
        processed.len() == self.message_types.len()
            && self
                .message_types
                .iter()
                .all(|spec| processed.contains(&spec.qualified_name))
    }

    pub fn spec(&self, name: &QualifiedName) -> Option<&Arc<MessageTypeSpec<M>>> {
        self.message_types
            .iter()
            .find(|spec| &spec.qualified_name == name)
    }

    /// Retention as a chrono duration, saturating at the chrono maximum.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retention_period).unwrap_or(chrono::Duration::MAX)
    }
}

impl<M> fmt::Debug for SequenceDefinition<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceDefinition")
            .field("name", &self.name)
            .field("retention_period", &self.retention_period)
            .field("message_types", &self.message_types)
            .finish()
    }
}
