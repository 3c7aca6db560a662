//! Core entities: inbound records and the three persisted row types.

use super::value_objects::{
    InstanceId, InstancePendingAction, InstanceState, MessageId, MessagePendingAction,
    MessageState, QualifiedName, RecordHeader, Timestamp,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record as delivered by the broker consumer, before any decoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Vec<RecordHeader>,
    /// Propagated trace context, if the producer attached one.
    pub trace_context: Option<String>,
}

impl InboundRecord {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: Vec::new(),
            value: Vec::new(),
            headers: Vec::new(),
            trace_context: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_header(mut self, header: RecordHeader) -> Self {
        self.headers.push(header);
        self
    }

    pub fn with_trace_context(mut self, trace_context: impl Into<String>) -> Self {
        self.trace_context = Some(trace_context.into());
        self
    }

    /// Broker identity of the record: `topic-partition@offset`.
    pub fn message_id(&self) -> String {
        format!("{}-{}@{}", self.topic, self.partition, self.offset)
    }
}

/// Per-context state container for one sequence definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInstance {
    pub id: InstanceId,
    pub sequence_name: String,
    pub context_id: String,
    pub state: InstanceState,
    pub created_at: Timestamp,
    pub closed_at: Option<Timestamp>,
    pub retain_until: Timestamp,
    pub pending_action: Option<InstancePendingAction>,
}

impl SequenceInstance {
    /// New OPEN instance retained for `retention` after `now`, saturating at
    /// the latest representable timestamp.
    pub fn open(
        sequence_name: impl Into<String>,
        context_id: impl Into<String>,
        now: Timestamp,
        retention: chrono::Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_name: sequence_name.into(),
            context_id: context_id.into(),
            state: InstanceState::Open,
            created_at: now,
            closed_at: None,
            retain_until: now
                .checked_add_signed(retention)
                .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC),
            pending_action: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == InstanceState::Open
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.retain_until <= now
    }
}

/// One accepted (qualified name, idempotence id) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedMessage {
    pub id: MessageId,
    pub sequence_instance_id: InstanceId,
    pub qualified_name: QualifiedName,
    /// Broker identity of the delivery that created the row.
    pub sequenced_message_id: String,
    pub idempotence_id: String,
    pub state: MessageState,
    pub trace_context: Option<String>,
    pub created_at: Timestamp,
    pub state_changed_at: Timestamp,
    pub pending_action: Option<MessagePendingAction>,
}

impl SequencedMessage {
    pub fn new(
        instance_id: InstanceId,
        qualified_name: QualifiedName,
        idempotence_id: impl Into<String>,
        record: &InboundRecord,
        state: MessageState,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence_instance_id: instance_id,
            qualified_name,
            sequenced_message_id: record.message_id(),
            idempotence_id: idempotence_id.into(),
            state,
            trace_context: record.trace_context.clone(),
            created_at: now,
            state_changed_at: now,
            pending_action: None,
        }
    }
}

/// Raw payload snapshot of a buffered message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferedMessage {
    /// Same id as the owning [`SequencedMessage`].
    pub message_id: MessageId,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Vec<RecordHeader>,
    pub created_at: Timestamp,
}

impl BufferedMessage {
    pub fn capture(message_id: MessageId, record: &InboundRecord, now: Timestamp) -> Self {
        Self {
            message_id,
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            value: record.value.clone(),
            headers: record.headers.clone(),
            created_at: now,
        }
    }
}
