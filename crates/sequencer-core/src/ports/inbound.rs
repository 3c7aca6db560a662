//! # Inbound Ports (Driving Ports)
//!
//! The API the sequencer exposes: the per-record entry point used by the
//! broker consumer, and the administrative surface used by operators.

use crate::domain::definitions::SequencedPayload;
use crate::domain::entities::{InboundRecord, SequenceInstance, SequencedMessage};
use crate::domain::errors::SequencingError;
use crate::domain::value_objects::{
    InstanceId, InstancePendingAction, MessageId, MessagePendingAction,
};
use crate::ports::outbound::{Acknowledgment, MessageHandler};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// What happened to one inbound record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandleOutcome {
    /// Filtered out or without a context id; handled without sequencing.
    Bypassed,
    /// Already WAITING, IN_FLIGHT or PROCESSED, or another delivery won the key; nothing was done.
    Duplicate,
    /// Handled immediately and recorded as PROCESSED.
    Processed,
    /// Recorded as WAITING with its payload buffered.
    Buffered,
}

/// Per-record entry point.
#[async_trait]
pub trait SequencingApi<M: SequencedPayload>: Send + Sync {
    /// Sequence one decoded record.
    ///
    /// ## Errors
    ///
    /// - `UnconfiguredType`: no sequence declares the message's qualified type
    /// - `Handler`: the immediate handler failed (the row is already FAILED)
    /// - `Store`: persistence failure, including a lost instance lock
    ///
    /// `ack` is only called when this returns `Ok`.
    async fn handle(
        &self,
        record: &InboundRecord,
        message: &M,
        handler: &dyn MessageHandler<M>,
        ack: &dyn Acknowledgment,
    ) -> Result<HandleOutcome, SequencingError>;
}

/// Operator surface: inspection and pending-action requests.
///
/// Requested actions are applied asynchronously by the override jobs.
#[async_trait]
pub trait SequencingAdminApi: Send + Sync {
    async fn get_instance(&self, id: InstanceId)
        -> Result<Option<SequenceInstance>, SequencingError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<SequencedMessage>, SequencingError>;

    /// Every row of an instance in insertion order.
    async fn instance_messages(
        &self,
        id: InstanceId,
    ) -> Result<Vec<SequencedMessage>, SequencingError>;

    async fn request_instance_action(
        &self,
        id: InstanceId,
        action: InstancePendingAction,
    ) -> Result<(), SequencingError>;

    async fn request_message_action(
        &self,
        id: MessageId,
        action: MessagePendingAction,
    ) -> Result<(), SequencingError>;

    /// Instances whose retention ends within `window` from now.
    async fn expiring_instances(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, SequencingError>;
}
