//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the sequencer requires the host application to provide:
//! persistence, message handlers, payload decoding, failure reporting,
//! time, and broker acknowledgment.
//!
//! Every store method is its own short atomic unit. There is no ambient
//! transaction spanning several calls.

use crate::domain::entities::{BufferedMessage, SequenceInstance, SequencedMessage};
use crate::domain::errors::{DecodeError, HandlerError, StoreError};
use crate::domain::definitions::SequencedPayload;
use crate::domain::value_objects::{
    InsertOutcome, InstanceId, InstancePendingAction, MessageId, MessagePendingAction,
    MessageState, QualifiedName, Timestamp,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Exclusive hold on one sequence instance row.
///
/// Obtained from [`InstanceStore::lock_for_update`] and given back through
/// [`InstanceStore::unlock`]. A lease left idle past its timeout may be
/// reclaimed by a waiter; the stale holder then gets [`StoreError::LockLost`].
#[derive(Debug, PartialEq, Eq)]
pub struct InstanceLease {
    pub instance_id: InstanceId,
    pub token: u64,
}

/// Sequence instance table (`sequence_instance`).
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Insert a new instance; `Conflict` when (sequence_name, context_id) exists.
    async fn insert_instance(
        &self,
        instance: SequenceInstance,
    ) -> Result<InsertOutcome<SequenceInstance>, StoreError>;

    async fn find_instance(
        &self,
        sequence_name: &str,
        context_id: &str,
    ) -> Result<Option<SequenceInstance>, StoreError>;

    async fn get_instance(&self, id: InstanceId) -> Result<Option<SequenceInstance>, StoreError>;

    /// Wait for the exclusive lock on an instance.
    ///
    /// A lease idle for longer than its own `idle_timeout` is reclaimed by
    /// the next waiter.
    async fn lock_for_update(
        &self,
        id: InstanceId,
        idle_timeout: Duration,
    ) -> Result<InstanceLease, StoreError>;

    /// Prove the lease is still held and reset its idle clock.
    async fn heartbeat(&self, lease: &InstanceLease) -> Result<(), StoreError>;

    /// Release the lease. Releasing a reclaimed lease is a no-op.
    async fn unlock(&self, lease: InstanceLease);

    /// OPEN → CLOSED. Returns `false` when the instance was already closed.
    async fn close_instance(&self, lease: &InstanceLease, now: Timestamp)
        -> Result<bool, StoreError>;

    async fn set_instance_pending_action(
        &self,
        id: InstanceId,
        action: Option<InstancePendingAction>,
    ) -> Result<(), StoreError>;

    async fn instances_with_pending_action(
        &self,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, StoreError>;

    /// Instances whose `retain_until` is at or before `cutoff`, soonest first.
    async fn instances_expiring_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, StoreError>;
}

/// Sequenced message, buffered payload and header tables.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Row for (qualified_name, idempotence_id), in any state.
    async fn find_message(
        &self,
        qualified_name: &QualifiedName,
        idempotence_id: &str,
    ) -> Result<Option<SequencedMessage>, StoreError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<SequencedMessage>, StoreError>;

    /// Insert a row and, optionally, its buffered payload in one unit.
    ///
    /// `Conflict` when (qualified_name, idempotence_id) already exists; nothing
    /// is written in that case.
    async fn insert_message(
        &self,
        message: SequencedMessage,
        buffered: Option<BufferedMessage>,
    ) -> Result<InsertOutcome<SequencedMessage>, StoreError>;

    /// Move a row to `state`, stamping `state_changed_at`.
    async fn update_message_state(
        &self,
        id: MessageId,
        state: MessageState,
        now: Timestamp,
    ) -> Result<SequencedMessage, StoreError>;

    /// Move a row from `from` to `to` only if it is still in `from`.
    ///
    /// Returns `false`, writing nothing, when another caller moved it first.
    async fn transition_message_state(
        &self,
        id: MessageId,
        from: MessageState,
        to: MessageState,
        now: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Store a payload unless one already exists. Returns whether it was written.
    async fn insert_buffered(&self, buffered: BufferedMessage) -> Result<bool, StoreError>;

    async fn buffered_message(&self, id: MessageId)
        -> Result<Option<BufferedMessage>, StoreError>;

    /// Qualified names of every PROCESSED row of the instance.
    async fn processed_types(
        &self,
        instance_id: InstanceId,
    ) -> Result<HashSet<QualifiedName>, StoreError>;

    /// Rows of the instance in the given states, in insertion order.
    async fn messages_for_instance(
        &self,
        instance_id: InstanceId,
        states: &[MessageState],
    ) -> Result<Vec<SequencedMessage>, StoreError>;

    async fn set_message_pending_action(
        &self,
        id: MessageId,
        action: Option<MessagePendingAction>,
    ) -> Result<(), StoreError>;

    async fn messages_with_pending_action(
        &self,
        limit: usize,
    ) -> Result<Vec<SequencedMessage>, StoreError>;
}

/// Rows deleted by one housekeeping pass, per table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub headers: usize,
    pub buffered: usize,
    pub messages: usize,
    pub instances: usize,
}

impl PurgeReport {
    pub fn is_empty(&self) -> bool {
        self.instances == 0 && self.messages == 0 && self.buffered == 0 && self.headers == 0
    }
}

/// Bulk deletion used by housekeeping.
///
/// Rows go child-first: headers, buffered payloads, sequenced messages,
/// then the instance itself.
#[async_trait]
pub trait RetentionStore: Send + Sync {
    /// Delete everything belonging to instances with `retain_until <= now`.
    async fn delete_expired(&self, now: Timestamp) -> Result<PurgeReport, StoreError>;

    /// Delete everything belonging to CLOSED instances.
    async fn delete_closed(&self) -> Result<PurgeReport, StoreError>;
}

/// The full persistence surface the sequencer runs against.
pub trait SequenceStore: InstanceStore + MessageStore + RetentionStore {}

impl<T> SequenceStore for T where T: InstanceStore + MessageStore + RetentionStore {}

// =============================================================================
// APPLICATION COLLABORATORS
// =============================================================================

/// Business handler for one message type.
#[async_trait]
pub trait MessageHandler<M: SequencedPayload>: Send + Sync {
    /// `key` is the raw broker record key.
    async fn handle(&self, key: &[u8], message: &M) -> Result<(), HandlerError>;
}

/// Lookup of handlers for buffered messages released by a cascade.
pub trait HandlerRegistry<M: SequencedPayload>: Send + Sync {
    /// Handler registered for the qualified name, falling back to its base type.
    fn handler_for(&self, qualified_name: &QualifiedName) -> Option<Arc<dyn MessageHandler<M>>>;
}

/// Turns a buffered payload back into a business message.
pub trait MessageDecoder<M>: Send + Sync {
    fn decode(&self, buffered: &BufferedMessage) -> Result<M, DecodeError>;
}

/// Receives messages that failed during a cascade or a forced release.
#[async_trait]
pub trait FailureReporter: Send + Sync {
    async fn report(
        &self,
        message: &SequencedMessage,
        buffered: Option<&BufferedMessage>,
        cause: &str,
    );
}

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Commits consumption of the inbound record with the broker.
pub trait Acknowledgment: Send + Sync {
    fn acknowledge(&self);
}

/// Acknowledgment for callers that commit offsets themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAcknowledgment;

impl Acknowledgment for NoopAcknowledgment {
    fn acknowledge(&self) {}
}
