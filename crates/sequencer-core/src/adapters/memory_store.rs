//! In-memory reference implementation of the storage ports.
//!
//! Enforces the same constraints a relational backend would: unique
//! (sequence_name, context_id) and (qualified_name, idempotence_id) keys,
//! insertion order for message listing, exclusive instance leases with idle
//! reclaim, and child-first deletion. Headers live in their own table keyed
//! by buffered message id.
//!
//! Lock order is always `leases` before `tables`.

use crate::domain::entities::{BufferedMessage, SequenceInstance, SequencedMessage};
use crate::domain::errors::StoreError;
use crate::domain::value_objects::{
    InsertOutcome, InstanceId, InstancePendingAction, InstanceState, MessageId,
    MessagePendingAction, MessageState, QualifiedName, RecordHeader, Timestamp,
};
use crate::ports::outbound::{
    InstanceLease, InstanceStore, MessageStore, PurgeReport, RetentionStore,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

struct StoredMessage {
    seq: u64,
    row: SequencedMessage,
}

#[derive(Default)]
struct Tables {
    next_seq: u64,
    instances: HashMap<InstanceId, SequenceInstance>,
    instance_index: HashMap<(String, String), InstanceId>,
    messages: HashMap<MessageId, StoredMessage>,
    message_index: HashMap<(QualifiedName, String), MessageId>,
    /// Payloads without headers; headers are kept in `headers`.
    buffered: HashMap<MessageId, BufferedMessage>,
    headers: HashMap<MessageId, Vec<RecordHeader>>,
}

impl Tables {
    fn insert_buffered(&mut self, mut buffered: BufferedMessage) -> bool {
        if self.buffered.contains_key(&buffered.message_id) {
            return false;
        }
        let headers = std::mem::take(&mut buffered.headers);
        if !headers.is_empty() {
            self.headers.insert(buffered.message_id, headers);
        }
        self.buffered.insert(buffered.message_id, buffered);
        true
    }

    fn buffered(&self, id: MessageId) -> Option<BufferedMessage> {
        let mut buffered = self.buffered.get(&id)?.clone();
        if let Some(headers) = self.headers.get(&id) {
            buffered.headers = headers.clone();
        }
        Some(buffered)
    }

    fn message_mut(&mut self, id: MessageId) -> Result<&mut SequencedMessage, StoreError> {
        self.messages
            .get_mut(&id)
            .map(|stored| &mut stored.row)
            .ok_or(StoreError::MessageNotFound(id))
    }

    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut SequenceInstance, StoreError> {
        self.instances
            .get_mut(&id)
            .ok_or(StoreError::InstanceNotFound(id))
    }

    /// Remove every row of the given instances, children first.
    fn purge(&mut self, instance_ids: &HashSet<InstanceId>) -> PurgeReport {
        let mut report = PurgeReport::default();

        let message_ids: Vec<MessageId> = self
            .messages
            .iter()
            .filter(|(_, stored)| instance_ids.contains(&stored.row.sequence_instance_id))
            .map(|(id, _)| *id)
            .collect();

        for id in &message_ids {
            if let Some(headers) = self.headers.remove(id) {
                report.headers += headers.len();
            }
        }
        for id in &message_ids {
            if self.buffered.remove(id).is_some() {
                report.buffered += 1;
            }
        }
        for id in &message_ids {
            if let Some(stored) = self.messages.remove(id) {
                self.message_index
                    .remove(&(stored.row.qualified_name, stored.row.idempotence_id));
                report.messages += 1;
            }
        }
        for id in instance_ids {
            if let Some(instance) = self.instances.remove(id) {
                self.instance_index
                    .remove(&(instance.sequence_name, instance.context_id));
                report.instances += 1;
            }
        }

        report
    }
}

struct LeaseSlot {
    token: u64,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl LeaseSlot {
    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.idle_for(now) >= self.idle_timeout
    }
}

/// Current number of rows per table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub instances: usize,
    pub messages: usize,
    pub buffered: usize,
    pub headers: usize,
}

/// Thread-safe in-memory [`SequenceStore`](crate::ports::SequenceStore).
#[derive(Default)]
pub struct InMemorySequenceStore {
    tables: RwLock<Tables>,
    leases: Mutex<HashMap<InstanceId, LeaseSlot>>,
    released: Notify,
    next_token: AtomicU64,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_counts(&self) -> RowCounts {
        let tables = self.tables.read();
        RowCounts {
            instances: tables.instances.len(),
            messages: tables.messages.len(),
            buffered: tables.buffered.len(),
            headers: tables.headers.values().map(Vec::len).sum(),
        }
    }

    fn grant(
        &self,
        leases: &mut HashMap<InstanceId, LeaseSlot>,
        id: InstanceId,
        idle_timeout: Duration,
    ) -> InstanceLease {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed) + 1;
        leases.insert(
            id,
            LeaseSlot {
                token,
                last_activity: Instant::now(),
                idle_timeout,
            },
        );
        InstanceLease {
            instance_id: id,
            token,
        }
    }

    /// Validate the lease and reset its idle clock.
    fn touch(
        &self,
        leases: &mut HashMap<InstanceId, LeaseSlot>,
        lease: &InstanceLease,
    ) -> Result<(), StoreError> {
        match leases.get_mut(&lease.instance_id) {
            Some(slot) if slot.token == lease.token => {
                slot.last_activity = Instant::now();
                Ok(())
            }
            _ => Err(StoreError::LockLost(lease.instance_id)),
        }
    }

    /// Purge the selected instances, skipping any that are actively leased.
    fn purge_where<F>(&self, select: F) -> PurgeReport
    where
        F: Fn(&SequenceInstance) -> bool,
    {
        let mut leases = self.leases.lock();
        let mut tables = self.tables.write();
        let now = Instant::now();

        let mut skipped = 0usize;
        let ids: HashSet<InstanceId> = tables
            .instances
            .values()
            .filter(|instance| select(instance))
            .filter(|instance| match leases.get(&instance.id) {
                Some(slot) if !slot.is_stale(now) => {
                    skipped += 1;
                    false
                }
                _ => true,
            })
            .map(|instance| instance.id)
            .collect();

        if skipped > 0 {
            debug!(skipped, "Skipping purge of locked sequence instances");
        }
        for id in &ids {
            leases.remove(id);
        }
        tables.purge(&ids)
    }
}

#[async_trait]
impl InstanceStore for InMemorySequenceStore {
    async fn insert_instance(
        &self,
        instance: SequenceInstance,
    ) -> Result<InsertOutcome<SequenceInstance>, StoreError> {
        let mut tables = self.tables.write();
        let key = (instance.sequence_name.clone(), instance.context_id.clone());
        if tables.instance_index.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }
        tables.instance_index.insert(key, instance.id);
        tables.instances.insert(instance.id, instance.clone());
        Ok(InsertOutcome::Inserted(instance))
    }

    async fn find_instance(
        &self,
        sequence_name: &str,
        context_id: &str,
    ) -> Result<Option<SequenceInstance>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .instance_index
            .get(&(sequence_name.to_string(), context_id.to_string()))
            .and_then(|id| tables.instances.get(id))
            .cloned())
    }

    async fn get_instance(&self, id: InstanceId) -> Result<Option<SequenceInstance>, StoreError> {
        Ok(self.tables.read().instances.get(&id).cloned())
    }

    async fn lock_for_update(
        &self,
        id: InstanceId,
        idle_timeout: Duration,
    ) -> Result<InstanceLease, StoreError> {
        loop {
            // Register for wake-ups before inspecting the slot so an unlock
            // between the check and the wait is not missed.
            let mut notified = pin!(self.released.notified());
            notified.as_mut().enable();

            let wait = {
                let mut leases = self.leases.lock();
                if !self.tables.read().instances.contains_key(&id) {
                    return Err(StoreError::InstanceNotFound(id));
                }

                let now = Instant::now();
                let holder = leases
                    .get(&id)
                    .map(|slot| (slot.is_stale(now), slot.idle_for(now), slot.idle_timeout));
                match holder {
                    None => return Ok(self.grant(&mut leases, id, idle_timeout)),
                    Some((true, idle, _)) => {
                        warn!(
                            instance_id = %id,
                            idle_ms = idle.as_millis() as u64,
                            "Reclaiming idle sequence instance lock"
                        );
                        return Ok(self.grant(&mut leases, id, idle_timeout));
                    }
                    Some((false, idle, held_timeout)) => held_timeout.saturating_sub(idle),
                }
            };

            debug!(instance_id = %id, "Waiting for sequence instance lock");
            // Either a wake-up or the holder's idle deadline; both re-check.
            tokio::time::timeout(wait, notified.as_mut()).await.ok();
        }
    }

    async fn heartbeat(&self, lease: &InstanceLease) -> Result<(), StoreError> {
        let mut leases = self.leases.lock();
        self.touch(&mut leases, lease)
    }

    async fn unlock(&self, lease: InstanceLease) {
        {
            let mut leases = self.leases.lock();
            match leases.get(&lease.instance_id) {
                Some(slot) if slot.token == lease.token => {
                    leases.remove(&lease.instance_id);
                }
                _ => {
                    debug!(instance_id = %lease.instance_id, "Unlock of a lease that was already reclaimed");
                    return;
                }
            }
        }
        self.released.notify_waiters();
    }

    async fn close_instance(
        &self,
        lease: &InstanceLease,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut leases = self.leases.lock();
        self.touch(&mut leases, lease)?;

        let mut tables = self.tables.write();
        let instance = tables.instance_mut(lease.instance_id)?;
        if instance.state == InstanceState::Closed {
            return Ok(false);
        }
        instance.state = InstanceState::Closed;
        instance.closed_at = Some(now);
        Ok(true)
    }

    async fn set_instance_pending_action(
        &self,
        id: InstanceId,
        action: Option<InstancePendingAction>,
    ) -> Result<(), StoreError> {
        self.tables.write().instance_mut(id)?.pending_action = action;
        Ok(())
    }

    async fn instances_with_pending_action(
        &self,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, StoreError> {
        let tables = self.tables.read();
        let mut pending: Vec<SequenceInstance> = tables
            .instances
            .values()
            .filter(|instance| instance.pending_action.is_some())
            .cloned()
            .collect();
        pending.sort_by_key(|instance| instance.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn instances_expiring_before(
        &self,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, StoreError> {
        let tables = self.tables.read();
        let mut expiring: Vec<SequenceInstance> = tables
            .instances
            .values()
            .filter(|instance| instance.retain_until <= cutoff)
            .cloned()
            .collect();
        expiring.sort_by_key(|instance| instance.retain_until);
        expiring.truncate(limit);
        Ok(expiring)
    }
}

#[async_trait]
impl MessageStore for InMemorySequenceStore {
    async fn find_message(
        &self,
        qualified_name: &QualifiedName,
        idempotence_id: &str,
    ) -> Result<Option<SequencedMessage>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .message_index
            .get(&(qualified_name.clone(), idempotence_id.to_string()))
            .and_then(|id| tables.messages.get(id))
            .map(|stored| stored.row.clone()))
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<SequencedMessage>, StoreError> {
        Ok(self
            .tables
            .read()
            .messages
            .get(&id)
            .map(|stored| stored.row.clone()))
    }

    async fn insert_message(
        &self,
        message: SequencedMessage,
        buffered: Option<BufferedMessage>,
    ) -> Result<InsertOutcome<SequencedMessage>, StoreError> {
        let mut tables = self.tables.write();
        if !tables.instances.contains_key(&message.sequence_instance_id) {
            return Err(StoreError::InstanceNotFound(message.sequence_instance_id));
        }

        let key = (message.qualified_name.clone(), message.idempotence_id.clone());
        if tables.message_index.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }

        tables.next_seq += 1;
        let seq = tables.next_seq;
        tables.message_index.insert(key, message.id);
        tables.messages.insert(
            message.id,
            StoredMessage {
                seq,
                row: message.clone(),
            },
        );
        if let Some(buffered) = buffered {
            tables.insert_buffered(buffered);
        }
        Ok(InsertOutcome::Inserted(message))
    }

    async fn update_message_state(
        &self,
        id: MessageId,
        state: MessageState,
        now: Timestamp,
    ) -> Result<SequencedMessage, StoreError> {
        let mut tables = self.tables.write();
        let message = tables.message_mut(id)?;
        message.state = state;
        message.state_changed_at = now;
        Ok(message.clone())
    }

    async fn transition_message_state(
        &self,
        id: MessageId,
        from: MessageState,
        to: MessageState,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        let message = tables.message_mut(id)?;
        if message.state != from {
            return Ok(false);
        }
        message.state = to;
        message.state_changed_at = now;
        Ok(true)
    }

    async fn insert_buffered(&self, buffered: BufferedMessage) -> Result<bool, StoreError> {
        let mut tables = self.tables.write();
        if !tables.messages.contains_key(&buffered.message_id) {
            return Err(StoreError::MessageNotFound(buffered.message_id));
        }
        Ok(tables.insert_buffered(buffered))
    }

    async fn buffered_message(
        &self,
        id: MessageId,
    ) -> Result<Option<BufferedMessage>, StoreError> {
        Ok(self.tables.read().buffered(id))
    }

    async fn processed_types(
        &self,
        instance_id: InstanceId,
    ) -> Result<HashSet<QualifiedName>, StoreError> {
        Ok(self
            .tables
            .read()
            .messages
            .values()
            .filter(|stored| {
                stored.row.sequence_instance_id == instance_id
                    && stored.row.state == MessageState::Processed
            })
            .map(|stored| stored.row.qualified_name.clone())
            .collect())
    }

    async fn messages_for_instance(
        &self,
        instance_id: InstanceId,
        states: &[MessageState],
    ) -> Result<Vec<SequencedMessage>, StoreError> {
        let tables = self.tables.read();
        let mut rows: Vec<&StoredMessage> = tables
            .messages
            .values()
            .filter(|stored| {
                stored.row.sequence_instance_id == instance_id
                    && states.contains(&stored.row.state)
            })
            .collect();
        rows.sort_by_key(|stored| stored.seq);
        Ok(rows.into_iter().map(|stored| stored.row.clone()).collect())
    }

    async fn set_message_pending_action(
        &self,
        id: MessageId,
        action: Option<MessagePendingAction>,
    ) -> Result<(), StoreError> {
        self.tables.write().message_mut(id)?.pending_action = action;
        Ok(())
    }

    async fn messages_with_pending_action(
        &self,
        limit: usize,
    ) -> Result<Vec<SequencedMessage>, StoreError> {
        let tables = self.tables.read();
        let mut rows: Vec<&StoredMessage> = tables
            .messages
            .values()
            .filter(|stored| stored.row.pending_action.is_some())
            .collect();
        rows.sort_by_key(|stored| stored.seq);
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|stored| stored.row.clone())
            .collect())
    }
}

#[async_trait]
impl RetentionStore for InMemorySequenceStore {
    async fn delete_expired(&self, now: Timestamp) -> Result<PurgeReport, StoreError> {
        Ok(self.purge_where(|instance| instance.retain_until <= now))
    }

    async fn delete_closed(&self) -> Result<PurgeReport, StoreError> {
        Ok(self.purge_where(|instance| instance.state == InstanceState::Closed))
    }
}
