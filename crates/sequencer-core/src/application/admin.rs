//! Read-side inspection and pending-action requests for operators.

use crate::domain::entities::{SequenceInstance, SequencedMessage};
use crate::domain::errors::{SequencingError, StoreError};
use crate::domain::value_objects::{
    InstanceId, InstancePendingAction, MessageId, MessagePendingAction, MessageState,
};
use crate::ports::inbound::SequencingAdminApi;
use crate::ports::outbound::{Clock, SequenceStore};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const ALL_STATES: [MessageState; 3] = [
    MessageState::Waiting,
    MessageState::Processed,
    MessageState::Failed,
];

pub struct AdminService {
    store: Arc<dyn SequenceStore>,
    clock: Arc<dyn Clock>,
}

impl AdminService {
    pub fn new(store: Arc<dyn SequenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

#[async_trait]
impl SequencingAdminApi for AdminService {
    async fn get_instance(
        &self,
        id: InstanceId,
    ) -> Result<Option<SequenceInstance>, SequencingError> {
        Ok(self.store.get_instance(id).await?)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<SequencedMessage>, SequencingError> {
        Ok(self.store.get_message(id).await?)
    }

    async fn instance_messages(
        &self,
        id: InstanceId,
    ) -> Result<Vec<SequencedMessage>, SequencingError> {
        Ok(self.store.messages_for_instance(id, &ALL_STATES).await?)
    }

    async fn request_instance_action(
        &self,
        id: InstanceId,
        action: InstancePendingAction,
    ) -> Result<(), SequencingError> {
        if self.store.get_instance(id).await?.is_none() {
            return Err(StoreError::InstanceNotFound(id).into());
        }
        self.store.set_instance_pending_action(id, Some(action)).await?;
        info!(instance_id = %id, ?action, "Pending action requested on instance");
        Ok(())
    }

    async fn request_message_action(
        &self,
        id: MessageId,
        action: MessagePendingAction,
    ) -> Result<(), SequencingError> {
        if self.store.get_message(id).await?.is_none() {
            return Err(StoreError::MessageNotFound(id).into());
        }
        self.store.set_message_pending_action(id, Some(action)).await?;
        info!(message_id = %id, ?action, "Pending action requested on message");
        Ok(())
    }

    async fn expiring_instances(
        &self,
        window: Duration,
        limit: usize,
    ) -> Result<Vec<SequenceInstance>, SequencingError> {
        let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
        let now = self.clock.now();
        let cutoff = now
            .checked_add_signed(window)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
        Ok(self.store.instances_expiring_before(cutoff, limit).await?)
    }
}
