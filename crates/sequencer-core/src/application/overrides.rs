//! # Administrative Overrides
//!
//! Batch processing of pending actions requested by operators:
//!
//! | Target   | Action        | Effect                                            |
//! |----------|---------------|---------------------------------------------------|
//! | Message  | `CONSUME`     | Force release if WAITING/FAILED, then cascade     |
//! | Message  | `EXPIRE`      | Mark WAITING/IN_FLIGHT FAILED, no handler call    |
//! | Instance | `CLOSE`       | Close unconditionally                             |
//! | Instance | `CONSUME_ALL` | Force release every WAITING message, then cascade |
//!
//! Each row is processed under its own instance lock, one lock at a time.
//! The action is cleared once applied, even when it turned out to be a no-op.
//! A row whose action fails keeps it, and is passed over for the rest of the
//! run so later rows still get their turn.

use crate::application::release::{CascadeReport, ReleaseEngine, ReleaseOutcome};
use crate::catalog::SequenceCatalog;
use crate::config::SequencerConfig;
use crate::domain::definitions::{SequenceDefinition, SequencedPayload};
use crate::domain::entities::{SequenceInstance, SequencedMessage};
use crate::domain::errors::SequencingError;
use crate::domain::value_objects::{
    InstanceId, InstancePendingAction, MessageId, MessagePendingAction, MessageState,
};
use crate::ports::outbound::{Clock, InstanceLease, SequenceStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Totals of one pending-action run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverrideReport {
    /// Actions applied (including no-ops).
    pub applied: usize,
    /// Messages force-released successfully.
    pub consumed: usize,
    /// Messages expired.
    pub expired: usize,
    /// Instances closed (by CLOSE or by a completing cascade).
    pub closed: usize,
    /// Releases that failed.
    pub failed: usize,
    /// Actions dropped because their target or definition no longer exists.
    pub skipped: usize,
    /// Actions that hit an error; they stay pending for the next run.
    pub errors: usize,
}

impl OverrideReport {
    fn absorb(&mut self, cascade: CascadeReport) {
        self.consumed += cascade.released;
        self.failed += cascade.failed;
        if cascade.closed {
            self.closed += 1;
        }
    }

    fn count(&mut self, outcome: ReleaseOutcome) {
        match outcome {
            ReleaseOutcome::Processed => self.consumed += 1,
            ReleaseOutcome::Failed => self.failed += 1,
            ReleaseOutcome::Skipped => {}
        }
    }
}

pub struct PendingActionProcessor<M: SequencedPayload> {
    catalog: Arc<SequenceCatalog<M>>,
    store: Arc<dyn SequenceStore>,
    engine: Arc<ReleaseEngine<M>>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
}

impl<M: SequencedPayload> PendingActionProcessor<M> {
    pub fn new(
        catalog: Arc<SequenceCatalog<M>>,
        store: Arc<dyn SequenceStore>,
        engine: Arc<ReleaseEngine<M>>,
        clock: Arc<dyn Clock>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            engine,
            clock,
            config,
        }
    }

    /// Apply pending CONSUME / EXPIRE actions on messages.
    pub async fn process_message_actions(&self) -> Result<OverrideReport, SequencingError> {
        let mut report = OverrideReport::default();
        let mut erroring: HashSet<MessageId> = HashSet::new();
        for _ in 0..self.config.max_pages_per_run {
            let limit = self.config.override_page_size + erroring.len();
            let fetched = self.store.messages_with_pending_action(limit).await?;
            let page: Vec<&SequencedMessage> = fetched
                .iter()
                .filter(|message| !erroring.contains(&message.id))
                .take(self.config.override_page_size)
                .collect();
            for message in &page {
                if let Err(e) = self.apply_message_action(message, &mut report).await {
                    warn!(
                        message_id = %message.id,
                        qualified_name = %message.qualified_name,
                        error = %e,
                        "Message pending action failed, kept for the next run"
                    );
                    report.errors += 1;
                    erroring.insert(message.id);
                }
            }
            if fetched.len() < limit || page.is_empty() {
                break;
            }
        }
        if report.applied > 0 || report.errors > 0 {
            info!(
                applied = report.applied,
                consumed = report.consumed,
                expired = report.expired,
                failed = report.failed,
                errors = report.errors,
                "Processed message pending actions"
            );
        }
        Ok(report)
    }

    /// Apply pending CLOSE / CONSUME_ALL actions on instances.
    pub async fn process_instance_actions(&self) -> Result<OverrideReport, SequencingError> {
        let mut report = OverrideReport::default();
        let mut erroring: HashSet<InstanceId> = HashSet::new();
        for _ in 0..self.config.max_pages_per_run {
            let limit = self.config.override_page_size + erroring.len();
            let fetched = self.store.instances_with_pending_action(limit).await?;
            let page: Vec<&SequenceInstance> = fetched
                .iter()
                .filter(|instance| !erroring.contains(&instance.id))
                .take(self.config.override_page_size)
                .collect();
            for instance in &page {
                if let Err(e) = self.apply_instance_action(instance, &mut report).await {
                    warn!(
                        instance_id = %instance.id,
                        sequence = %instance.sequence_name,
                        error = %e,
                        "Instance pending action failed, kept for the next run"
                    );
                    report.errors += 1;
                    erroring.insert(instance.id);
                }
            }
            if fetched.len() < limit || page.is_empty() {
                break;
            }
        }
        if report.applied > 0 || report.errors > 0 {
            info!(
                applied = report.applied,
                consumed = report.consumed,
                closed = report.closed,
                failed = report.failed,
                errors = report.errors,
                "Processed instance pending actions"
            );
        }
        Ok(report)
    }

    async fn apply_message_action(
        &self,
        message: &SequencedMessage,
        report: &mut OverrideReport,
    ) -> Result<(), SequencingError> {
        let Some(definition) = self.definition_for(message.sequence_instance_id).await? else {
            warn!(
                message_id = %message.id,
                "Dropping pending action: instance or definition gone"
            );
            self.store.set_message_pending_action(message.id, None).await?;
            report.skipped += 1;
            return Ok(());
        };

        let lease = self
            .store
            .lock_for_update(message.sequence_instance_id, self.config.lock_idle_timeout)
            .await?;
        let result = self
            .apply_message_action_locked(&lease, message, &definition, report)
            .await;
        self.store.unlock(lease).await;
        result
    }

    async fn apply_message_action_locked(
        &self,
        lease: &InstanceLease,
        message: &SequencedMessage,
        definition: &SequenceDefinition<M>,
        report: &mut OverrideReport,
    ) -> Result<(), SequencingError> {
        // Re-read under the lock; the row may have moved since it was paged.
        let Some(current) = self.store.get_message(message.id).await? else {
            report.skipped += 1;
            return Ok(());
        };

        match current.pending_action {
            Some(MessagePendingAction::Consume) => {
                let has_payload = self.store.buffered_message(current.id).await?.is_some();
                match current.state {
                    MessageState::Waiting | MessageState::Failed if has_payload => {
                        let outcome = self.engine.force_release(lease, &current).await?;
                        report.count(outcome);
                        let cascade = self.engine.cascade(lease, definition).await?;
                        report.absorb(cascade);
                    }
                    MessageState::Failed => {
                        warn!(
                            message_id = %current.id,
                            qualified_name = %current.qualified_name,
                            "Cannot consume FAILED message without a buffered payload"
                        );
                    }
                    state => {
                        debug!(message_id = %current.id, ?state, "Consume not applicable, ignored");
                    }
                }
            }
            Some(MessagePendingAction::Expire) => {
                // IN_FLIGHT here is a claim left behind by a worker that died
                // inside its handler.
                if matches!(current.state, MessageState::Waiting | MessageState::InFlight) {
                    self.store
                        .update_message_state(current.id, MessageState::Failed, self.clock.now())
                        .await?;
                    report.expired += 1;
                    info!(
                        message_id = %current.id,
                        qualified_name = %current.qualified_name,
                        idempotence_id = %current.idempotence_id,
                        state = ?current.state,
                        "Expired message"
                    );
                } else {
                    debug!(
                        message_id = %current.id,
                        state = ?current.state,
                        "Expire not applicable, ignored"
                    );
                }
            }
            None => return Ok(()),
        }

        self.store.set_message_pending_action(current.id, None).await?;
        report.applied += 1;
        Ok(())
    }

    async fn apply_instance_action(
        &self,
        instance: &SequenceInstance,
        report: &mut OverrideReport,
    ) -> Result<(), SequencingError> {
        let Some(definition) = self.catalog.definition(&instance.sequence_name).cloned() else {
            warn!(
                instance_id = %instance.id,
                sequence = %instance.sequence_name,
                "Dropping pending action: sequence no longer configured"
            );
            self.store.set_instance_pending_action(instance.id, None).await?;
            report.skipped += 1;
            return Ok(());
        };

        let lease = self
            .store
            .lock_for_update(instance.id, self.config.lock_idle_timeout)
            .await?;
        let result = self
            .apply_instance_action_locked(&lease, &definition, report)
            .await;
        self.store.unlock(lease).await;
        result
    }

    async fn apply_instance_action_locked(
        &self,
        lease: &InstanceLease,
        definition: &SequenceDefinition<M>,
        report: &mut OverrideReport,
    ) -> Result<(), SequencingError> {
        let Some(current) = self.store.get_instance(lease.instance_id).await? else {
            report.skipped += 1;
            return Ok(());
        };

        match current.pending_action {
            Some(InstancePendingAction::Close) => {
                if self.store.close_instance(lease, self.clock.now()).await? {
                    report.closed += 1;
                    info!(
                        instance_id = %current.id,
                        sequence = %current.sequence_name,
                        context_id = %current.context_id,
                        "Force-closed sequence instance"
                    );
                }
            }
            Some(InstancePendingAction::ConsumeAll) => {
                let waiting = self
                    .store
                    .messages_for_instance(current.id, &[MessageState::Waiting])
                    .await?;
                for message in &waiting {
                    let outcome = self.engine.force_release(lease, message).await?;
                    report.count(outcome);
                }
                let cascade = self.engine.cascade(lease, definition).await?;
                report.absorb(cascade);
                info!(
                    instance_id = %current.id,
                    sequence = %current.sequence_name,
                    context_id = %current.context_id,
                    released = waiting.len(),
                    "Consumed all waiting messages"
                );
            }
            None => return Ok(()),
        }

        self.store.set_instance_pending_action(current.id, None).await?;
        report.applied += 1;
        Ok(())
    }

    async fn definition_for(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<Arc<SequenceDefinition<M>>>, SequencingError> {
        Ok(self
            .store
            .get_instance(instance_id)
            .await?
            .and_then(|instance| self.catalog.definition(&instance.sequence_name).cloned()))
    }
}
