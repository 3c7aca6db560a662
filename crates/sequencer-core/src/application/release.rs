//! # Release Engine
//!
//! Releases buffered messages of one locked instance to a fixed point.
//!
//! Every method here expects the caller to hold the instance lease. This is
//! the only place where handlers run while an instance lock is held.

use crate::config::SequencerConfig;
use crate::domain::definitions::{SequenceDefinition, SequencedPayload};
use crate::domain::entities::{BufferedMessage, SequencedMessage};
use crate::domain::errors::{HandlerError, SequencingError};
use crate::domain::release::condition_satisfied;
use crate::domain::value_objects::{MessageState, QualifiedName};
use crate::ports::outbound::{
    Clock, FailureReporter, HandlerRegistry, InstanceLease, MessageDecoder, SequenceStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one cascade.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Messages moved to PROCESSED.
    pub released: usize,
    /// Messages moved to FAILED.
    pub failed: usize,
    /// Whether this cascade closed the instance.
    pub closed: bool,
}

impl CascadeReport {
    pub fn merge(&mut self, other: CascadeReport) {
        self.released += other.released;
        self.failed += other.failed;
        self.closed |= other.closed;
    }
}

/// Outcome of releasing a single buffered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Processed,
    Failed,
    /// Not WAITING or FAILED anymore; nothing was done.
    Skipped,
}

pub struct ReleaseEngine<M: SequencedPayload> {
    store: Arc<dyn SequenceStore>,
    handlers: Arc<dyn HandlerRegistry<M>>,
    decoder: Arc<dyn MessageDecoder<M>>,
    reporter: Arc<dyn FailureReporter>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
}

impl<M: SequencedPayload> ReleaseEngine<M> {
    pub fn new(
        store: Arc<dyn SequenceStore>,
        handlers: Arc<dyn HandlerRegistry<M>>,
        decoder: Arc<dyn MessageDecoder<M>>,
        reporter: Arc<dyn FailureReporter>,
        clock: Arc<dyn Clock>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            store,
            handlers,
            decoder,
            reporter,
            clock,
            config,
        }
    }

    /// Release every eligible WAITING message, then close the instance if
    /// its processed set is complete.
    pub async fn cascade(
        &self,
        lease: &InstanceLease,
        definition: &SequenceDefinition<M>,
    ) -> Result<CascadeReport, SequencingError> {
        let rows = self
            .store
            .messages_for_instance(
                lease.instance_id,
                &[MessageState::Waiting, MessageState::Processed],
            )
            .await?;

        let mut processed: HashSet<QualifiedName> = rows
            .iter()
            .filter(|m| m.state == MessageState::Processed)
            .map(|m| m.qualified_name.clone())
            .collect();
        let mut waiting: Vec<SequencedMessage> = rows
            .into_iter()
            .filter(|m| m.state == MessageState::Waiting)
            .collect();

        let mut report = CascadeReport::default();
        while let Some(position) = self.next_eligible(&waiting, &processed, definition) {
            let message = waiting.remove(position);
            match self.release(lease, &message).await? {
                ReleaseOutcome::Processed => {
                    processed.insert(message.qualified_name.clone());
                    report.released += 1;
                }
                ReleaseOutcome::Failed => report.failed += 1,
                ReleaseOutcome::Skipped => {}
            }
        }

        if definition.is_complete(&processed)
            && self.store.close_instance(lease, self.clock.now()).await?
        {
            info!(
                sequence = %definition.name,
                instance_id = %lease.instance_id,
                "Sequence instance complete, closed"
            );
            report.closed = true;
        }

        if report.released > 0 || report.failed > 0 {
            debug!(
                sequence = %definition.name,
                instance_id = %lease.instance_id,
                released = report.released,
                failed = report.failed,
                still_waiting = waiting.len(),
                "Cascade finished"
            );
        }
        Ok(report)
    }

    /// Release a WAITING or FAILED message regardless of its condition.
    pub async fn force_release(
        &self,
        lease: &InstanceLease,
        message: &SequencedMessage,
    ) -> Result<ReleaseOutcome, SequencingError> {
        match message.state {
            MessageState::Waiting | MessageState::Failed => self.release(lease, message).await,
            MessageState::Processed | MessageState::InFlight => Ok(ReleaseOutcome::Skipped),
        }
    }

    fn next_eligible(
        &self,
        waiting: &[SequencedMessage],
        processed: &HashSet<QualifiedName>,
        definition: &SequenceDefinition<M>,
    ) -> Option<usize> {
        if self.config.is_recording(self.clock.now()) {
            return if waiting.is_empty() { None } else { Some(0) };
        }
        waiting.iter().position(|message| {
            let condition = definition
                .spec(&message.qualified_name)
                .and_then(|spec| spec.release_condition.as_ref());
            condition_satisfied(condition, processed)
        })
    }

    /// Claim, decode, dispatch and record one buffered message.
    async fn release(
        &self,
        lease: &InstanceLease,
        message: &SequencedMessage,
    ) -> Result<ReleaseOutcome, SequencingError> {
        self.store.heartbeat(lease).await?;

        // A FAILED row can be reclaimed by a redelivery outside the lock.
        let claimed = self
            .store
            .transition_message_state(
                message.id,
                message.state,
                MessageState::InFlight,
                self.clock.now(),
            )
            .await?;
        if !claimed {
            debug!(
                qualified_name = %message.qualified_name,
                idempotence_id = %message.idempotence_id,
                "Message moved since it was read, skipped"
            );
            return Ok(ReleaseOutcome::Skipped);
        }

        let Some(buffered) = self.store.buffered_message(message.id).await? else {
            return self
                .fail(lease, message, None, "buffered payload missing")
                .await;
        };

        let decoded = match self.decoder.decode(&buffered) {
            Ok(decoded) => decoded,
            Err(e) => {
                return self
                    .fail(lease, message, Some(&buffered), &e.to_string())
                    .await;
            }
        };

        let result = match self.handlers.handler_for(&message.qualified_name) {
            Some(handler) => handler.handle(&buffered.key, &decoded).await,
            None => Err(HandlerError::new(format!(
                "no handler registered for '{}'",
                message.qualified_name
            ))),
        };

        match result {
            Ok(()) => {
                self.store
                    .update_message_state(message.id, MessageState::Processed, self.clock.now())
                    .await?;
                self.store.heartbeat(lease).await?;
                info!(
                    qualified_name = %message.qualified_name,
                    idempotence_id = %message.idempotence_id,
                    instance_id = %lease.instance_id,
                    "Released buffered message"
                );
                Ok(ReleaseOutcome::Processed)
            }
            Err(e) => {
                self.fail(lease, message, Some(&buffered), &e.to_string())
                    .await
            }
        }
    }

    async fn fail(
        &self,
        lease: &InstanceLease,
        message: &SequencedMessage,
        buffered: Option<&BufferedMessage>,
        cause: &str,
    ) -> Result<ReleaseOutcome, SequencingError> {
        warn!(
            qualified_name = %message.qualified_name,
            idempotence_id = %message.idempotence_id,
            instance_id = %lease.instance_id,
            cause,
            "Release of buffered message failed"
        );
        self.reporter.report(message, buffered, cause).await;
        self.store
            .update_message_state(message.id, MessageState::Failed, self.clock.now())
            .await?;
        self.store.heartbeat(lease).await?;
        Ok(ReleaseOutcome::Failed)
    }
}
