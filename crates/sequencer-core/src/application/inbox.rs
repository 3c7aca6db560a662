//! # Sequencing Inbox
//!
//! Single entry point for every inbound record.
//!
//! ## Flow
//!
//! 1. Resolve the qualified type; bypass when filtered out or without context id
//! 2. Get or create the sequence instance
//! 3. Drop redeliveries of WAITING, IN_FLIGHT or PROCESSED rows
//! 4. Claim the key and handle immediately if the release condition holds,
//!    otherwise buffer
//! 5. Lock the instance and cascade
//! 6. Acknowledge
//!
//! The immediate handler never runs while an instance lock is held, and only
//! after its delivery won the key, so concurrent deliveries of one message
//! reach the handler at most once.

use crate::application::instances::get_or_create_instance;
use crate::application::release::ReleaseEngine;
use crate::catalog::SequenceCatalog;
use crate::config::SequencerConfig;
use crate::domain::definitions::{SequenceDefinition, SequencedPayload};
use crate::domain::entities::{
    BufferedMessage, InboundRecord, SequenceInstance, SequencedMessage,
};
use crate::domain::errors::{HandlerError, SequencingError};
use crate::domain::release::condition_satisfied;
use crate::domain::value_objects::{
    InsertOutcome, MessageId, MessageState, QualifiedName, Timestamp,
};
use crate::ports::inbound::{HandleOutcome, SequencingApi};
use crate::ports::outbound::{Acknowledgment, Clock, MessageHandler, SequenceStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SequencingInbox<M: SequencedPayload> {
    catalog: Arc<SequenceCatalog<M>>,
    store: Arc<dyn SequenceStore>,
    engine: Arc<ReleaseEngine<M>>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
}

/// Where a sequenced record ended up before the cascade.
struct Recorded {
    outcome: HandleOutcome,
    handler_error: Option<HandlerError>,
}

impl<M: SequencedPayload> SequencingInbox<M> {
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

    pub fn catalog(&self) -> &SequenceCatalog<M> {
        &self.catalog
    }

    async fn bypass(
        &self,
        record: &InboundRecord,
        message: &M,
        handler: &dyn MessageHandler<M>,
        ack: &dyn Acknowledgment,
    ) -> Result<HandleOutcome, SequencingError> {
        handler.handle(&record.key, message).await?;
        ack.acknowledge();
        Ok(HandleOutcome::Bypassed)
    }

    /// Steps 3 and 4: idempotence, then immediate handling or buffering.
    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        record: &InboundRecord,
        message: &M,
        handler: &dyn MessageHandler<M>,
        definition: &SequenceDefinition<M>,
        instance: &SequenceInstance,
        qualified_name: &QualifiedName,
        now: Timestamp,
    ) -> Result<Recorded, SequencingError> {
        let idempotence_id = message.idempotence_id();
        let existing = self
            .store
            .find_message(qualified_name, &idempotence_id)
            .await?;

        if let Some(existing) = &existing {
            if existing.state.blocks_redelivery() {
                debug!(
                    qualified_name = %qualified_name,
                    idempotence_id = %idempotence_id,
                    state = ?existing.state,
                    "Duplicate delivery ignored"
                );
                return Ok(Recorded {
                    outcome: HandleOutcome::Duplicate,
                    handler_error: None,
                });
            }
        }

        if self.is_releasable(definition, instance, qualified_name, now).await? {
            let Some(claimed) = self
                .claim(record, instance, qualified_name, &idempotence_id, existing.as_ref(), now)
                .await?
            else {
                return Ok(Self::lost_race(qualified_name, &idempotence_id));
            };

            let result = handler.handle(&record.key, message).await;
            let state = match result {
                Ok(()) => MessageState::Processed,
                Err(_) => MessageState::Failed,
            };
            let stored = self
                .store
                .update_message_state(claimed, state, self.clock.now())
                .await;

            return match result {
                Ok(()) => {
                    stored?;
                    info!(
                        sequence = %definition.name,
                        context_id = %instance.context_id,
                        qualified_name = %qualified_name,
                        idempotence_id = %idempotence_id,
                        "Processed message"
                    );
                    Ok(Recorded {
                        outcome: HandleOutcome::Processed,
                        handler_error: None,
                    })
                }
                Err(e) => {
                    if let Err(store_error) = stored {
                        warn!(
                            qualified_name = %qualified_name,
                            idempotence_id = %idempotence_id,
                            error = %store_error,
                            "Could not record handler failure"
                        );
                    }
                    warn!(
                        sequence = %definition.name,
                        context_id = %instance.context_id,
                        qualified_name = %qualified_name,
                        idempotence_id = %idempotence_id,
                        error = %e,
                        "Handler failed, message recorded as FAILED"
                    );
                    Ok(Recorded {
                        outcome: HandleOutcome::Processed,
                        handler_error: Some(e),
                    })
                }
            };
        }

        let buffered = match &existing {
            Some(failed) => {
                // Keeps the original payload if the failed row already has one.
                self.store
                    .insert_buffered(BufferedMessage::capture(failed.id, record, now))
                    .await?;
                self.store
                    .transition_message_state(
                        failed.id,
                        MessageState::Failed,
                        MessageState::Waiting,
                        now,
                    )
                    .await?
            }
            None => {
                let row = SequencedMessage::new(
                    instance.id,
                    qualified_name.clone(),
                    idempotence_id.clone(),
                    record,
                    MessageState::Waiting,
                    now,
                );
                let payload = BufferedMessage::capture(row.id, record, now);
                matches!(
                    self.store.insert_message(row, Some(payload)).await?,
                    InsertOutcome::Inserted(_)
                )
            }
        };

        if !buffered {
            return Ok(Self::lost_race(qualified_name, &idempotence_id));
        }

        info!(
            sequence = %definition.name,
            context_id = %instance.context_id,
            qualified_name = %qualified_name,
            idempotence_id = %idempotence_id,
            "Buffered message until its predecessors are processed"
        );
        Ok(Recorded {
            outcome: HandleOutcome::Buffered,
            handler_error: None,
        })
    }

    /// Take the key for an immediate handler call, as a new IN_FLIGHT row or
    /// by moving a FAILED row to IN_FLIGHT. `None` when another delivery
    /// holds it.
    async fn claim(
        &self,
        record: &InboundRecord,
        instance: &SequenceInstance,
        qualified_name: &QualifiedName,
        idempotence_id: &str,
        existing: Option<&SequencedMessage>,
        now: Timestamp,
    ) -> Result<Option<MessageId>, SequencingError> {
        if let Some(failed) = existing {
            let claimed = self
                .store
                .transition_message_state(
                    failed.id,
                    MessageState::Failed,
                    MessageState::InFlight,
                    now,
                )
                .await?;
            return Ok(claimed.then_some(failed.id));
        }

        let row = SequencedMessage::new(
            instance.id,
            qualified_name.clone(),
            idempotence_id,
            record,
            MessageState::InFlight,
            now,
        );
        Ok(match self.store.insert_message(row, None).await? {
            InsertOutcome::Inserted(row) => Some(row.id),
            InsertOutcome::Conflict => None,
        })
    }

    fn lost_race(qualified_name: &QualifiedName, idempotence_id: &str) -> Recorded {
        debug!(
            qualified_name = %qualified_name,
            idempotence_id = %idempotence_id,
            "Concurrent delivery holds the key, treating as duplicate"
        );
        Recorded {
            outcome: HandleOutcome::Duplicate,
            handler_error: None,
        }
    }

    /// Release condition check, read without the instance lock.
    async fn is_releasable(
        &self,
        definition: &SequenceDefinition<M>,
        instance: &SequenceInstance,
        qualified_name: &QualifiedName,
        now: Timestamp,
    ) -> Result<bool, SequencingError> {
        if self.config.is_recording(now) {
            return Ok(true);
        }
        let Some(condition) = definition
            .spec(qualified_name)
            .and_then(|spec| spec.release_condition.as_ref())
        else {
            return Ok(true);
        };
        let processed = self.store.processed_types(instance.id).await?;
        Ok(condition_satisfied(Some(condition), &processed))
    }

    /// Step 5: lock, cascade, unlock.
    async fn cascade(
        &self,
        definition: &SequenceDefinition<M>,
        instance: &SequenceInstance,
    ) -> Result<(), SequencingError> {
        let lease = self
            .store
            .lock_for_update(instance.id, self.config.lock_idle_timeout)
            .await?;
        let result = self.engine.cascade(&lease, definition).await;
        self.store.unlock(lease).await;
        result.map(|_| ())
    }
}

#[async_trait]
impl<M: SequencedPayload> SequencingApi<M> for SequencingInbox<M> {
    async fn handle(
        &self,
        record: &InboundRecord,
        message: &M,
        handler: &dyn MessageHandler<M>,
        ack: &dyn Acknowledgment,
    ) -> Result<HandleOutcome, SequencingError> {
        let qualified_name = self.catalog.resolve_qualified_name(message);
        let entry = self.catalog.require_spec(&qualified_name)?.clone();

        if !entry.spec.accepts(message) {
            debug!(qualified_name = %qualified_name, "Filtered out, bypassing sequencing");
            return self.bypass(record, message, handler, ack).await;
        }
        let Some(context_id) = entry.spec.context_id(message) else {
            debug!(qualified_name = %qualified_name, "No context id, bypassing sequencing");
            return self.bypass(record, message, handler, ack).await;
        };

        let now = self.clock.now();
        let instance =
            get_or_create_instance(self.store.as_ref(), entry.definition.as_ref(), &context_id, now)
                .await?;

        let recorded = self
            .record(
                record,
                message,
                handler,
                entry.definition.as_ref(),
                &instance,
                &qualified_name,
                now,
            )
            .await?;
        if recorded.outcome == HandleOutcome::Duplicate {
            ack.acknowledge();
            return Ok(HandleOutcome::Duplicate);
        }

        let cascaded = self.cascade(entry.definition.as_ref(), &instance).await;
        if let Some(e) = recorded.handler_error {
            if let Err(cascade_error) = cascaded {
                warn!(
                    sequence = %entry.definition.name,
                    context_id = %context_id,
                    error = %cascade_error,
                    "Cascade after a failed handler call also failed"
                );
            }
            return Err(SequencingError::Handler(e));
        }
        cascaded?;
        ack.acknowledge();
        Ok(recorded.outcome)
    }
}
