//! Get-or-create of sequence instances.
//!
//! Creation races are resolved by the store's unique constraint: attempt the
//! insert, and on conflict re-read the row the winner wrote.

use crate::domain::definitions::SequenceDefinition;
use crate::domain::entities::SequenceInstance;
use crate::domain::errors::SequencingError;
use crate::domain::value_objects::{InsertOutcome, Timestamp};
use crate::ports::outbound::InstanceStore;
use tracing::{debug, info};

/// Outcome of one get-or-create attempt.
enum Creation {
    Attempt,
    Reread,
}

pub async fn get_or_create_instance<S, M>(
    store: &S,
    definition: &SequenceDefinition<M>,
    context_id: &str,
    now: Timestamp,
) -> Result<SequenceInstance, SequencingError>
where
    S: InstanceStore + ?Sized,
{
    if let Some(instance) = store.find_instance(&definition.name, context_id).await? {
        return Ok(instance);
    }

    let mut step = Creation::Attempt;
    loop {
        step = match step {
            Creation::Attempt => {
                let candidate =
                    SequenceInstance::open(&definition.name, context_id, now, definition.retention());
                match store.insert_instance(candidate).await? {
                    InsertOutcome::Inserted(instance) => {
                        info!(
                            sequence = %definition.name,
                            context_id,
                            instance_id = %instance.id,
                            retain_until = %instance.retain_until,
                            "Opened sequence instance"
                        );
                        return Ok(instance);
                    }
                    InsertOutcome::Conflict => {
                        debug!(
                            sequence = %definition.name,
                            context_id,
                            "Lost instance creation race, re-reading"
                        );
                        Creation::Reread
                    }
                }
            }
            Creation::Reread => {
                return store
                    .find_instance(&definition.name, context_id)
                    .await?
                    .ok_or_else(|| SequencingError::InstanceVanished {
                        sequence: definition.name.clone(),
                        context_id: context_id.to_string(),
                    });
            }
        };
    }
}
