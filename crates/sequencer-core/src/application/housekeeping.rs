//! Scheduled deletion of expired and closed sequence data.

use crate::domain::errors::SequencingError;
use crate::ports::outbound::{Clock, PurgeReport, SequenceStore};
use std::sync::Arc;
use tracing::info;

pub struct Housekeeper {
    store: Arc<dyn SequenceStore>,
    clock: Arc<dyn Clock>,
}

impl Housekeeper {
    pub fn new(store: Arc<dyn SequenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Delete every instance whose retention period has passed.
    pub async fn purge_expired(&self) -> Result<PurgeReport, SequencingError> {
        let now = self.clock.now();
        let report = self.store.delete_expired(now).await?;
        if !report.is_empty() {
            info!(
                instances = report.instances,
                messages = report.messages,
                buffered = report.buffered,
                headers = report.headers,
                cutoff = %now,
                "Purged expired sequence instances"
            );
        }
        Ok(report)
    }

    /// Delete every CLOSED instance.
    pub async fn purge_closed(&self) -> Result<PurgeReport, SequencingError> {
        let report = self.store.delete_closed().await?;
        if !report.is_empty() {
            info!(
                instances = report.instances,
                messages = report.messages,
                buffered = report.buffered,
                headers = report.headers,
                "Purged closed sequence instances"
            );
        }
        Ok(report)
    }
}
