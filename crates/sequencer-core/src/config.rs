//! Sequencer engine settings.

use crate::domain::errors::ConfigurationError;
use crate::domain::value_objects::Timestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Idle time after which an instance lock may be reclaimed by a waiter.
    #[serde(with = "crate::duration_serde")]
    pub lock_idle_timeout: Duration,
    /// Recording mode: until this instant every release condition counts as
    /// satisfied. State is still recorded so sequencing can resume afterwards.
    pub recording_cutover: Option<Timestamp>,
    /// Rows fetched per page by the pending-action jobs.
    pub override_page_size: usize,
    /// Upper bound on pages processed per pending-action run.
    pub max_pages_per_run: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            lock_idle_timeout: Duration::from_secs(30),
            recording_cutover: None,
            override_page_size: 100,
            max_pages_per_run: 10,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.lock_idle_timeout.is_zero() {
            return Err(ConfigurationError::InvalidSetting(
                "lock_idle_timeout cannot be 0".into(),
            ));
        }

        if self.override_page_size == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "override_page_size cannot be 0".into(),
            ));
        }

        if self.max_pages_per_run == 0 {
            return Err(ConfigurationError::InvalidSetting(
                "max_pages_per_run cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Whether release conditions are bypassed at `now`.
    pub fn is_recording(&self, now: Timestamp) -> bool {
        self.recording_cutover.is_some_and(|cutover| now < cutover)
    }
}
