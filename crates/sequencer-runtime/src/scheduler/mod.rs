//! # Job Scheduler
//!
//! Runs the four periodic sequencer jobs until shutdown:
//!
//! | Job | Period | Work |
//! |-----|--------|------|
//! | `purge-expired` | housekeeping | Delete instances past retention |
//! | `purge-closed` | housekeeping | Delete CLOSED instances |
//! | `message-actions` | override | Apply CONSUME / EXPIRE |
//! | `instance-actions` | override | Apply CLOSE / CONSUME_ALL |
//!
//! Each run is guarded by a [`JobLock`] so that only one runner executes a
//! given job at a time.

pub mod job_lock;

pub use job_lock::{JobLock, LocalJobLock};

use sequencer_core::{
    Housekeeper, OverrideReport, PendingActionProcessor, PurgeReport, SequencedPayload,
    SequencerService, SequencingError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Job {
    PurgeExpired,
    PurgeClosed,
    MessageActions,
    InstanceActions,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::PurgeExpired,
        Job::PurgeClosed,
        Job::MessageActions,
        Job::InstanceActions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Job::PurgeExpired => "purge-expired",
            Job::PurgeClosed => "purge-closed",
            Job::MessageActions => "message-actions",
            Job::InstanceActions => "instance-actions",
        }
    }
}

/// Result of one job run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobReport {
    Purge(PurgeReport),
    Overrides(OverrideReport),
}

pub struct JobScheduler<M: SequencedPayload> {
    housekeeper: Arc<Housekeeper>,
    overrides: Arc<PendingActionProcessor<M>>,
    lock: Arc<dyn JobLock>,
    housekeeping_interval: Duration,
    override_interval: Duration,
}

impl<M: SequencedPayload> JobScheduler<M> {
    pub fn new(
        service: &SequencerService<M>,
        lock: Arc<dyn JobLock>,
        housekeeping_interval: Duration,
        override_interval: Duration,
    ) -> Self {
        Self {
            housekeeper: service.housekeeper(),
            overrides: service.overrides(),
            lock,
            housekeeping_interval,
            override_interval,
        }
    }

    pub fn period(&self, job: Job) -> Duration {
        match job {
            Job::PurgeExpired | Job::PurgeClosed => self.housekeeping_interval,
            Job::MessageActions | Job::InstanceActions => self.override_interval,
        }
    }

    /// Run `job` once. `None` when another runner holds its lock.
    pub async fn run_once(&self, job: Job) -> Result<Option<JobReport>, SequencingError> {
        if !self.lock.try_acquire(job.name(), self.period(job)).await {
            debug!(job = job.name(), "Job lock held elsewhere, skipping run");
            return Ok(None);
        }

        let result = match job {
            Job::PurgeExpired => self.housekeeper.purge_expired().await.map(JobReport::Purge),
            Job::PurgeClosed => self.housekeeper.purge_closed().await.map(JobReport::Purge),
            Job::MessageActions => self
                .overrides
                .process_message_actions()
                .await
                .map(JobReport::Overrides),
            Job::InstanceActions => self
                .overrides
                .process_instance_actions()
                .await
                .map(JobReport::Overrides),
        };

        self.lock.release(job.name()).await;
        result.map(Some)
    }

    /// Spawn one task per job. Tasks exit when `shutdown` flips to `true`
    /// or its sender is dropped.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        Job::ALL
            .into_iter()
            .map(|job| {
                let scheduler = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { scheduler.run_periodically(job, shutdown).await })
            })
            .collect()
    }

    async fn run_periodically(&self, job: Job, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.period(job));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = job.name(), period = ?self.period(job), "Job scheduled");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(job).await {
                        Ok(Some(report)) => debug!(job = job.name(), ?report, "Job run finished"),
                        Ok(None) => {}
                        Err(e) => error!(job = job.name(), error = %e, "Job run failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(job = job.name(), "Shutdown signal received");
                        break;
                    }
                }
            }
        }
    }
}
