//! Mutual exclusion for scheduled jobs.
//!
//! A lock is held for at most `hold_for`; a holder that dies without
//! releasing it blocks the job only until then.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[async_trait]
pub trait JobLock: Send + Sync {
    /// Take the lock for `job` unless someone else holds it.
    async fn try_acquire(&self, job: &str, hold_for: Duration) -> bool;

    async fn release(&self, job: &str);
}

/// Process-local [`JobLock`].
#[derive(Default)]
pub struct LocalJobLock {
    held_until: Mutex<HashMap<String, Instant>>,
}

impl LocalJobLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobLock for LocalJobLock {
    async fn try_acquire(&self, job: &str, hold_for: Duration) -> bool {
        let now = Instant::now();
        let mut held = self.held_until.lock();
        match held.get(job) {
            Some(until) if *until > now => false,
            _ => {
                held.insert(job.to_string(), now + hold_for);
                true
            }
        }
    }

    async fn release(&self, job: &str) {
        self.held_until.lock().remove(job);
    }
}
