//! # Concurrency
//!
//! Many workers feeding interleaved contexts must all make progress, keep
//! per-context order, and survive a worker that abandons an instance lock.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{Harness, CHAIN, FIRST_SECOND};
    use sequencer_core::test_utils::{RecordingHandler, TestMessage};
    use sequencer_core::{InstanceState, InstanceStore, SequencerConfig, StoreError};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    const CONTEXTS: usize = 16;

    // =============================================================================
    // PROGRESS AND ORDER
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_contexts_complete_without_deadlock() {
        let h = Arc::new(Harness::with_handler(
            CHAIN,
            RecordingHandler::new().with_delay(Duration::from_millis(10)),
        ));

        let mut tasks = Vec::new();
        for n in 0..CONTEXTS {
            let context = format!("ctx-{n}");
            for kind in ["C", "B", "A"] {
                let h = Arc::clone(&h);
                let message = TestMessage::new(kind, &context, &format!("{kind}-{n}"));
                tasks.push(tokio::spawn(async move { h.send(&message).await }));
            }
        }

        timeout(Duration::from_secs(20), async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        })
        .await
        .expect("sequencing deadlocked");

        let handled = h.handler.handled();
        assert_eq!(handled.len(), CONTEXTS * 3);
        for n in 0..CONTEXTS {
            let context = format!("ctx-{n}");
            let order: Vec<&str> = handled
                .iter()
                .filter(|m| m.context.as_deref() == Some(context.as_str()))
                .map(|m| m.kind.as_str())
                .collect();
            assert_eq!(order, vec!["A", "B", "C"], "context {context}");
            assert_eq!(
                h.instance("chain", &context).await.unwrap().state,
                InstanceState::Closed
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_redelivery_storm_handles_each_message_once() {
        let h = Arc::new(Harness::with_handler(
            FIRST_SECOND,
            RecordingHandler::new().with_delay(Duration::from_millis(2)),
        ));

        let mut tasks = Vec::new();
        for round in 0..4 {
            for n in 0..CONTEXTS {
                let context = format!("ctx-{n}");
                let arrival = if (round + n) % 2 == 0 {
                    ["Second", "First"]
                } else {
                    ["First", "Second"]
                };
                for kind in arrival {
                    let h = Arc::clone(&h);
                    let message = TestMessage::new(kind, &context, &format!("{kind}-{n}"));
                    tasks.push(tokio::spawn(async move { h.send(&message).await }));
                }
            }
        }

        timeout(Duration::from_secs(20), async {
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        })
        .await
        .expect("sequencing deadlocked");

        assert_eq!(h.store.row_counts().messages, CONTEXTS * 2);
        assert_eq!(h.handler.count(), CONTEXTS * 2);
        let handled = h.handler.handled();
        for n in 0..CONTEXTS {
            let context = format!("ctx-{n}");
            let seen = |kind: &str| {
                handled
                    .iter()
                    .position(|m| m.context.as_deref() == Some(context.as_str()) && m.kind == kind)
            };
            let (first_seen, second_seen) = (seen("First"), seen("Second"));
            assert!(first_seen.is_some() && first_seen < second_seen, "context {context}");
            assert_eq!(
                h.instance("first-second", &context).await.unwrap().state,
                InstanceState::Closed
            );
        }
    }

    // =============================================================================
    // LEASE RECLAIM
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_lock_is_reclaimed_after_idle_timeout() {
        let h = Harness::with_config(
            FIRST_SECOND,
            SequencerConfig {
                lock_idle_timeout: Duration::from_millis(200),
                ..Default::default()
            },
        );

        h.send(&TestMessage::new("Second", "K", "second-1")).await.unwrap();
        let instance = h.instance("first-second", "K").await.unwrap();

        // A worker that locks the instance and then stalls forever.
        let abandoned = h
            .store
            .lock_for_update(instance.id, Duration::from_millis(200))
            .await
            .unwrap();

        timeout(
            Duration::from_secs(5),
            h.send(&TestMessage::new("First", "K", "first-1")),
        )
        .await
        .expect("waiter never reclaimed the idle lock")
        .unwrap();

        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
        assert_eq!(
            h.instance("first-second", "K").await.unwrap().state,
            InstanceState::Closed
        );
        assert_eq!(
            h.store.heartbeat(&abandoned).await,
            Err(StoreError::LockLost(instance.id))
        );
    }
}
