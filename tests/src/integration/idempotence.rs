//! # Idempotence
//!
//! One row per (qualified type, idempotence id); redeliveries of WAITING,
//! IN_FLIGHT or PROCESSED messages are acknowledged without another handler
//! call, including deliveries that arrive while the first is still handled.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{Harness, FIRST_SECOND};
    use sequencer_core::test_utils::{RecordingHandler, TestMessage};
    use sequencer_core::{HandleOutcome, MessageState};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_redelivered_processed_message_is_duplicate() {
        let h = Harness::new(FIRST_SECOND);
        let first = TestMessage::new("First", "K", "first-1");

        assert_eq!(h.send(&first).await.unwrap(), HandleOutcome::Processed);
        for _ in 0..4 {
            assert_eq!(h.send(&first).await.unwrap(), HandleOutcome::Duplicate);
        }

        assert_eq!(h.handler.count(), 1);
        assert_eq!(h.rows("first-second", "K").await.len(), 1);
        assert_eq!(h.acks.count(), 5);
    }

    #[tokio::test]
    async fn test_redelivered_waiting_message_keeps_one_payload() {
        let h = Harness::new(FIRST_SECOND);
        let second = TestMessage::new("Second", "K", "second-1");

        assert_eq!(h.send(&second).await.unwrap(), HandleOutcome::Buffered);
        assert_eq!(h.send(&second).await.unwrap(), HandleOutcome::Duplicate);

        let counts = h.store.row_counts();
        assert_eq!(counts.messages, 1);
        assert_eq!(counts.buffered, 1);

        h.send(&TestMessage::new("First", "K", "first-1")).await.unwrap();
        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_same_id_different_types_are_distinct() {
        let h = Harness::new(FIRST_SECOND);

        h.send(&TestMessage::new("First", "K", "shared-id")).await.unwrap();
        let outcome = h.send(&TestMessage::new("Second", "K", "shared-id")).await.unwrap();

        assert_eq!(outcome, HandleOutcome::Processed);
        assert_eq!(h.handler.count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_buffered_deliveries_store_one_row() {
        let h = Arc::new(Harness::new(FIRST_SECOND));
        let second = TestMessage::new("Second", "K", "second-1");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                let second = second.clone();
                tokio::spawn(async move { h.send(&second).await })
            })
            .collect();

        let mut buffered = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                HandleOutcome::Buffered => buffered += 1,
                HandleOutcome::Duplicate => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(buffered, 1);
        assert_eq!(h.store.row_counts().messages, 1);
        assert_eq!(h.store.row_counts().instances, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_immediate_deliveries_call_handler_once() {
        let h = Arc::new(Harness::with_handler(
            FIRST_SECOND,
            RecordingHandler::new().with_delay(Duration::from_millis(50)),
        ));
        let first = TestMessage::new("First", "K", "first-1");

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&h);
                let first = first.clone();
                tokio::spawn(async move { h.send(&first).await })
            })
            .collect();

        let mut processed = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                HandleOutcome::Processed => processed += 1,
                HandleOutcome::Duplicate => {}
                other => panic!("unexpected outcome {other:?}"),
            }
        }

        assert_eq!(processed, 1);
        assert_eq!(h.handler.count(), 1);
        assert_eq!(h.rows("first-second", "K").await.len(), 1);
        assert_eq!(
            h.state_of("first-second", "K", "First").await,
            Some(MessageState::Processed)
        );
        assert_eq!(h.acks.count(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retry_racing_release_calls_handler_once() {
        let h = Arc::new(Harness::with_handler(
            FIRST_SECOND,
            RecordingHandler::new().with_delay(Duration::from_millis(20)),
        ));
        let second = TestMessage::new("Second", "K", "second-1");
        let first = TestMessage::new("First", "K", "first-1");

        // Second waits; First and a redelivered Second then arrive together.
        assert_eq!(h.send(&second).await.unwrap(), HandleOutcome::Buffered);
        let releasing = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.send(&first).await })
        };
        let redelivered = {
            let h = Arc::clone(&h);
            let second = second.clone();
            tokio::spawn(async move { h.send(&second).await })
        };
        releasing.await.unwrap().unwrap();
        redelivered.await.unwrap().unwrap();

        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
    }
}
