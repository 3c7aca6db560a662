//! # Handler Failures and Retries
//!
//! A failing handler marks its message FAILED and blocks its dependents.
//! Redelivering the same idempotence id retries it and, on success, resumes
//! the cascade.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{Harness, CHAIN, FIRST_SECOND};
    use sequencer_core::test_utils::TestMessage;
    use sequencer_core::{HandleOutcome, InstanceState, MessageState, SequencingError};

    #[tokio::test]
    async fn test_failed_first_blocks_second_until_retry() {
        let h = Harness::new(FIRST_SECOND);
        let first = TestMessage::new("First", "K", "first-1");
        let second = TestMessage::new("Second", "K", "second-1");

        h.handler.fail_on("First");
        let err = h.send(&first).await.unwrap_err();
        assert!(matches!(err, SequencingError::Handler(_)));
        assert_eq!(h.state_of("first-second", "K", "First").await, Some(MessageState::Failed));
        assert_eq!(h.acks.count(), 0);

        assert_eq!(h.send(&second).await.unwrap(), HandleOutcome::Buffered);
        assert_eq!(h.state_of("first-second", "K", "Second").await, Some(MessageState::Waiting));

        h.handler.recover("First");
        assert_eq!(h.send(&first).await.unwrap(), HandleOutcome::Processed);

        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
        assert_eq!(h.rows("first-second", "K").await.len(), 2);
        assert_eq!(
            h.instance("first-second", "K").await.unwrap().state,
            InstanceState::Closed
        );
    }

    #[tokio::test]
    async fn test_cascade_failure_is_reported_and_retried_by_redelivery() {
        let h = Harness::new(CHAIN);
        let b = TestMessage::new("B", "ctx", "b");
        let c = TestMessage::new("C", "ctx", "c");

        h.send(&c).await.unwrap();
        h.send(&b).await.unwrap();

        h.handler.fail_on("B");
        h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap();

        assert_eq!(h.handler.kinds(), vec!["A"]);
        assert_eq!(h.state_of("chain", "ctx", "B").await, Some(MessageState::Failed));
        assert_eq!(h.state_of("chain", "ctx", "C").await, Some(MessageState::Waiting));
        assert_eq!(h.reporter.reports().len(), 1);

        h.handler.recover("B");
        assert_eq!(h.send(&b).await.unwrap(), HandleOutcome::Processed);
        assert_eq!(h.handler.kinds(), vec!["A", "B", "C"]);
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Closed);
    }

    #[tokio::test]
    async fn test_failing_retry_reuses_failed_row() {
        let h = Harness::new(CHAIN);
        let b = TestMessage::new("B", "ctx", "b");

        h.send(&b).await.unwrap();
        h.handler.fail_on("B");
        h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap();
        assert_eq!(h.state_of("chain", "ctx", "B").await, Some(MessageState::Failed));

        // A is PROCESSED, so a redelivered B is handled immediately and fails again.
        let err = h.send(&b).await.unwrap_err();
        assert!(matches!(err, SequencingError::Handler(_)));
        assert_eq!(h.state_of("chain", "ctx", "B").await, Some(MessageState::Failed));
        assert_eq!(h.store.row_counts().messages, 2);
    }
}
