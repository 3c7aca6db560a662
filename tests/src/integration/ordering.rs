//! # Release Order and Completeness
//!
//! Messages arriving out of order are released in release-graph order, the
//! cascade runs to a fixed point, and an instance closes exactly when every
//! declared type has been processed.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{Harness, CHAIN, EITHER, FIRST_SECOND};
    use sequencer_core::test_utils::TestMessage;
    use sequencer_core::{HandleOutcome, InstanceState, MessageState, MessageStore};

    // =============================================================================
    // SCENARIO: FIRST / SECOND
    // =============================================================================

    #[tokio::test]
    async fn test_second_waits_for_first_then_closes() {
        let h = Harness::new(FIRST_SECOND);

        let second = TestMessage::new("Second", "K", "second-1");
        assert_eq!(h.send(&second).await.unwrap(), HandleOutcome::Buffered);

        let instance = h.instance("first-second", "K").await.unwrap();
        assert_eq!(instance.state, InstanceState::Open);
        assert_eq!(h.state_of("first-second", "K", "Second").await, Some(MessageState::Waiting));
        assert_eq!(h.store.row_counts().buffered, 1);
        assert!(h.handler.kinds().is_empty());

        let first = TestMessage::new("First", "K", "first-1");
        assert_eq!(h.send(&first).await.unwrap(), HandleOutcome::Processed);

        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
        assert_eq!(h.state_of("first-second", "K", "Second").await, Some(MessageState::Processed));
        let instance = h.instance("first-second", "K").await.unwrap();
        assert_eq!(instance.state, InstanceState::Closed);
        assert!(instance.closed_at.is_some());

        // Payload stays until housekeeping removes the closed instance.
        let second_row = h
            .store
            .find_message(&"Second".into(), "second-1")
            .await
            .unwrap()
            .unwrap();
        assert!(h.store.buffered_message(second_row.id).await.unwrap().is_some());
        assert_eq!(h.acks.count(), 2);
    }

    #[tokio::test]
    async fn test_in_order_arrival_never_buffers() {
        let h = Harness::new(FIRST_SECOND);

        h.send(&TestMessage::new("First", "K", "f")).await.unwrap();
        h.send(&TestMessage::new("Second", "K", "s")).await.unwrap();

        assert_eq!(h.handler.kinds(), vec!["First", "Second"]);
        assert_eq!(h.store.row_counts().buffered, 0);
        assert_eq!(
            h.instance("first-second", "K").await.unwrap().state,
            InstanceState::Closed
        );
    }

    // =============================================================================
    // CASCADE
    // =============================================================================

    #[tokio::test]
    async fn test_reverse_chain_cascades_in_graph_order() {
        let h = Harness::new(CHAIN);

        assert_eq!(h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap(), HandleOutcome::Buffered);
        assert_eq!(h.send(&TestMessage::new("B", "ctx", "b")).await.unwrap(), HandleOutcome::Buffered);
        assert!(h.handler.kinds().is_empty());

        assert_eq!(h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap(), HandleOutcome::Processed);
        assert_eq!(h.handler.kinds(), vec!["A", "B", "C"]);
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Closed);
    }

    #[tokio::test]
    async fn test_partial_chain_stays_open() {
        let h = Harness::new(CHAIN);

        h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap();
        h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap();

        assert_eq!(h.handler.kinds(), vec!["A"]);
        assert_eq!(h.state_of("chain", "ctx", "C").await, Some(MessageState::Waiting));
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Open);
    }

    #[tokio::test]
    async fn test_contexts_do_not_share_progress() {
        let h = Harness::new(FIRST_SECOND);

        h.send(&TestMessage::new("Second", "left", "s-left")).await.unwrap();
        h.send(&TestMessage::new("First", "right", "f-right")).await.unwrap();

        assert_eq!(h.state_of("first-second", "left", "Second").await, Some(MessageState::Waiting));
        assert_eq!(h.handler.kinds(), vec!["First"]);
    }

    // =============================================================================
    // OR CONDITIONS
    // =============================================================================

    #[tokio::test]
    async fn test_either_predecessor_releases() {
        let h = Harness::new(EITHER);

        assert_eq!(h.send(&TestMessage::new("C", "k", "c")).await.unwrap(), HandleOutcome::Buffered);
        assert_eq!(h.send(&TestMessage::new("A", "k", "a")).await.unwrap(), HandleOutcome::Processed);

        assert_eq!(h.handler.kinds(), vec!["A", "C"]);
        assert_eq!(h.state_of("either", "k", "A").await, Some(MessageState::Processed));
        assert_eq!(h.state_of("either", "k", "C").await, Some(MessageState::Processed));
        assert_eq!(h.instance("either", "k").await.unwrap().state, InstanceState::Open);

        assert_eq!(h.send(&TestMessage::new("B", "k", "b")).await.unwrap(), HandleOutcome::Processed);
        assert_eq!(h.handler.kinds(), vec!["A", "C", "B"]);
        assert_eq!(h.instance("either", "k").await.unwrap().state, InstanceState::Closed);
    }
}
