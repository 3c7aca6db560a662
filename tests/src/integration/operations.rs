//! # Operations
//!
//! Administrative overrides, housekeeping, recording mode and startup
//! validation, driven through the public service surface.

#[cfg(test)]
mod tests {
    use super::super::fixtures::{start_time, Harness, CHAIN, FIRST_SECOND};
    use sequencer_core::test_utils::{test_capabilities, TestMessage};
    use sequencer_core::{
        ConfigurationError, HandleOutcome, HandlerTable, InstancePendingAction, InstanceState,
        MessagePendingAction, MessageState, MessageStore, QualifiedName, RecordHeader,
        SequenceCatalog, SequencerConfig, SequencerParts, SequencerService, SequencingAdminApi,
    };
    use std::sync::Arc;
    use std::time::Duration;

    async fn message_id(h: &Harness, kind: &str, id: &str) -> sequencer_core::MessageId {
        h.store
            .find_message(&QualifiedName::new(kind), id)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    // =============================================================================
    // OVERRIDES
    // =============================================================================

    #[tokio::test]
    async fn test_consume_releases_waiting_message_out_of_order() {
        let h = Harness::new(CHAIN);
        h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap();

        let id = message_id(&h, "C", "c").await;
        h.service
            .admin()
            .request_message_action(id, MessagePendingAction::Consume)
            .await
            .unwrap();
        let report = h.service.overrides().process_message_actions().await.unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.consumed, 1);
        assert_eq!(h.handler.kinds(), vec!["C"]);
        assert_eq!(h.state_of("chain", "ctx", "C").await, Some(MessageState::Processed));
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Open);

        let row = h.store.get_message(id).await.unwrap().unwrap();
        assert!(row.pending_action.is_none());
    }

    #[tokio::test]
    async fn test_expired_message_blocks_completion_until_redelivered() {
        let h = Harness::new(CHAIN);
        h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap();

        let id = message_id(&h, "C", "c").await;
        h.service
            .admin()
            .request_message_action(id, MessagePendingAction::Expire)
            .await
            .unwrap();
        let report = h.service.overrides().process_message_actions().await.unwrap();
        assert_eq!(report.expired, 1);

        h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap();
        h.send(&TestMessage::new("B", "ctx", "b")).await.unwrap();
        assert_eq!(h.handler.kinds(), vec!["A", "B"]);
        assert_eq!(h.state_of("chain", "ctx", "C").await, Some(MessageState::Failed));
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Open);

        assert_eq!(
            h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap(),
            HandleOutcome::Processed
        );
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Closed);
    }

    #[tokio::test]
    async fn test_consume_all_releases_in_arrival_order() {
        let h = Harness::new(CHAIN);
        h.send(&TestMessage::new("C", "ctx", "c")).await.unwrap();
        h.send(&TestMessage::new("B", "ctx", "b")).await.unwrap();
        let instance = h.instance("chain", "ctx").await.unwrap();

        h.service
            .admin()
            .request_instance_action(instance.id, InstancePendingAction::ConsumeAll)
            .await
            .unwrap();
        let report = h.service.overrides().process_instance_actions().await.unwrap();

        assert_eq!(report.consumed, 2);
        assert_eq!(h.handler.kinds(), vec!["C", "B"]);
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Open);

        // The missing head still completes the instance.
        h.send(&TestMessage::new("A", "ctx", "a")).await.unwrap();
        assert_eq!(h.instance("chain", "ctx").await.unwrap().state, InstanceState::Closed);
    }

    #[tokio::test]
    async fn test_close_request_forces_closed() {
        let h = Harness::new(CHAIN);
        h.send(&TestMessage::new("B", "ctx", "b")).await.unwrap();
        let instance = h.instance("chain", "ctx").await.unwrap();

        h.service
            .admin()
            .request_instance_action(instance.id, InstancePendingAction::Close)
            .await
            .unwrap();
        let report = h.service.overrides().process_instance_actions().await.unwrap();

        assert_eq!(report.closed, 1);
        let closed = h.instance("chain", "ctx").await.unwrap();
        assert_eq!(closed.state, InstanceState::Closed);
        assert!(closed.pending_action.is_none());
        assert!(h.handler.kinds().is_empty());
    }

    // =============================================================================
    // HOUSEKEEPING
    // =============================================================================

    #[tokio::test]
    async fn test_housekeeping_deletes_closed_then_expired() {
        let h = Harness::new(FIRST_SECOND);

        let waiting = TestMessage::new("Second", "stuck", "second-stuck");
        let record = waiting
            .to_record(100)
            .with_header(RecordHeader::new("source", b"web".to_vec()))
            .with_header(RecordHeader::new("attempt", b"1".to_vec()));
        assert_eq!(h.send_record(&record, &waiting).await.unwrap(), HandleOutcome::Buffered);

        h.send(&TestMessage::new("Second", "done", "second-done")).await.unwrap();
        h.send(&TestMessage::new("First", "done", "first-done")).await.unwrap();

        let counts = h.store.row_counts();
        assert_eq!(counts.instances, 2);
        assert_eq!(counts.messages, 3);
        assert_eq!(counts.buffered, 2);
        assert_eq!(counts.headers, 2);

        let closed = h.service.housekeeper().purge_closed().await.unwrap();
        assert_eq!(closed.instances, 1);
        assert_eq!(closed.messages, 2);
        assert_eq!(closed.buffered, 1);
        assert_eq!(closed.headers, 0);
        assert!(h.instance("first-second", "done").await.is_none());

        h.clock.advance(chrono::Duration::minutes(59));
        assert!(h.service.housekeeper().purge_expired().await.unwrap().is_empty());

        h.clock.advance(chrono::Duration::minutes(1));
        let expired = h.service.housekeeper().purge_expired().await.unwrap();
        assert_eq!(expired.instances, 1);
        assert_eq!(expired.messages, 1);
        assert_eq!(expired.buffered, 1);
        assert_eq!(expired.headers, 2);
        assert_eq!(h.store.row_counts(), Default::default());
    }

    #[tokio::test]
    async fn test_expiring_instances_window() {
        let h = Harness::new(FIRST_SECOND);
        h.send(&TestMessage::new("Second", "K", "s")).await.unwrap();

        let admin = h.service.admin();
        assert!(admin
            .expiring_instances(Duration::from_secs(30 * 60), 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            admin
                .expiring_instances(Duration::from_secs(60 * 60), 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    // =============================================================================
    // RECORDING MODE
    // =============================================================================

    #[tokio::test]
    async fn test_recording_mode_bypasses_conditions_until_cutover() {
        let h = Harness::with_config(
            FIRST_SECOND,
            SequencerConfig {
                recording_cutover: Some(start_time() + chrono::Duration::hours(1)),
                ..Default::default()
            },
        );

        assert_eq!(
            h.send(&TestMessage::new("Second", "early", "s-early")).await.unwrap(),
            HandleOutcome::Processed
        );
        assert_eq!(h.store.row_counts().buffered, 0);
        h.send(&TestMessage::new("First", "early", "f-early")).await.unwrap();
        assert_eq!(
            h.instance("first-second", "early").await.unwrap().state,
            InstanceState::Closed
        );

        h.clock.advance(chrono::Duration::hours(2));
        assert_eq!(
            h.send(&TestMessage::new("Second", "late", "s-late")).await.unwrap(),
            HandleOutcome::Buffered
        );
    }

    // =============================================================================
    // STARTUP VALIDATION
    // =============================================================================

    fn load(document: &str) -> Result<SequenceCatalog<TestMessage>, ConfigurationError> {
        SequenceCatalog::from_json_str(document, &test_capabilities())
    }

    #[test]
    fn test_cyclic_conditions_rejected() {
        let result = load(
            r#"{ "sequences": [ { "name": "loop", "retention_period": "1h",
                 "message_types": [
                   { "type": "A", "context_id_extractor": "context",
                     "release_condition": { "predecessor": "B" } },
                   { "type": "B", "context_id_extractor": "context",
                     "release_condition": { "predecessor": "A" } } ] } ] }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::CyclicDependency(_))));
    }

    #[test]
    fn test_unknown_predecessor_rejected() {
        let result = load(
            r#"{ "sequences": [ { "name": "s", "retention_period": "1h",
                 "message_types": [
                   { "type": "A", "context_id_extractor": "context",
                     "release_condition": { "predecessor": "Ghost" } } ] } ] }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::UnknownPredecessor { .. })));
    }

    #[test]
    fn test_missing_retention_rejected() {
        let result = load(
            r#"{ "sequences": [ { "name": "s",
                 "message_types": [ { "type": "A", "context_id_extractor": "context" } ] } ] }"#,
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidRetention { .. })));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let catalog = Arc::new(load(FIRST_SECOND).unwrap());
        let parts = SequencerParts::in_memory(
            catalog,
            Arc::new(HandlerTable::new()),
            Arc::new(sequencer_core::test_utils::TestDecoder),
        );
        let config = SequencerConfig {
            override_page_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            SequencerService::new(parts, config),
            Err(ConfigurationError::InvalidSetting(_))
        ));
    }
}
