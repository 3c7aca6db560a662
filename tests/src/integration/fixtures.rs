//! # Test Fixtures
//!
//! A [`Harness`] wires one [`SequencerService`] around an in-memory store, a
//! manual clock, a recording handler and a recording failure reporter, and
//! exposes the store for assertions.

use chrono::{TimeZone, Utc};
use sequencer_core::test_utils::{
    test_capabilities, CountingAck, RecordingHandler, RecordingReporter, TestDecoder, TestMessage,
};
use sequencer_core::{
    HandleOutcome, HandlerTable, InMemorySequenceStore, InboundRecord, InstanceStore, ManualClock,
    MessageHandler, MessageState, MessageStore, SequenceCatalog, SequenceInstance,
    SequencedMessage, SequencerConfig, SequencerParts, SequencerService, SequencingApi,
    SequencingError, Timestamp,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// First, then Second (requires First). Retention 60 minutes.
pub const FIRST_SECOND: &str = r#"{ "sequences": [ { "name": "first-second", "retention_period": "60m",
    "message_types": [
      { "type": "First", "context_id_extractor": "context" },
      { "type": "Second", "context_id_extractor": "context",
        "release_condition": { "predecessor": "First" } } ] } ] }"#;

/// A, then B (requires A), then C (requires B).
pub const CHAIN: &str = r#"{ "sequences": [ { "name": "chain", "retention_period": "60m",
    "message_types": [
      { "type": "A", "context_id_extractor": "context" },
      { "type": "B", "context_id_extractor": "context",
        "release_condition": { "predecessor": "A" } },
      { "type": "C", "context_id_extractor": "context",
        "release_condition": { "predecessor": "B" } } ] } ] }"#;

/// C requires A or B.
pub const EITHER: &str = r#"{ "sequences": [ { "name": "either", "retention_period": "60m",
    "message_types": [
      { "type": "A", "context_id_extractor": "context" },
      { "type": "B", "context_id_extractor": "context" },
      { "type": "C", "context_id_extractor": "context",
        "release_condition": { "or": [ { "predecessor": "A" }, { "predecessor": "B" } ] } } ] } ] }"#;

pub fn start_time() -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub struct Harness {
    pub service: SequencerService<TestMessage>,
    pub store: Arc<InMemorySequenceStore>,
    pub clock: Arc<ManualClock>,
    pub handler: Arc<RecordingHandler>,
    pub reporter: Arc<RecordingReporter>,
    pub acks: CountingAck,
    offsets: AtomicI64,
}

impl Harness {
    pub fn new(document: &str) -> Self {
        Self::build(document, SequencerConfig::default(), RecordingHandler::new())
    }

    pub fn with_config(document: &str, config: SequencerConfig) -> Self {
        Self::build(document, config, RecordingHandler::new())
    }

    pub fn with_handler(document: &str, handler: RecordingHandler) -> Self {
        Self::build(document, SequencerConfig::default(), handler)
    }

    pub fn build(document: &str, config: SequencerConfig, handler: RecordingHandler) -> Self {
        let catalog = Arc::new(
            SequenceCatalog::from_json_str(document, &test_capabilities())
                .unwrap_or_else(|e| panic!("invalid fixture document: {e}")),
        );
        let handler = Arc::new(handler);
        let shared: Arc<dyn MessageHandler<TestMessage>> = handler.clone();
        let mut handlers = HandlerTable::new();
        for definition in catalog.definitions() {
            for spec in &definition.message_types {
                handlers.register(spec.qualified_name.base_type(), Arc::clone(&shared));
            }
        }

        let store = Arc::new(InMemorySequenceStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let reporter = Arc::new(RecordingReporter::new());

        let service = SequencerService::new(
            SequencerParts {
                catalog,
                store: store.clone(),
                handlers: Arc::new(handlers),
                decoder: Arc::new(TestDecoder),
                reporter: reporter.clone(),
                clock: clock.clone(),
            },
            config,
        )
        .unwrap_or_else(|e| panic!("invalid fixture config: {e}"));

        Self {
            service,
            store,
            clock,
            handler,
            reporter,
            acks: CountingAck::new(),
            offsets: AtomicI64::new(0),
        }
    }

    /// Deliver `message` through the inbox with the shared handler.
    pub async fn send(&self, message: &TestMessage) -> Result<HandleOutcome, SequencingError> {
        let record = message.to_record(self.offsets.fetch_add(1, Ordering::SeqCst));
        self.send_record(&record, message).await
    }

    /// Deliver a prepared record carrying `message`.
    pub async fn send_record(
        &self,
        record: &InboundRecord,
        message: &TestMessage,
    ) -> Result<HandleOutcome, SequencingError> {
        self.service
            .inbox()
            .handle(record, message, self.handler.as_ref(), &self.acks)
            .await
    }

    pub async fn instance(&self, sequence: &str, context_id: &str) -> Option<SequenceInstance> {
        self.store
            .find_instance(sequence, context_id)
            .await
            .unwrap_or_else(|e| panic!("store failure: {e}"))
    }

    /// Every row of the instance in insertion order.
    pub async fn rows(&self, sequence: &str, context_id: &str) -> Vec<SequencedMessage> {
        let Some(instance) = self.instance(sequence, context_id).await else {
            return Vec::new();
        };
        self.store
            .messages_for_instance(
                instance.id,
                &[
                    MessageState::Waiting,
                    MessageState::InFlight,
                    MessageState::Processed,
                    MessageState::Failed,
                ],
            )
            .await
            .unwrap_or_else(|e| panic!("store failure: {e}"))
    }

    /// State of the row for `kind` in the given instance.
    pub async fn state_of(&self, sequence: &str, context_id: &str, kind: &str) -> Option<MessageState> {
        self.rows(sequence, context_id)
            .await
            .into_iter()
            .find(|row| row.qualified_name.as_str() == kind)
            .map(|row| row.state)
    }
}
