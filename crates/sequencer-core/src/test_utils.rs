//! Shared fixtures for unit and integration tests.
//!
//! Available to this crate's tests and, through the `test-utils` feature, to
//! the workspace test suite.

use crate::catalog::CapabilityRegistry;
use crate::domain::definitions::SequencedPayload;
use crate::domain::entities::{BufferedMessage, InboundRecord, SequencedMessage};
use crate::domain::errors::{DecodeError, HandlerError};
use crate::domain::value_objects::MessageId;
use crate::ports::outbound::{Acknowledgment, FailureReporter, MessageDecoder, MessageHandler};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Minimal business message carried as JSON in record values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestMessage {
    pub kind: String,
    pub context: Option<String>,
    pub id: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub priority: bool,
}

impl TestMessage {
    pub fn new(kind: &str, context: &str, id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            context: Some(context.to_string()),
            id: id.to_string(),
            subtype: None,
            priority: true,
        }
    }

    pub fn with_subtype(mut self, subtype: &str) -> Self {
        self.subtype = Some(subtype.to_string());
        self
    }

    pub fn without_context(mut self) -> Self {
        self.context = None;
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    /// Broker record carrying this message as its JSON value.
    pub fn to_record(&self, offset: i64) -> InboundRecord {
        let value = serde_json::to_vec(self).unwrap_or_default();
        InboundRecord::new(self.kind.clone(), 0, offset)
            .with_key(self.id.as_bytes().to_vec())
            .with_value(value)
    }
}

impl SequencedPayload for TestMessage {
    fn message_type(&self) -> &str {
        &self.kind
    }

    fn idempotence_id(&self) -> String {
        self.id.clone()
    }
}

/// Capabilities `context`, `priority-only` and `subtype` for [`TestMessage`].
pub fn test_capabilities() -> CapabilityRegistry<TestMessage> {
    CapabilityRegistry::new()
        .with_extractor("context", |m: &TestMessage| m.context.clone())
        .with_filter("priority-only", |m: &TestMessage| m.priority)
        .with_resolver("subtype", |m: &TestMessage| {
            m.subtype.clone().unwrap_or_default()
        })
}

/// Decodes [`TestMessage`] from the buffered JSON value.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestDecoder;

impl MessageDecoder<TestMessage> for TestDecoder {
    fn decode(&self, buffered: &BufferedMessage) -> Result<TestMessage, DecodeError> {
        serde_json::from_slice(&buffered.value).map_err(|e| DecodeError(e.to_string()))
    }
}

/// Handler that records every message it sees, in order.
#[derive(Default)]
pub struct RecordingHandler {
    handled: Mutex<Vec<TestMessage>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every message of this base type until [`Self::recover`] is called.
    pub fn fail_on(&self, kind: &str) {
        self.failing.lock().insert(kind.to_string());
    }

    pub fn recover(&self, kind: &str) {
        self.failing.lock().remove(kind);
    }

    /// Base types of the successfully handled messages, in call order.
    pub fn kinds(&self) -> Vec<String> {
        self.handled.lock().iter().map(|m| m.kind.clone()).collect()
    }

    pub fn handled(&self) -> Vec<TestMessage> {
        self.handled.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.handled.lock().len()
    }
}

#[async_trait]
impl MessageHandler<TestMessage> for RecordingHandler {
    async fn handle(&self, _key: &[u8], message: &TestMessage) -> Result<(), HandlerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&message.kind) {
            return Err(HandlerError::new(format!("{} rejected", message.kind)));
        }
        self.handled.lock().push(message.clone());
        Ok(())
    }
}

/// Failure reporter that keeps what it was told.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(MessageId, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(MessageId, String)> {
        self.reports.lock().clone()
    }
}

#[async_trait]
impl FailureReporter for RecordingReporter {
    async fn report(
        &self,
        message: &SequencedMessage,
        _buffered: Option<&BufferedMessage>,
        cause: &str,
    ) {
        self.reports.lock().push((message.id, cause.to_string()));
    }
}

/// Acknowledgment that counts calls.
#[derive(Default)]
pub struct CountingAck {
    count: AtomicUsize,
}

impl CountingAck {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Acknowledgment for CountingAck {
    fn acknowledge(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
