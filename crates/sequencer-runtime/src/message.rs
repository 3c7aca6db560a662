//! # JSON Messages
//!
//! The runtime's business message: a typed JSON envelope
//! `{ "type": "...", "id": "...", "body": { ... } }` carried as the record
//! value. Capabilities referenced from the sequence document as JSON
//! pointers (`"/order/id"`) are resolved against `body`.

use sequencer_core::catalog::{CapabilityRegistry, SequencingDocument};
use sequencer_core::{BufferedMessage, DecodeError, MessageDecoder, SequencedPayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub id: String,
    #[serde(default)]
    pub body: Value,
}

impl JsonMessage {
    pub fn new(message_type: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self {
            message_type: message_type.into(),
            id: id.into(),
            body,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(bytes).map_err(|e| DecodeError(e.to_string()))
    }

    /// Scalar at `pointer` rendered as a string. Objects, arrays and null yield `None`.
    pub fn text_at(&self, pointer: &str) -> Option<String> {
        match self.body.pointer(pointer)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Truthiness at `pointer`: `true`, a non-empty string or a non-zero number.
    pub fn flag_at(&self, pointer: &str) -> bool {
        match self.body.pointer(pointer) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64().map_or(false, |v| v != 0.0),
            _ => false,
        }
    }
}

impl SequencedPayload for JsonMessage {
    fn message_type(&self) -> &str {
        &self.message_type
    }

    fn idempotence_id(&self) -> String {
        self.id.clone()
    }
}

/// Decodes buffered record values back into [`JsonMessage`].
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl MessageDecoder<JsonMessage> for JsonDecoder {
    fn decode(&self, buffered: &BufferedMessage) -> Result<JsonMessage, DecodeError> {
        JsonMessage::from_slice(&buffered.value)
    }
}

fn is_pointer(reference: &str) -> bool {
    reference.starts_with('/')
}

/// Build a capability registry for every JSON pointer the document references.
///
/// References that are not pointers stay unregistered, so the catalog rejects
/// them as unknown capabilities.
pub fn pointer_capabilities(document: &SequencingDocument) -> CapabilityRegistry<JsonMessage> {
    let mut extractors = BTreeSet::new();
    let mut filters = BTreeSet::new();
    let mut resolvers = BTreeSet::new();

    for message_type in document.sequences.iter().flat_map(|s| &s.message_types) {
        if let Some(reference) = message_type.context_id_extractor.as_deref() {
            extractors.insert(reference.to_string());
        }
        if let Some(reference) = message_type.message_filter.as_deref() {
            filters.insert(reference.to_string());
        }
    }
    for binding in document.subtype_resolvers.values() {
        resolvers.insert(binding.resolver.clone());
    }

    let mut registry = CapabilityRegistry::new();
    for pointer in extractors.into_iter().filter(|r| is_pointer(r)) {
        let path = pointer.clone();
        registry = registry.with_extractor(pointer, move |m: &JsonMessage| m.text_at(&path));
    }
    for pointer in filters.into_iter().filter(|r| is_pointer(r)) {
        let path = pointer.clone();
        registry = registry.with_filter(pointer, move |m: &JsonMessage| m.flag_at(&path));
    }
    for pointer in resolvers.into_iter().filter(|r| is_pointer(r)) {
        let path = pointer.clone();
        registry = registry.with_resolver(pointer, move |m: &JsonMessage| {
            m.text_at(&path).unwrap_or_default()
        });
    }
    registry
}
