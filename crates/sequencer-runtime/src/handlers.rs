//! Release sink: the runtime's message handler.
//!
//! Every released message is written as one JSON line, so the sink output is
//! the sequenced order of the input.

use crate::message::JsonMessage;
use async_trait::async_trait;
use parking_lot::Mutex;
use sequencer_core::{HandlerError, HandlerTable, MessageHandler, SequenceCatalog};
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

pub struct ReleaseSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> ReleaseSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: Write + Send + 'static> MessageHandler<JsonMessage> for ReleaseSink<W> {
    async fn handle(&self, _key: &[u8], message: &JsonMessage) -> Result<(), HandlerError> {
        let line = serde_json::to_string(message).map_err(|e| HandlerError::new(e.to_string()))?;
        {
            let mut out = self.out.lock();
            writeln!(out, "{line}").map_err(|e| HandlerError::new(e.to_string()))?;
            out.flush().map_err(|e| HandlerError::new(e.to_string()))?;
        }

        debug!(
            message_type = %message.message_type,
            idempotence_id = %message.id,
            "Released message"
        );
        Ok(())
    }
}

/// Route every base type of the catalog to `handler`.
pub fn handler_table(
    catalog: &SequenceCatalog<JsonMessage>,
    handler: Arc<dyn MessageHandler<JsonMessage>>,
) -> HandlerTable<JsonMessage> {
    let mut table = HandlerTable::new();
    for definition in catalog.definitions() {
        for spec in &definition.message_types {
            table.register(spec.qualified_name.base_type(), Arc::clone(&handler));
        }
    }
    table
}
