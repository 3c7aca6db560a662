//! # Sequencer Container
//!
//! Builds the sequencer from a [`RuntimeConfig`]: loads the sequence document,
//! resolves its JSON-pointer capabilities, and wires the in-memory store,
//! decoder and release sink into one [`SequencerService`].

pub mod config;

pub use config::{RuntimeConfig, RuntimeConfigError, CONFIG_PATH_VAR};

use crate::handlers::handler_table;
use crate::message::{pointer_capabilities, JsonDecoder, JsonMessage};
use sequencer_core::{
    ConfigurationError, MessageHandler, SequenceCatalog, SequencerParts, SequencerService,
    SequencingDocument,
};
use std::sync::Arc;
use tracing::info;

pub struct SequencerContainer {
    pub config: RuntimeConfig,
    pub catalog: Arc<SequenceCatalog<JsonMessage>>,
    pub service: SequencerService<JsonMessage>,
    /// Handler used for records released on arrival.
    pub sink: Arc<dyn MessageHandler<JsonMessage>>,
}

impl SequencerContainer {
    /// Load the configured sequence document and build the service.
    pub fn new(
        config: RuntimeConfig,
        sink: Arc<dyn MessageHandler<JsonMessage>>,
    ) -> Result<Self, ConfigurationError> {
        let document = SequencingDocument::from_path(&config.sequence_document)?;
        Self::from_document(config, &document, sink)
    }

    pub fn from_document(
        config: RuntimeConfig,
        document: &SequencingDocument,
        sink: Arc<dyn MessageHandler<JsonMessage>>,
    ) -> Result<Self, ConfigurationError> {
        let catalog = Arc::new(SequenceCatalog::load(
            document,
            &pointer_capabilities(document),
        )?);
        let handlers = Arc::new(handler_table(&catalog, Arc::clone(&sink)));

        let service = SequencerService::new(
            SequencerParts::in_memory(Arc::clone(&catalog), handlers, Arc::new(JsonDecoder)),
            config.sequencer.clone(),
        )?;

        info!(
            document = ?config.sequence_document,
            sequences = catalog.definitions().len(),
            message_types = catalog.len(),
            "Sequencer container ready"
        );

        Ok(Self {
            config,
            catalog,
            service,
            sink,
        })
    }
}
