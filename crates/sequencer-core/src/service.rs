//! # Sequencer Service
//!
//! Wires the application services around one store, one catalog and one
//! clock so every entry point sees the same state.

use crate::adapters::{InMemorySequenceStore, LoggingFailureReporter, SystemClock};
use crate::application::{
    AdminService, Housekeeper, PendingActionProcessor, ReleaseEngine, SequencingInbox,
};
use crate::catalog::SequenceCatalog;
use crate::config::SequencerConfig;
use crate::domain::definitions::SequencedPayload;
use crate::domain::errors::ConfigurationError;
use crate::ports::outbound::{
    Clock, FailureReporter, HandlerRegistry, MessageDecoder, SequenceStore,
};
use std::sync::Arc;

/// Collaborators the host application provides.
pub struct SequencerParts<M: SequencedPayload> {
    pub catalog: Arc<SequenceCatalog<M>>,
    pub store: Arc<dyn SequenceStore>,
    pub handlers: Arc<dyn HandlerRegistry<M>>,
    pub decoder: Arc<dyn MessageDecoder<M>>,
    pub reporter: Arc<dyn FailureReporter>,
    pub clock: Arc<dyn Clock>,
}

impl<M: SequencedPayload> SequencerParts<M> {
    /// In-memory store, log reporter and system clock.
    pub fn in_memory(
        catalog: Arc<SequenceCatalog<M>>,
        handlers: Arc<dyn HandlerRegistry<M>>,
        decoder: Arc<dyn MessageDecoder<M>>,
    ) -> Self {
        Self {
            catalog,
            store: Arc::new(InMemorySequenceStore::new()),
            handlers,
            decoder,
            reporter: Arc::new(LoggingFailureReporter),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Every sequencer entry point, sharing one store.
pub struct SequencerService<M: SequencedPayload> {
    inbox: Arc<SequencingInbox<M>>,
    overrides: Arc<PendingActionProcessor<M>>,
    housekeeper: Arc<Housekeeper>,
    admin: Arc<AdminService>,
    store: Arc<dyn SequenceStore>,
}

impl<M: SequencedPayload> SequencerService<M> {
    pub fn new(parts: SequencerParts<M>, config: SequencerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let engine = Arc::new(ReleaseEngine::new(
            Arc::clone(&parts.store),
            parts.handlers,
            parts.decoder,
            parts.reporter,
            Arc::clone(&parts.clock),
            config.clone(),
        ));

        Ok(Self {
            inbox: Arc::new(SequencingInbox::new(
                Arc::clone(&parts.catalog),
                Arc::clone(&parts.store),
                Arc::clone(&engine),
                Arc::clone(&parts.clock),
                config.clone(),
            )),
            overrides: Arc::new(PendingActionProcessor::new(
                parts.catalog,
                Arc::clone(&parts.store),
                engine,
                Arc::clone(&parts.clock),
                config,
            )),
            housekeeper: Arc::new(Housekeeper::new(
                Arc::clone(&parts.store),
                Arc::clone(&parts.clock),
            )),
            admin: Arc::new(AdminService::new(Arc::clone(&parts.store), parts.clock)),
            store: parts.store,
        })
    }

    pub fn inbox(&self) -> Arc<SequencingInbox<M>> {
        Arc::clone(&self.inbox)
    }

    pub fn overrides(&self) -> Arc<PendingActionProcessor<M>> {
        Arc::clone(&self.overrides)
    }

    pub fn housekeeper(&self) -> Arc<Housekeeper> {
        Arc::clone(&self.housekeeper)
    }

    pub fn admin(&self) -> Arc<AdminService> {
        Arc::clone(&self.admin)
    }

    pub fn store(&self) -> Arc<dyn SequenceStore> {
        Arc::clone(&self.store)
    }
}
