//! Named capability registry referenced by the configuration document.

use crate::domain::definitions::{ContextIdExtractor, MessageFilter, SubTypeResolver};
use std::collections::HashMap;
use std::sync::Arc;

/// Function values the document refers to by name.
pub struct CapabilityRegistry<M> {
    extractors: HashMap<String, ContextIdExtractor<M>>,
    filters: HashMap<String, MessageFilter<M>>,
    resolvers: HashMap<String, SubTypeResolver<M>>,
}

impl<M> CapabilityRegistry<M> {
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            filters: HashMap::new(),
            resolvers: HashMap::new(),
        }
    }

    pub fn with_extractor<F>(mut self, name: impl Into<String>, extractor: F) -> Self
    where
        F: Fn(&M) -> Option<String> + Send + Sync + 'static,
    {
        self.register_extractor(name, Arc::new(extractor));
        self
    }

    pub fn with_filter<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.register_filter(name, Arc::new(filter));
        self
    }

    pub fn with_resolver<F>(mut self, name: impl Into<String>, resolver: F) -> Self
    where
        F: Fn(&M) -> String + Send + Sync + 'static,
    {
        self.register_resolver(name, Arc::new(resolver));
        self
    }

    pub fn register_extractor(&mut self, name: impl Into<String>, extractor: ContextIdExtractor<M>) {
        self.extractors.insert(name.into(), extractor);
    }

    pub fn register_filter(&mut self, name: impl Into<String>, filter: MessageFilter<M>) {
        self.filters.insert(name.into(), filter);
    }

    pub fn register_resolver(&mut self, name: impl Into<String>, resolver: SubTypeResolver<M>) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn extractor(&self, name: &str) -> Option<ContextIdExtractor<M>> {
        self.extractors.get(name).cloned()
    }

    pub fn filter(&self, name: &str) -> Option<MessageFilter<M>> {
        self.filters.get(name).cloned()
    }

    pub fn resolver(&self, name: &str) -> Option<SubTypeResolver<M>> {
        self.resolvers.get(name).cloned()
    }
}

impl<M> Default for CapabilityRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
