use crate::domain::definitions::SequencedPayload;
use crate::domain::value_objects::QualifiedName;
use crate::ports::outbound::{HandlerRegistry, MessageHandler};
use std::collections::HashMap;
use std::sync::Arc;

/// Handler registry keyed by qualified name or base type.
///
/// A `type.subtype` lookup falls back to the handler registered for `type`.
pub struct HandlerTable<M: SequencedPayload> {
    handlers: HashMap<String, Arc<dyn MessageHandler<M>>>,
}

impl<M: SequencedPayload> HandlerTable<M> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn MessageHandler<M>>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn with_handler(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn MessageHandler<M>>,
    ) -> Self {
        self.register(name, handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<M: SequencedPayload> Default for HandlerTable<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: SequencedPayload> HandlerRegistry<M> for HandlerTable<M> {
    fn handler_for(&self, qualified_name: &QualifiedName) -> Option<Arc<dyn MessageHandler<M>>> {
        self.handlers
            .get(qualified_name.as_str())
            .or_else(|| self.handlers.get(qualified_name.base_type()))
            .cloned()
    }
}
