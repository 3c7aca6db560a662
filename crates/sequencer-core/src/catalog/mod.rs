//! # Sequence Catalog
//!
//! Validated index `qualified name → (definition, message type spec)` built
//! once at startup from a [`SequencingDocument`] and a
//! [`CapabilityRegistry`]. Any inconsistency in the document is a fatal
//! [`ConfigurationError`]; the process must not start with a half-valid
//! catalog.

pub mod capabilities;
pub mod document;

pub use capabilities::CapabilityRegistry;
pub use document::{
    ConditionDocument, MessageTypeDocument, SequenceDocument, SequencingDocument,
    SubtypeResolverDocument, DEFAULT_CLUSTER,
};

use crate::domain::definitions::{
    MessageTypeSpec, SequenceDefinition, SequencedPayload, SubTypeResolver,
};
use crate::domain::errors::{ConfigurationError, SequencingError};
use crate::domain::invariants::{check_acyclic, check_condition_shape, check_predecessors_known};
use crate::domain::value_objects::QualifiedName;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A message type together with the definition that owns it.
pub struct CatalogEntry<M> {
    pub definition: Arc<SequenceDefinition<M>>,
    pub spec: Arc<MessageTypeSpec<M>>,
}

impl<M> Clone for CatalogEntry<M> {
    fn clone(&self) -> Self {
        Self {
            definition: Arc::clone(&self.definition),
            spec: Arc::clone(&self.spec),
        }
    }
}

struct SubtypeBinding<M> {
    resolver: SubTypeResolver<M>,
    subtypes: HashSet<String>,
}

/// Validated, queryable sequencing configuration.
pub struct SequenceCatalog<M> {
    definitions: Vec<Arc<SequenceDefinition<M>>>,
    entries: HashMap<QualifiedName, CatalogEntry<M>>,
    resolvers: HashMap<String, SubTypeResolver<M>>,
}

impl<M: SequencedPayload> SequenceCatalog<M> {
    /// Parse a JSON document and load it.
    pub fn from_json_str(
        json: &str,
        capabilities: &CapabilityRegistry<M>,
    ) -> Result<Self, ConfigurationError> {
        Self::load(&SequencingDocument::from_json_str(json)?, capabilities)
    }

    /// Read a JSON document from disk and load it.
    pub fn from_path(
        path: &Path,
        capabilities: &CapabilityRegistry<M>,
    ) -> Result<Self, ConfigurationError> {
        Self::load(&SequencingDocument::from_path(path)?, capabilities)
    }

    /// Validate the document and build the index.
    pub fn load(
        document: &SequencingDocument,
        capabilities: &CapabilityRegistry<M>,
    ) -> Result<Self, ConfigurationError> {
        let bindings = Self::load_subtype_bindings(document, capabilities)?;

        let mut definitions = Vec::with_capacity(document.sequences.len());
        let mut entries: HashMap<QualifiedName, CatalogEntry<M>> = HashMap::new();
        let mut sequence_names = HashSet::new();
        let mut topic_bindings: HashMap<String, (String, String)> = HashMap::new();
        let mut configured_subtypes: HashMap<String, HashSet<String>> = HashMap::new();

        for sequence in &document.sequences {
            if !sequence_names.insert(sequence.name.as_str()) {
                return Err(ConfigurationError::DuplicateSequence(sequence.name.clone()));
            }

            let retention_period = match sequence.retention_period {
                Some(period) if !period.is_zero() && retention_fits(period) => period,
                _ => {
                    return Err(ConfigurationError::InvalidRetention {
                        sequence: sequence.name.clone(),
                    })
                }
            };

            if sequence.message_types.is_empty() {
                return Err(ConfigurationError::EmptySequence(sequence.name.clone()));
            }

            let mut specs = Vec::with_capacity(sequence.message_types.len());
            for entry in &sequence.message_types {
                let qualified_name = QualifiedName::new(entry.qualified_name.as_str());
                if qualified_name.as_str().is_empty() {
                    return Err(ConfigurationError::Malformed(format!(
                        "sequence '{}' has a message type with an empty name",
                        sequence.name
                    )));
                }
                if entries.contains_key(&qualified_name)
                    || specs
                        .iter()
                        .any(|s: &Arc<MessageTypeSpec<M>>| s.qualified_name == qualified_name)
                {
                    return Err(ConfigurationError::DuplicateMessageType(qualified_name));
                }

                Self::check_subtype(&qualified_name, &bindings, &mut configured_subtypes)?;

                let base_type = qualified_name.base_type().to_string();
                let topic = entry.topic.clone().unwrap_or_else(|| base_type.clone());
                let cluster = entry
                    .cluster
                    .clone()
                    .unwrap_or_else(|| document.default_cluster.clone());
                match topic_bindings.get(&base_type) {
                    Some((bound_topic, bound_cluster))
                        if bound_topic != &topic || bound_cluster != &cluster =>
                    {
                        return Err(ConfigurationError::ConflictingTopic {
                            base_type,
                            first: format!("{bound_cluster}/{bound_topic}"),
                            second: format!("{cluster}/{topic}"),
                        });
                    }
                    Some(_) => {}
                    None => {
                        topic_bindings.insert(base_type, (topic.clone(), cluster.clone()));
                    }
                }

                let extractor_name = entry
                    .context_id_extractor
                    .as_deref()
                    .ok_or_else(|| ConfigurationError::MissingExtractor(qualified_name.clone()))?;
                let context_id_extractor = capabilities.extractor(extractor_name).ok_or_else(|| {
                    ConfigurationError::UnknownExtractor {
                        qualified_name: qualified_name.clone(),
                        name: extractor_name.to_string(),
                    }
                })?;

                let message_filter = match entry.message_filter.as_deref() {
                    Some(name) => Some(capabilities.filter(name).ok_or_else(|| {
                        ConfigurationError::UnknownFilter {
                            qualified_name: qualified_name.clone(),
                            name: name.to_string(),
                        }
                    })?),
                    None => None,
                };

                let release_condition = match &entry.release_condition {
                    Some(node) => {
                        let condition = node.to_condition(&qualified_name)?;
                        check_condition_shape(&qualified_name, &condition)?;
                        Some(condition)
                    }
                    None => None,
                };

                specs.push(Arc::new(MessageTypeSpec {
                    qualified_name,
                    topic,
                    cluster,
                    context_id_extractor,
                    message_filter,
                    release_condition,
                }));
            }

            Self::check_dependencies(&specs)?;

            let definition = Arc::new(SequenceDefinition {
                name: sequence.name.clone(),
                retention_period,
                message_types: specs,
            });
            for spec in &definition.message_types {
                entries.insert(
                    spec.qualified_name.clone(),
                    CatalogEntry {
                        definition: Arc::clone(&definition),
                        spec: Arc::clone(spec),
                    },
                );
            }
            definitions.push(definition);
        }

        for (base_type, binding) in &bindings {
            let Some(configured) = configured_subtypes.get(base_type) else {
                warn!(base_type = %base_type, "Subtype resolver declared for a base type no sequence uses");
                continue;
            };
            let mut missing: Vec<&String> = binding.subtypes.difference(configured).collect();
            missing.sort();
            if let Some(subtype) = missing.first() {
                return Err(ConfigurationError::MissingSubtype {
                    base_type: base_type.clone(),
                    subtype: (*subtype).clone(),
                });
            }
        }

        info!(
            sequences = definitions.len(),
            message_types = entries.len(),
            "Sequence catalog loaded"
        );

        Ok(Self {
            definitions,
            entries,
            resolvers: bindings
                .into_iter()
                .map(|(base, binding)| (base, binding.resolver))
                .collect(),
        })
    }

    fn load_subtype_bindings(
        document: &SequencingDocument,
        capabilities: &CapabilityRegistry<M>,
    ) -> Result<HashMap<String, SubtypeBinding<M>>, ConfigurationError> {
        let mut bindings = HashMap::new();
        for (base_type, entry) in &document.subtype_resolvers {
            let resolver = capabilities.resolver(&entry.resolver).ok_or_else(|| {
                ConfigurationError::UnknownResolver {
                    base_type: base_type.clone(),
                    name: entry.resolver.clone(),
                }
            })?;
            if entry.subtypes.is_empty() {
                return Err(ConfigurationError::Malformed(format!(
                    "subtype resolver for '{base_type}' enumerates no subtypes"
                )));
            }
            bindings.insert(
                base_type.clone(),
                SubtypeBinding {
                    resolver,
                    subtypes: entry.subtypes.iter().cloned().collect(),
                },
            );
        }
        Ok(bindings)
    }

    fn check_subtype(
        qualified_name: &QualifiedName,
        bindings: &HashMap<String, SubtypeBinding<M>>,
        configured: &mut HashMap<String, HashSet<String>>,
    ) -> Result<(), ConfigurationError> {
        let base_type = qualified_name.base_type();
        match (qualified_name.subtype(), bindings.get(base_type)) {
            (Some(_), None) => Err(ConfigurationError::MissingResolver(qualified_name.clone())),
            (None, Some(_)) => Err(ConfigurationError::MissingSubtypeQualifier(
                qualified_name.clone(),
            )),
            (Some(subtype), Some(binding)) => {
                if !binding.subtypes.contains(subtype) {
                    return Err(ConfigurationError::UnexpectedSubtype {
                        qualified_name: qualified_name.clone(),
                        base_type: base_type.to_string(),
                    });
                }
                configured
                    .entry(base_type.to_string())
                    .or_default()
                    .insert(subtype.to_string());
                Ok(())
            }
            (None, None) => Ok(()),
        }
    }

    fn check_dependencies(specs: &[Arc<MessageTypeSpec<M>>]) -> Result<(), ConfigurationError> {
        let known: HashSet<QualifiedName> =
            specs.iter().map(|s| s.qualified_name.clone()).collect();
        let mut dependencies = HashMap::with_capacity(specs.len());

        for spec in specs {
            let predecessors = match &spec.release_condition {
                Some(condition) => {
                    check_predecessors_known(&spec.qualified_name, condition, &known)?;
                    condition.predecessors().into_iter().cloned().collect()
                }
                None => Vec::new(),
            };
            dependencies.insert(spec.qualified_name.clone(), predecessors);
        }

        check_acyclic(&dependencies)
    }

    /// `type` or `type.subtype` for the given message.
    pub fn resolve_qualified_name(&self, message: &M) -> QualifiedName {
        let base_type = message.message_type();
        match self.resolvers.get(base_type) {
            Some(resolver) => QualifiedName::with_subtype(base_type, &resolver(message)),
            None => QualifiedName::new(base_type),
        }
    }

    pub fn lookup(&self, qualified_name: &QualifiedName) -> Option<&CatalogEntry<M>> {
        self.entries.get(qualified_name)
    }

    /// Fails fast when a message type was never declared.
    pub fn require_spec(
        &self,
        qualified_name: &QualifiedName,
    ) -> Result<&CatalogEntry<M>, SequencingError> {
        self.entries
            .get(qualified_name)
            .ok_or_else(|| SequencingError::UnconfiguredType(qualified_name.clone()))
    }

    pub fn definition(&self, sequence_name: &str) -> Option<&Arc<SequenceDefinition<M>>> {
        self.definitions.iter().find(|d| d.name == sequence_name)
    }

    pub fn definitions(&self) -> &[Arc<SequenceDefinition<M>>] {
        &self.definitions
    }

    /// Number of configured qualified message types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Retention must be addable to the current time without leaving the
/// timestamp range.
fn retention_fits(period: Duration) -> bool {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|retention| chrono::Utc::now().checked_add_signed(retention))
        .is_some()
}
