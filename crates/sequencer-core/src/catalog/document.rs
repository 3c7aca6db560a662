//! Serde model of the sequencing configuration document.
//!
//! ```json
//! {
//!   "default_cluster": "primary",
//!   "sequences": [{
//!     "name": "order-flow",
//!     "retention_period": "60m",
//!     "message_types": [
//!       { "type": "OrderPlaced", "context_id_extractor": "order-id" },
//!       { "type": "OrderShipped", "context_id_extractor": "order-id",
//!         "release_condition": { "predecessor": "OrderPlaced" } }
//!     ]
//!   }],
//!   "subtype_resolvers": { "Payment": { "resolver": "payment-kind", "subtypes": ["CARD", "WIRE"] } }
//! }
//! ```

use crate::domain::errors::ConfigurationError;
use crate::domain::release::ReleaseCondition;
use crate::domain::value_objects::QualifiedName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Cluster assumed when neither the entry nor the document names one.
pub const DEFAULT_CLUSTER: &str = "default";

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}

/// Top-level configuration document.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequencingDocument {
    #[serde(default = "default_cluster")]
    pub default_cluster: String,
    #[serde(default)]
    pub sequences: Vec<SequenceDocument>,
    /// Subtype resolvers keyed by base type name.
    #[serde(default)]
    pub subtype_resolvers: BTreeMap<String, SubtypeResolverDocument>,
}

impl Default for SequencingDocument {
    fn default() -> Self {
        Self {
            default_cluster: default_cluster(),
            sequences: Vec::new(),
            subtype_resolvers: BTreeMap::new(),
        }
    }
}

impl SequencingDocument {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json).map_err(|e| ConfigurationError::Malformed(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json_str(&json)
    }
}

/// One named sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SequenceDocument {
    pub name: String,
    /// Mandatory; a missing or zero value is rejected at load time.
    #[serde(default, with = "crate::duration_serde::option")]
    pub retention_period: Option<Duration>,
    #[serde(default)]
    pub message_types: Vec<MessageTypeDocument>,
}

/// One message type entry of a sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageTypeDocument {
    /// Qualified name: `type` or `type.subtype`.
    #[serde(rename = "type")]
    pub qualified_name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub cluster: Option<String>,
    #[serde(default)]
    pub context_id_extractor: Option<String>,
    #[serde(default)]
    pub message_filter: Option<String>,
    #[serde(default)]
    pub release_condition: Option<ConditionDocument>,
}

/// Release condition node; exactly one field must be set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDocument {
    #[serde(default)]
    pub predecessor: Option<String>,
    #[serde(default)]
    pub and: Option<Vec<ConditionDocument>>,
    #[serde(default)]
    pub or: Option<Vec<ConditionDocument>>,
}

impl ConditionDocument {
    /// Convert into the domain tree, rejecting nodes with zero or several fields.
    pub fn to_condition(&self, owner: &QualifiedName) -> Result<ReleaseCondition, ConfigurationError> {
        match (&self.predecessor, &self.and, &self.or) {
            (Some(name), None, None) => Ok(ReleaseCondition::predecessor(name.as_str())),
            (None, Some(children), None) => Ok(ReleaseCondition::And(
                Self::convert_children(children, owner)?,
            )),
            (None, None, Some(children)) => Ok(ReleaseCondition::Or(
                Self::convert_children(children, owner)?,
            )),
            _ => Err(ConfigurationError::MalformedCondition {
                qualified_name: owner.clone(),
                reason: "exactly one of predecessor, and, or must be set".to_string(),
            }),
        }
    }

    fn convert_children(
        children: &[ConditionDocument],
        owner: &QualifiedName,
    ) -> Result<Vec<ReleaseCondition>, ConfigurationError> {
        children.iter().map(|c| c.to_condition(owner)).collect()
    }
}

/// Subtype resolver binding for one base type.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtypeResolverDocument {
    /// Capability name of the resolver.
    pub resolver: String,
    /// The enumerated subtype space.
    pub subtypes: Vec<String>,
}
