//! Run config - bound values for a job
//!
//! Shape (YAML):
//!
//! ```yaml
//! ops:
//!   get_string:
//!     config: { data_key: "1" }
//! resources:
//!   connection:
//!     config: { credentials: HORRIBLE_PASSWORD }
//! inputs:
//!   seed: "a#b c"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::resource::ResourceKey;

/// Config block for one operator or resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SectionConfig {
    #[serde(default)]
    pub config: Value,
}

/// Nested config with `ops`, `resources` and `inputs` sections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub ops: BTreeMap<String, SectionConfig>,
    #[serde(default)]
    pub resources: BTreeMap<String, SectionConfig>,
    #[serde(default)]
    pub inputs: BTreeMap<String, Value>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    pub fn with_op(mut self, operator: impl Into<String>, config: Value) -> Self {
        self.ops.insert(operator.into(), SectionConfig { config });
        self
    }

    pub fn with_resource(mut self, key: ResourceKey, config: Value) -> Self {
        self.resources
            .insert(key.as_str().to_string(), SectionConfig { config });
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Raw config for an operator (`Null` when unbound)
    pub fn op_config(&self, operator: &str) -> &Value {
        self.ops.get(operator).map_or(&Value::Null, |s| &s.config)
    }

    /// Raw config for a resource (`Null` when unbound)
    pub fn resource_config(&self, key: ResourceKey) -> &Value {
        self.resources
            .get(key.as_str())
            .map_or(&Value::Null, |s| &s.config)
    }
}
