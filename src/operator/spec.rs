//! OperatorSpec - static declaration of an operator
//!
//! Names, typed ports, required resources and config schema. Built once
//! at job-definition time and never mutated afterwards.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{ConfigSchema, ConfigType};
use crate::error::{OpgraphError, Result};
use crate::resource::ResourceKey;

/// Type carried by a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Str,
    Int,
    Float,
    Bool,
    /// Any JSON value
    Json,
}

impl PortType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Str => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Json => true,
        }
    }

    /// Can a producer of `self` feed a consumer expecting `consumer`?
    pub fn feeds(self, consumer: PortType) -> bool {
        self == consumer || consumer == Self::Json || (self == Self::Int && consumer == Self::Float)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Json => "json",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub name: Arc<str>,
    pub ty: PortType,
}

#[derive(Debug, Clone)]
pub struct OperatorSpec {
    name: Arc<str>,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    resources: Vec<ResourceKey>,
    config_schema: ConfigSchema,
}

impl OperatorSpec {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: Vec::new(),
            config_schema: ConfigSchema::new(),
        }
    }

    pub fn input(mut self, name: impl AsRef<str>, ty: PortType) -> Self {
        self.inputs.push(Port {
            name: Arc::from(name.as_ref()),
            ty,
        });
        self
    }

    pub fn output(mut self, name: impl AsRef<str>, ty: PortType) -> Self {
        self.outputs.push(Port {
            name: Arc::from(name.as_ref()),
            ty,
        });
        self
    }

    pub fn resource(mut self, key: ResourceKey) -> Self {
        if !self.resources.contains(&key) {
            self.resources.push(key);
        }
        self
    }

    pub fn config_field(mut self, name: impl Into<String>, ty: ConfigType) -> Self {
        self.config_schema = self.config_schema.field(name, ty);
        self
    }

    pub fn config_default(mut self, name: impl Into<String>, ty: ConfigType, default: Value) -> Self {
        self.config_schema = self.config_schema.field_with_default(name, ty, default);
        self
    }

    pub fn config_alias(mut self, alias: impl Into<String>, field: impl Into<String>) -> Self {
        self.config_schema = self.config_schema.alias(alias, field);
        self
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    pub fn resources(&self) -> &[ResourceKey] {
        &self.resources
    }

    pub fn config_schema(&self) -> &ConfigSchema {
        &self.config_schema
    }

    pub fn output_port(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| &*p.name == name)
    }

    /// Names and port names must be usable as file name segments
    pub fn validate_names(&self) -> Result<()> {
        validate_name(&self.name)?;
        for port in self.inputs.iter().chain(&self.outputs) {
            validate_name(&port.name)?;
        }
        Ok(())
    }
}

/// Operator and port names: non-empty `[A-Za-z0-9_-]`
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(OpgraphError::InvalidName {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(OpgraphError::InvalidName {
            name: name.to_string(),
            reason: format!("character '{}' is not allowed", bad),
        });
    }
    Ok(())
}
