//! Config schemas - declared field types and build-time validation
//!
//! Every operator and resource declares a `ConfigSchema`. Bound values are
//! checked against it when the job is built, never at invocation time.

use serde_json::{Map, Value};

use crate::error::{OpgraphError, Result};

/// Type of a single config field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    String,
    Int,
    Float,
    Bool,
    Map,
    Any,
}

impl ConfigType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Int => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Bool => value.is_boolean(),
            Self::Map => value.is_object(),
            Self::Any => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Map => "map",
            Self::Any => "any",
        }
    }
}

/// Name of a JSON value's type, for error messages
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub ty: ConfigType,
    /// Optional fields carry a default; required fields have `None`
    pub default: Option<Value>,
}

/// Ordered field → type mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSchema {
    fields: Vec<(String, FieldSpec)>,
    /// (alias, field) pairs; an alias is accepted in place of its field
    aliases: Vec<(String, String)>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field
    pub fn field(mut self, name: impl Into<String>, ty: ConfigType) -> Self {
        self.fields.push((name.into(), FieldSpec { ty, default: None }));
        self
    }

    /// Declare an optional field with a default value
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        ty: ConfigType,
        default: Value,
    ) -> Self {
        self.fields.push((
            name.into(),
            FieldSpec {
                ty,
                default: Some(default),
            },
        ));
        self
    }

    /// Accept `alias` as another name for `field`
    pub fn alias(mut self, alias: impl Into<String>, field: impl Into<String>) -> Self {
        self.aliases.push((alias.into(), field.into()));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate bound values and fill defaults.
    ///
    /// `owner` names the operator or resource in error messages.
    /// `raw` may be `Null` (nothing bound) or an object.
    pub fn validate(&self, owner: &str, raw: &Value) -> Result<ConfigValues> {
        let mut bound = match raw {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            other => {
                return Err(OpgraphError::ConfigTypeMismatch {
                    owner: owner.to_string(),
                    field: "config".to_string(),
                    expected: ConfigType::Map.name().to_string(),
                    actual: value_type_name(other).to_string(),
                })
            }
        };

        for (alias, field) in &self.aliases {
            if let Some(value) = bound.remove(alias) {
                if bound.contains_key(field) {
                    return Err(OpgraphError::ConflictingConfigAlias {
                        owner: owner.to_string(),
                        field: field.clone(),
                        alias: alias.clone(),
                    });
                }
                bound.insert(field.clone(), value);
            }
        }

        if let Some(unknown) = bound
            .keys()
            .find(|key| !self.fields.iter().any(|(name, _)| name == *key))
        {
            return Err(OpgraphError::UnknownConfigField {
                owner: owner.to_string(),
                field: unknown.clone(),
            });
        }

        let mut values = Map::with_capacity(self.fields.len());
        for (name, spec) in &self.fields {
            let value = match (bound.get(name), &spec.default) {
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.clone(),
                (None, None) => {
                    return Err(OpgraphError::MissingConfigField {
                        owner: owner.to_string(),
                        field: name.clone(),
                    })
                }
            };

            if !spec.ty.matches(&value) {
                return Err(OpgraphError::ConfigTypeMismatch {
                    owner: owner.to_string(),
                    field: name.clone(),
                    expected: spec.ty.name().to_string(),
                    actual: value_type_name(&value).to_string(),
                });
            }
            values.insert(name.clone(), value);
        }

        Ok(ConfigValues(values))
    }
}

/// Config values that passed schema validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigValues(Map<String, Value>);

impl ConfigValues {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(Value::as_bool)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.0.get(field).and_then(Value::as_i64)
    }

    pub fn float(&self, field: &str) -> Option<f64> {
        self.0.get(field).and_then(Value::as_f64)
    }

    pub fn map(&self, field: &str) -> Option<&Map<String, Value>> {
        self.0.get(field).and_then(Value::as_object)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
