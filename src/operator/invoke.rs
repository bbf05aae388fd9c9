//! Operator trait and invocation types
//!
//! Invocation is a pure function of (config, resources, inputs) returning
//! a tagged result; business failures are `Err(OperatorError)`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigValues;
use crate::resource::ResourceView;

use super::spec::OperatorSpec;

/// Business-logic failure inside an operator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Operator '{operator}' failed: {cause}")]
pub struct OperatorError {
    pub operator: String,
    pub cause: String,
}

impl OperatorError {
    pub fn new(operator: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            cause: cause.into(),
        }
    }
}

/// What an operator sees while running
pub struct OpContext<'a> {
    run_id: &'a str,
    operator: &'a str,
    config: &'a ConfigValues,
    resources: ResourceView<'a>,
}

impl<'a> OpContext<'a> {
    pub fn new(
        run_id: &'a str,
        operator: &'a str,
        config: &'a ConfigValues,
        resources: ResourceView<'a>,
    ) -> Self {
        Self {
            run_id,
            operator,
            config,
            resources,
        }
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn operator(&self) -> &str {
        self.operator
    }

    pub fn config(&self) -> &ConfigValues {
        self.config
    }

    pub fn resources(&self) -> &ResourceView<'a> {
        &self.resources
    }

    /// Shorthand for an error attributed to this operator
    pub fn fail(&self, cause: impl Into<String>) -> OperatorError {
        OperatorError::new(self.operator, cause)
    }

    pub fn config_str(&self, field: &str) -> Result<&str, OperatorError> {
        self.config
            .str(field)
            .ok_or_else(|| self.fail(format!("config field '{}' is not a string", field)))
    }

    pub fn config_bool(&self, field: &str) -> Result<bool, OperatorError> {
        self.config
            .bool(field)
            .ok_or_else(|| self.fail(format!("config field '{}' is not a bool", field)))
    }
}

/// Input values keyed by port name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    operator: Arc<str>,
    values: BTreeMap<Arc<str>, Value>,
}

impl Inputs {
    pub fn new(operator: &Arc<str>) -> Self {
        Self {
            operator: Arc::clone(operator),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, port: Arc<str>, value: Value) {
        self.values.insert(port, value);
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    pub fn require(&self, port: &str) -> Result<&Value, OperatorError> {
        self.values
            .get(port)
            .ok_or_else(|| OperatorError::new(&*self.operator, format!("input '{}' missing", port)))
    }

    pub fn str(&self, port: &str) -> Result<&str, OperatorError> {
        self.require(port)?.as_str().ok_or_else(|| {
            OperatorError::new(&*self.operator, format!("input '{}' is not a string", port))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }
}

/// Output values keyed by port name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(port: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(port, value)
    }

    pub fn with(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(port.into(), value.into());
        self
    }

    pub fn get(&self, port: &str) -> Option<&Value> {
        self.values.get(port)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A typed unit of computation
pub trait Operator: Send + Sync {
    fn spec(&self) -> &OperatorSpec;

    fn invoke(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> Result<Outputs, OperatorError>;
}

type InvokeFn = dyn Fn(&OpContext<'_>, &Inputs) -> Result<Outputs, OperatorError> + Send + Sync;

/// Operator from a spec and a closure
pub struct FnOperator {
    spec: OperatorSpec,
    func: Box<InvokeFn>,
}

impl FnOperator {
    pub fn new<F>(spec: OperatorSpec, func: F) -> Self
    where
        F: Fn(&OpContext<'_>, &Inputs) -> Result<Outputs, OperatorError> + Send + Sync + 'static,
    {
        Self {
            spec,
            func: Box::new(func),
        }
    }
}

impl Operator for FnOperator {
    fn spec(&self) -> &OperatorSpec {
        &self.spec
    }

    fn invoke(&self, ctx: &OpContext<'_>, inputs: &Inputs) -> Result<Outputs, OperatorError> {
        (self.func)(ctx, inputs)
    }
}

impl fmt::Debug for FnOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperator")
            .field("name", self.spec.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NoopEmitter;
    use crate::operator::PortType;
    use crate::resource::Resources;
    use serde_json::json;

    #[test]
    fn fn_operator_invokes_closure() {
        let op = FnOperator::new(
            OperatorSpec::new("double")
                .input("n", PortType::Int)
                .output("twice", PortType::Int),
            |ctx, inputs| {
                let n = inputs
                    .require("n")?
                    .as_i64()
                    .ok_or_else(|| ctx.fail("n is not an int"))?;
                Ok(Outputs::single("twice", n * 2))
            },
        );

        let run_id: Arc<str> = Arc::from("r1");
        let resources = Resources::instantiate(&run_id, &[], &NoopEmitter).unwrap();
        let config = ConfigValues::default();
        let ctx = OpContext::new("r1", "double", &config, resources.view("double", &[]));

        let mut inputs = Inputs::new(op.spec().name());
        inputs.insert(Arc::from("n"), json!(21));

        let outputs = op.invoke(&ctx, &inputs).unwrap();
        assert_eq!(outputs.get("twice"), Some(&json!(42)));
    }

    #[test]
    fn missing_input_names_operator() {
        let inputs = Inputs::new(&Arc::from("strip"));
        let err = inputs.str("upper").unwrap_err();
        assert_eq!(err.operator, "strip");
        assert!(err.to_string().contains("input 'upper' missing"));
    }

    #[test]
    fn outputs_builder() {
        let outputs = Outputs::single("a", "x").with("b", 2);
        assert_eq!(outputs.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(outputs.len(), 2);
    }
}
