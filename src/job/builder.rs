//! JobBuilder - static validation and config binding
//!
//! `build()` is the only way to obtain a `Job`. Every structural defect
//! and every unbound or mistyped config field is reported here, before a
//! run can start.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{value_type_name, ConfigValues, RunConfig};
use crate::error::{OpgraphError, Result};
use crate::operator::{Operator, OperatorSpec, Port, PortType};
use crate::resource::ResourceKey;

use super::graph::{InputBinding, OperatorGraph};

/// One operator in execution order with its bound config
pub struct Step {
    operator: Arc<dyn Operator>,
    config: ConfigValues,
}

impl Step {
    pub fn name(&self) -> &Arc<str> {
        self.operator.spec().name()
    }

    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    pub fn spec(&self) -> &OperatorSpec {
        self.operator.spec()
    }

    pub fn config(&self) -> &ConfigValues {
        &self.config
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", self.name())
            .field("config", &self.config)
            .finish()
    }
}

/// A validated operator graph with bound configuration, ready to run
pub struct Job {
    name: Arc<str>,
    steps: Vec<Step>,
    graph: OperatorGraph,
    resources: Vec<(ResourceKey, ConfigValues)>,
    inputs: BTreeMap<Arc<str>, Value>,
}

impl Job {
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Steps in topological order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name().as_ref()).collect()
    }

    pub fn step(&self, operator: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name().as_ref() == operator)
    }

    pub fn graph(&self) -> &OperatorGraph {
        &self.graph
    }

    pub fn bindings(&self, operator: &str) -> &[InputBinding] {
        self.graph.bindings(operator)
    }

    /// Declared resources with validated config
    pub fn resources(&self) -> &[(ResourceKey, ConfigValues)] {
        &self.resources
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("order", &self.order())
            .field(
                "resources",
                &self.resources.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

pub struct JobBuilder {
    name: String,
    operators: Vec<Arc<dyn Operator>>,
    resources: Vec<ResourceKey>,
    inputs: Vec<Port>,
    config: RunConfig,
}

impl JobBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operators: Vec::new(),
            resources: Vec::new(),
            inputs: Vec::new(),
            config: RunConfig::default(),
        }
    }

    pub fn operator(self, operator: impl Operator + 'static) -> Self {
        self.shared_operator(Arc::new(operator))
    }

    pub fn shared_operator(mut self, operator: Arc<dyn Operator>) -> Self {
        self.operators.push(operator);
        self
    }

    pub fn resource(mut self, key: ResourceKey) -> Self {
        if !self.resources.contains(&key) {
            self.resources.push(key);
        }
        self
    }

    /// Declare a job input, bound from `inputs:` in the run config
    pub fn input(mut self, name: impl AsRef<str>, ty: PortType) -> Self {
        self.inputs.push(Port {
            name: Arc::from(name.as_ref()),
            ty,
        });
        self
    }

    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    #[instrument(name = "build_job", skip(self), fields(job = %self.name))]
    pub fn build(self) -> Result<Arc<Job>> {
        if self.operators.is_empty() {
            return Err(OpgraphError::EmptyJob { job: self.name });
        }

        let specs: Vec<&OperatorSpec> = self.operators.iter().map(|op| op.spec()).collect();
        for spec in &specs {
            spec.validate_names()?;
        }
        for port in &self.inputs {
            crate::operator::validate_name(&port.name)?;
        }

        let graph = OperatorGraph::wire(&specs, &self.inputs)?;

        for spec in &specs {
            if let Some(missing) = spec
                .resources()
                .iter()
                .find(|key| !self.resources.contains(key))
            {
                return Err(OpgraphError::UndeclaredResource {
                    operator: spec.name().to_string(),
                    resource: missing.to_string(),
                });
            }
        }

        graph.detect_cycles()?;

        let op_configs = self.bind_operator_config(&specs)?;
        let resources = self.bind_resource_config()?;
        let inputs = self.bind_inputs()?;

        let order = graph.topological_order()?;
        let mut by_name: BTreeMap<Arc<str>, (Arc<dyn Operator>, ConfigValues)> = self
            .operators
            .iter()
            .cloned()
            .zip(op_configs)
            .map(|(op, cfg)| (Arc::clone(op.spec().name()), (op, cfg)))
            .collect();
        let steps = order
            .iter()
            .filter_map(|name| by_name.remove(name))
            .map(|(operator, config)| Step { operator, config })
            .collect();

        let job = Job {
            name: Arc::from(self.name.as_str()),
            steps,
            graph,
            resources,
            inputs,
        };
        debug!(order = ?job.order(), "Job built");
        Ok(Arc::new(job))
    }

    fn bind_operator_config(&self, specs: &[&OperatorSpec]) -> Result<Vec<ConfigValues>> {
        if let Some(unknown) = self
            .config
            .ops
            .keys()
            .find(|name| !specs.iter().any(|s| s.name().as_ref() == name.as_str()))
        {
            return Err(OpgraphError::UnknownOperatorConfig {
                operator: unknown.clone(),
            });
        }

        specs
            .iter()
            .map(|spec| {
                let owner = format!("operator '{}'", spec.name());
                spec.config_schema()
                    .validate(&owner, self.config.op_config(spec.name()))
            })
            .collect()
    }

    fn bind_resource_config(&self) -> Result<Vec<(ResourceKey, ConfigValues)>> {
        for section in self.config.resources.keys() {
            let declared = section
                .parse::<ResourceKey>()
                .is_ok_and(|key| self.resources.contains(&key));
            if !declared {
                return Err(OpgraphError::UnknownConfigSection {
                    resource: section.clone(),
                });
            }
        }

        self.resources
            .iter()
            .map(|&key| {
                let owner = format!("resource '{}'", key);
                let values = key
                    .config_schema()
                    .validate(&owner, self.config.resource_config(key))?;
                Ok((key, values))
            })
            .collect()
    }

    fn bind_inputs(&self) -> Result<BTreeMap<Arc<str>, Value>> {
        const OWNER: &str = "job inputs";

        if let Some(unknown) = self
            .config
            .inputs
            .keys()
            .find(|name| !self.inputs.iter().any(|p| p.name.as_ref() == name.as_str()))
        {
            return Err(OpgraphError::UnknownConfigField {
                owner: OWNER.to_string(),
                field: unknown.clone(),
            });
        }

        let mut bound = BTreeMap::new();
        for port in &self.inputs {
            let value = self.config.inputs.get(port.name.as_ref()).ok_or_else(|| {
                OpgraphError::MissingConfigField {
                    owner: OWNER.to_string(),
                    field: port.name.to_string(),
                }
            })?;
            if !port.ty.matches(value) {
                return Err(OpgraphError::ConfigTypeMismatch {
                    owner: OWNER.to_string(),
                    field: port.name.to_string(),
                    expected: port.ty.to_string(),
                    actual: value_type_name(value).to_string(),
                });
            }
            bound.insert(Arc::clone(&port.name), value.clone());
        }
        Ok(bound)
    }
}
