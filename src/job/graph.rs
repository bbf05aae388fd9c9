//! OperatorGraph - DAG derived from typed port matching
//!
//! An edge `a → b` exists when an output port of `a` has the same name as
//! an input port of `b`. Declared job inputs satisfy inputs without an
//! edge.
//!
//! - Arc<str> ids shared with the operator specs
//! - FxHashMap for adjacency lookups
//! - SmallVec for the usual 0-4 neighbours
//!
//! Cycle detection uses DFS three-colour marking; the execution order is
//! Kahn's algorithm with ties broken by declaration order.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::{OpgraphError, Result};
use crate::operator::{OperatorSpec, Port};

/// Stack-allocated neighbour list
pub type DepVec = SmallVec<[Arc<str>; 4]>;

/// Where an operator input comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Output of the same name on an upstream operator
    Upstream(Arc<str>),
    /// Value bound under `inputs:` in the run config
    JobInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputBinding {
    pub port: Port,
    pub source: InputSource,
}

pub struct OperatorGraph {
    /// operator -> consumers of its outputs
    adjacency: FxHashMap<Arc<str>, DepVec>,
    /// operator -> producers of its inputs
    predecessors: FxHashMap<Arc<str>, DepVec>,
    /// operator -> resolved input bindings, in port order
    bindings: FxHashMap<Arc<str>, Vec<InputBinding>>,
    /// Declaration order
    operator_ids: Vec<Arc<str>>,
}

impl std::fmt::Debug for OperatorGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorGraph")
            .field("operators", &self.operator_ids)
            .field("edges", &self.adjacency.values().map(|d| d.len()).sum::<usize>())
            .finish()
    }
}

impl OperatorGraph {
    /// Resolve every input to exactly one producer and type-check the edge.
    ///
    /// Checks run in a fixed order so the first reported error is stable:
    /// duplicate operators, duplicate outputs, unbound/ambiguous inputs,
    /// port types.
    pub fn wire(specs: &[&OperatorSpec], job_inputs: &[Port]) -> Result<Self> {
        let capacity = specs.len();
        let mut operator_ids: Vec<Arc<str>> = Vec::with_capacity(capacity);

        for spec in specs {
            if operator_ids.iter().any(|id| id == spec.name()) {
                return Err(OpgraphError::DuplicateOperator {
                    operator: spec.name().to_string(),
                });
            }
            operator_ids.push(Arc::clone(spec.name()));
        }

        // output name -> producing operator
        let mut producers: FxHashMap<&str, (&OperatorSpec, &Port)> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        for &spec in specs {
            for port in spec.outputs() {
                if let Some((first, _)) = producers.insert(&*port.name, (spec, port)) {
                    return Err(OpgraphError::DuplicateOutput {
                        output: port.name.to_string(),
                        first: first.name().to_string(),
                        second: spec.name().to_string(),
                    });
                }
            }
        }

        let mut adjacency: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut predecessors: FxHashMap<Arc<str>, DepVec> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        let mut bindings: FxHashMap<Arc<str>, Vec<InputBinding>> =
            FxHashMap::with_capacity_and_hasher(capacity, Default::default());
        for id in &operator_ids {
            adjacency.insert(Arc::clone(id), DepVec::new());
            predecessors.insert(Arc::clone(id), DepVec::new());
        }

        for spec in specs {
            let mut resolved = Vec::with_capacity(spec.inputs().len());

            for input in spec.inputs() {
                let upstream = producers.get(&*input.name);
                let job_input = job_inputs.iter().find(|p| p.name == input.name);

                let (source, produced_by, produced) = match (upstream, job_input) {
                    (Some((producer, port)), None) => (
                        InputSource::Upstream(Arc::clone(producer.name())),
                        producer.name().to_string(),
                        port.ty,
                    ),
                    (None, Some(port)) => {
                        (InputSource::JobInput, "job input".to_string(), port.ty)
                    }
                    (Some((producer, _)), Some(_)) => {
                        return Err(OpgraphError::AmbiguousInput {
                            operator: spec.name().to_string(),
                            input: input.name.to_string(),
                            candidates: format!("'{}', job input", producer.name()),
                        })
                    }
                    (None, None) => {
                        return Err(OpgraphError::UnboundInput {
                            operator: spec.name().to_string(),
                            input: input.name.to_string(),
                        })
                    }
                };

                if !produced.feeds(input.ty) {
                    return Err(OpgraphError::PortTypeMismatch {
                        port: input.name.to_string(),
                        producer: produced_by,
                        consumer: spec.name().to_string(),
                        produced: produced.to_string(),
                        expected: input.ty.to_string(),
                    });
                }

                if let InputSource::Upstream(producer) = &source {
                    let succ = adjacency.entry(Arc::clone(producer)).or_default();
                    if !succ.contains(spec.name()) {
                        succ.push(Arc::clone(spec.name()));
                        predecessors
                            .entry(Arc::clone(spec.name()))
                            .or_default()
                            .push(Arc::clone(producer));
                    }
                }

                resolved.push(InputBinding {
                    port: input.clone(),
                    source,
                });
            }

            bindings.insert(Arc::clone(spec.name()), resolved);
        }

        Ok(Self {
            adjacency,
            predecessors,
            bindings,
            operator_ids,
        })
    }

    /// Operators whose outputs `operator` consumes
    #[inline]
    pub fn dependencies(&self, operator: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.predecessors
            .get(operator)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    /// Operators consuming outputs of `operator`
    #[inline]
    pub fn successors(&self, operator: &str) -> &[Arc<str>] {
        static EMPTY: &[Arc<str>] = &[];
        self.adjacency
            .get(operator)
            .map_or(EMPTY, SmallVec::as_slice)
    }

    pub fn bindings(&self, operator: &str) -> &[InputBinding] {
        self.bindings.get(operator).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Operators without consumers
    pub fn sinks(&self) -> Vec<Arc<str>> {
        self.operator_ids
            .iter()
            .filter(|id| self.successors(id).is_empty())
            .cloned()
            .collect()
    }

    pub fn operator_ids(&self) -> &[Arc<str>] {
        &self.operator_ids
    }

    /// Detect cycles using DFS with three-colour marking.
    ///
    /// A cycle is found when the walk reaches a node still on the stack
    /// (gray). The error names the path, e.g. `a → b → a`.
    pub fn detect_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut colors: FxHashMap<Arc<str>, Color> = self
            .operator_ids
            .iter()
            .map(|id| (Arc::clone(id), Color::White))
            .collect();
        let mut stack: Vec<Arc<str>> = Vec::new();

        fn dfs(
            node: Arc<str>,
            adjacency: &FxHashMap<Arc<str>, DepVec>,
            colors: &mut FxHashMap<Arc<str>, Color>,
            stack: &mut Vec<Arc<str>>,
        ) -> std::result::Result<(), String> {
            colors.insert(Arc::clone(&node), Color::Gray);
            stack.push(Arc::clone(&node));

            if let Some(neighbors) = adjacency.get(&node) {
                for neighbor in neighbors {
                    match colors.get(neighbor) {
                        Some(Color::Gray) => {
                            let start = stack
                                .iter()
                                .position(|x| x == neighbor)
                                .unwrap_or(0);
                            let cycle: Vec<&str> =
                                stack[start..].iter().map(|s| s.as_ref()).collect();
                            return Err(format!("{} → {}", cycle.join(" → "), neighbor));
                        }
                        Some(Color::White) | None => {
                            dfs(Arc::clone(neighbor), adjacency, colors, stack)?;
                        }
                        Some(Color::Black) => {}
                    }
                }
            }

            stack.pop();
            colors.insert(node, Color::Black);
            Ok(())
        }

        for id in &self.operator_ids {
            if colors.get(id) == Some(&Color::White) {
                dfs(Arc::clone(id), &self.adjacency, &mut colors, &mut stack)
                    .map_err(|cycle| OpgraphError::CycleDetected { cycle })?;
            }
        }

        Ok(())
    }

    /// Kahn's algorithm; among ready operators the earliest declared runs
    /// first.
    pub fn topological_order(&self) -> Result<Vec<Arc<str>>> {
        let index: FxHashMap<&str, usize> = self
            .operator_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_ref(), i))
            .collect();

        let mut in_degree: Vec<usize> = self
            .operator_ids
            .iter()
            .map(|id| self.dependencies(id).len())
            .collect();

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.operator_ids.len());
        while let Some(next) = ready.pop_first() {
            let id = &self.operator_ids[next];
            order.push(Arc::clone(id));

            for succ in self.successors(id) {
                if let Some(&i) = index.get(succ.as_ref()) {
                    in_degree[i] -= 1;
                    if in_degree[i] == 0 {
                        ready.insert(i);
                    }
                }
            }
        }

        if order.len() != self.operator_ids.len() {
            // Only reachable when detect_cycles was skipped
            self.detect_cycles()?;
        }
        Ok(order)
    }
}
