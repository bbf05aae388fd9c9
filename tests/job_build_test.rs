//! # Job Build Tests
//!
//! Everything here fails (or succeeds) before any operator runs:
//! port wiring, cycles, resources, config binding.

use std::sync::Arc;

use opgraph::config::RunConfig;
use opgraph::operator::{FnOperator, OperatorSpec, Outputs, PortType};
use opgraph::resource::ResourceKey;
use opgraph::{ConfigType, Job, JobBuilder, OpgraphError};
use proptest::prelude::*;
use serde_json::json;

fn op(spec: OperatorSpec) -> FnOperator {
    FnOperator::new(spec, |_, _| Ok(Outputs::new()))
}

fn source(name: &str, output: &str, ty: PortType) -> FnOperator {
    op(OperatorSpec::new(name).output(output, ty))
}

// ============================================================================
// WIRING
// ============================================================================

#[test]
fn test_diamond_orders_by_dependencies_then_declaration() {
    let job = JobBuilder::new("diamond")
        .operator(op(OperatorSpec::new("join")
            .input("left", PortType::Str)
            .input("right", PortType::Str)
            .output("joined", PortType::Str)))
        .operator(op(OperatorSpec::new("right")
            .input("seed", PortType::Str)
            .output("right", PortType::Str)))
        .operator(op(OperatorSpec::new("left")
            .input("seed", PortType::Str)
            .output("left", PortType::Str)))
        .operator(source("root", "seed", PortType::Str))
        .build()
        .unwrap();

    assert_eq!(job.order(), vec!["root", "right", "left", "join"]);
    assert_eq!(job.graph().sinks().len(), 1);
    assert_eq!(&*job.graph().sinks()[0], "join");
}

#[test]
fn test_int_feeds_float_but_not_the_reverse() {
    let widen = JobBuilder::new("widen")
        .operator(source("count", "n", PortType::Int))
        .operator(op(OperatorSpec::new("scale").input("n", PortType::Float)))
        .build();
    assert!(widen.is_ok());

    let narrow = JobBuilder::new("narrow")
        .operator(source("ratio", "n", PortType::Float))
        .operator(op(OperatorSpec::new("count").input("n", PortType::Int)))
        .build();
    assert!(matches!(
        narrow,
        Err(OpgraphError::PortTypeMismatch { .. })
    ));
}

#[test]
fn test_unbound_input_names_operator_and_port() {
    let err = JobBuilder::new("dangling")
        .operator(op(OperatorSpec::new("lonely").input("nothing", PortType::Str)))
        .build()
        .unwrap_err();

    match err {
        OpgraphError::UnboundInput { operator, input } => {
            assert_eq!(operator, "lonely");
            assert_eq!(input, "nothing");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_job_input_and_operator_output_with_same_name_is_ambiguous() {
    let err = JobBuilder::new("ambiguous")
        .input("text", PortType::Str)
        .operator(source("producer", "text", PortType::Str))
        .operator(op(OperatorSpec::new("consumer").input("text", PortType::Str)))
        .config(RunConfig::new().with_input("text", json!("hi")))
        .build()
        .unwrap_err();

    assert!(matches!(err, OpgraphError::AmbiguousInput { .. }));
}

#[test]
fn test_cycle_is_reported_with_path() {
    let err = JobBuilder::new("loop")
        .operator(op(OperatorSpec::new("a")
            .input("c", PortType::Str)
            .output("a", PortType::Str)))
        .operator(op(OperatorSpec::new("b")
            .input("a", PortType::Str)
            .output("b", PortType::Str)))
        .operator(op(OperatorSpec::new("c")
            .input("b", PortType::Str)
            .output("c", PortType::Str)))
        .build()
        .unwrap_err();

    match err {
        OpgraphError::CycleDetected { cycle } => {
            assert!(cycle.contains('a'));
            assert!(cycle.contains("→"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_empty_job_is_rejected() {
    let err = JobBuilder::new("nothing").build().unwrap_err();
    assert!(matches!(err, OpgraphError::EmptyJob { .. }));
}

// ============================================================================
// RESOURCES AND CONFIG
// ============================================================================

#[test]
fn test_operator_resource_must_be_declared_on_job() {
    let err = JobBuilder::new("needs_conn")
        .operator(op(OperatorSpec::new("fetch")
            .output("x", PortType::Str)
            .resource(ResourceKey::Connection)))
        .build()
        .unwrap_err();

    assert!(matches!(err, OpgraphError::UndeclaredResource { .. }));
}

#[test]
fn test_missing_required_config_field() {
    let err = JobBuilder::new("cfg")
        .operator(op(OperatorSpec::new("fetch")
            .output("x", PortType::Str)
            .config_field("data_key", ConfigType::String)))
        .build()
        .unwrap_err();

    match err {
        OpgraphError::MissingConfigField { owner, field } => {
            assert_eq!(owner, "operator 'fetch'");
            assert_eq!(field, "data_key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_config_type_mismatch() {
    let err = JobBuilder::new("cfg")
        .operator(op(OperatorSpec::new("fetch")
            .output("x", PortType::Str)
            .config_field("data_key", ConfigType::String)))
        .config(RunConfig::new().with_op("fetch", json!({"data_key": 1})))
        .build()
        .unwrap_err();

    assert!(matches!(err, OpgraphError::ConfigTypeMismatch { .. }));
}

#[test]
fn test_config_for_unknown_operator_or_resource() {
    let base = || {
        JobBuilder::new("cfg").operator(source("only", "x", PortType::Str))
    };

    let err = base()
        .config(RunConfig::new().with_op("ghost", json!({})))
        .build()
        .unwrap_err();
    assert!(matches!(err, OpgraphError::UnknownOperatorConfig { .. }));

    let err = base()
        .config(RunConfig::new().with_resource(ResourceKey::Metrics, json!({})))
        .build()
        .unwrap_err();
    assert!(matches!(err, OpgraphError::UnknownConfigSection { .. }));
}

#[test]
fn test_config_defaults_are_applied() {
    let job = JobBuilder::new("defaults")
        .operator(op(OperatorSpec::new("norm")
            .output("x", PortType::Str)
            .config_default("force_error", ConfigType::Bool, json!(false))))
        .build()
        .unwrap();

    let step = job.step("norm").unwrap();
    assert_eq!(step.config().bool("force_error"), Some(false));
}

#[test]
fn test_run_config_from_yaml_binds_sections() {
    let yaml = r#"
ops:
  fetch:
    config:
      data_key: "2"
resources:
  connection:
    config:
      credentials: s3cret
"#;
    let config = RunConfig::from_yaml(yaml).unwrap();
    let job = JobBuilder::new("yaml")
        .operator(op(OperatorSpec::new("fetch")
            .output("x", PortType::Str)
            .resource(ResourceKey::Connection)
            .config_field("data_key", ConfigType::String)))
        .resource(ResourceKey::Connection)
        .config(config)
        .build()
        .unwrap();

    assert_eq!(job.step("fetch").unwrap().config().str("data_key"), Some("2"));
    assert_eq!(job.resources().len(), 1);
}

// ============================================================================
// RANDOM GRAPHS
// ============================================================================

/// Operator `op{i}` produces `o{i}` and consumes `o{j}` for each chosen
/// `j < i`; declared in `declared` order
fn random_job(
    n: usize,
    edges: &[bool],
    declared: &[usize],
    back_edge: bool,
) -> Result<Arc<Job>, OpgraphError> {
    let mut builder = JobBuilder::new("random");
    for &i in declared {
        let mut spec = OperatorSpec::new(format!("op{i}"));
        for j in (0..i).filter(|&j| edges[i * n + j]) {
            spec = spec.input(format!("o{j}"), PortType::Int);
        }
        if back_edge && i == 0 {
            spec = spec.input(format!("o{}", n - 1), PortType::Int);
        }
        builder = builder.operator(op(spec.output(format!("o{i}"), PortType::Int)));
    }
    builder.build()
}

fn dag() -> impl Strategy<Value = (usize, Vec<bool>, Vec<usize>)> {
    (2usize..9).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec(any::<bool>(), n * n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #[test]
    fn prop_producers_precede_consumers((n, edges, declared) in dag()) {
        let job = random_job(n, &edges, &declared, false).unwrap();
        let order: Vec<String> = job.order().iter().map(|s| s.to_string()).collect();
        prop_assert_eq!(order.len(), n);

        let position = |i: usize| order.iter().position(|name| *name == format!("op{i}"));
        for i in 0..n {
            for j in (0..i).filter(|&j| edges[i * n + j]) {
                prop_assert!(position(j) < position(i), "op{} must run before op{}", j, i);
            }
        }

        let again = random_job(n, &edges, &declared, false).unwrap();
        prop_assert_eq!(job.order(), again.order());
    }

    #[test]
    fn prop_back_edge_is_a_cycle((n, mut edges, declared) in dag()) {
        // chain op0 through op{n-1} so the back edge always closes a loop
        for i in 1..n {
            edges[i * n + i - 1] = true;
        }
        let built = random_job(n, &edges, &declared, true);
        prop_assert!(matches!(built, Err(OpgraphError::CycleDetected { .. })), "expected CycleDetected");
    }
}
