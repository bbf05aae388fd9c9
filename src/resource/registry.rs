//! Resource registry - per-run instantiation and injection
//!
//! Each distinct key is resolved once per run; the instance is cached in
//! `Resources` and shared by every operator that declares the key.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::config::ConfigValues;
use crate::error::{OpgraphError, Result};
use crate::event::{EventEmitter, EventKind};
use crate::operator::OperatorError;

use super::definition::{
    ConnectionHandle, MetricsSink, PathContext, ResourceInstance, ResourceKey,
};

pub struct ResourceRegistry;

impl ResourceRegistry {
    /// Validate `config` against the key's schema, then construct.
    ///
    /// Construction side effects (directory creation) are idempotent.
    #[instrument(skip(config))]
    pub fn resolve(key: ResourceKey, config: &Value, run_id: &str) -> Result<ResourceInstance> {
        let owner = format!("resource '{}'", key);
        let values = key.config_schema().validate(&owner, config)?;
        Self::construct(key, &values, run_id)
    }

    fn construct(key: ResourceKey, values: &ConfigValues, run_id: &str) -> Result<ResourceInstance> {
        let field = |name: &str| {
            values
                .str(name)
                .map(str::to_owned)
                .ok_or_else(|| OpgraphError::MissingConfigField {
                    owner: format!("resource '{}'", key),
                    field: name.to_string(),
                })
        };

        match key {
            ResourceKey::Connection => Ok(ResourceInstance::Connection(ConnectionHandle::new(
                &field("credentials")?,
            ))),
            ResourceKey::Paths => {
                let paths = PathContext::new(field("basedir")?, run_id);
                fs::create_dir_all(paths.rundir()).map_err(|e| OpgraphError::ResourceInit {
                    resource: key.to_string(),
                    reason: format!("cannot create {}: {}", paths.rundir().display(), e),
                })?;
                Ok(ResourceInstance::Paths(paths))
            }
            ResourceKey::Metrics => Ok(ResourceInstance::Metrics(MetricsSink::new())),
        }
    }
}

/// Resource instances of one run
#[derive(Debug)]
pub struct Resources {
    run_id: Arc<str>,
    instances: FxHashMap<ResourceKey, ResourceInstance>,
}

impl Resources {
    /// Resolve every bound resource once for `run_id`
    pub fn instantiate(
        run_id: &Arc<str>,
        bound: &[(ResourceKey, ConfigValues)],
        emitter: &dyn EventEmitter,
    ) -> Result<Self> {
        let mut instances = FxHashMap::default();

        for (key, values) in bound {
            if instances.contains_key(key) {
                continue;
            }
            let instance = ResourceRegistry::resolve(*key, &values.to_value(), run_id)?;
            emitter.emit(EventKind::ResourceInitialized {
                run_id: Arc::clone(run_id),
                resource: key.to_string(),
            });
            info!(resource = %key, "Resource initialized");
            instances.insert(*key, instance);
        }

        Ok(Self {
            run_id: Arc::clone(run_id),
            instances,
        })
    }

    pub fn get(&self, key: ResourceKey) -> Option<&ResourceInstance> {
        self.instances.get(&key)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Access limited to the keys an operator declared
    pub fn view<'a>(&'a self, operator: &'a str, declared: &'a [ResourceKey]) -> ResourceView<'a> {
        ResourceView {
            operator,
            declared,
            resources: self,
        }
    }

    /// Counters recorded in the metrics sink (empty without one)
    pub fn metrics_snapshot(&self) -> BTreeMap<String, u64> {
        match self.get(ResourceKey::Metrics) {
            Some(ResourceInstance::Metrics(sink)) => sink.snapshot(),
            _ => BTreeMap::new(),
        }
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        if !self.instances.is_empty() {
            debug!(run_id = %self.run_id, count = self.instances.len(), "Releasing resources");
        }
    }
}

/// Typed, declaration-checked resource access for one operator
#[derive(Clone, Copy)]
pub struct ResourceView<'a> {
    operator: &'a str,
    declared: &'a [ResourceKey],
    resources: &'a Resources,
}

impl<'a> ResourceView<'a> {
    fn lookup(&self, key: ResourceKey) -> std::result::Result<&'a ResourceInstance, OperatorError> {
        if !self.declared.contains(&key) {
            return Err(OperatorError::new(
                self.operator,
                format!("resource '{}' was not declared", key),
            ));
        }
        self.resources.get(key).ok_or_else(|| {
            OperatorError::new(self.operator, format!("resource '{}' is not available", key))
        })
    }

    pub fn connection(&self) -> std::result::Result<&'a ConnectionHandle, OperatorError> {
        match self.lookup(ResourceKey::Connection)? {
            ResourceInstance::Connection(conn) => Ok(conn),
            other => Err(self.wrong_kind(other)),
        }
    }

    pub fn paths(&self) -> std::result::Result<&'a PathContext, OperatorError> {
        match self.lookup(ResourceKey::Paths)? {
            ResourceInstance::Paths(paths) => Ok(paths),
            other => Err(self.wrong_kind(other)),
        }
    }

    pub fn metrics(&self) -> std::result::Result<&'a MetricsSink, OperatorError> {
        match self.lookup(ResourceKey::Metrics)? {
            ResourceInstance::Metrics(sink) => Ok(sink),
            other => Err(self.wrong_kind(other)),
        }
    }

    fn wrong_kind(&self, instance: &ResourceInstance) -> OperatorError {
        OperatorError::new(
            self.operator,
            format!("resource slot holds '{}'", instance.key()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventLog, NoopEmitter};
    use serde_json::json;
    use tempfile::TempDir;

    fn validated(key: ResourceKey, raw: Value) -> (ResourceKey, ConfigValues) {
        (key, key.config_schema().validate(key.as_str(), &raw).unwrap())
    }

    #[test]
    fn resolve_validates_before_construction() {
        let err = ResourceRegistry::resolve(ResourceKey::Connection, &json!({}), "r1").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("credentials"));
        assert!(msg.contains("connection"));

        let err = ResourceRegistry::resolve(
            ResourceKey::Connection,
            &json!({"credentials": 42}),
            "r1",
        )
        .unwrap_err();
        assert!(matches!(err, OpgraphError::ConfigTypeMismatch { .. }));
    }

    #[test]
    fn paths_creates_rundir_and_is_retry_safe() {
        let dir = TempDir::new().unwrap();
        let cfg = json!({"basedir": dir.path().to_string_lossy()});

        for _ in 0..2 {
            let instance = ResourceRegistry::resolve(ResourceKey::Paths, &cfg, "r1").unwrap();
            let ResourceInstance::Paths(paths) = instance else {
                panic!("expected paths");
            };
            assert!(paths.rundir().is_dir());
        }
    }

    #[test]
    fn instantiate_resolves_each_key_once() {
        let log = EventLog::new();
        let run_id: Arc<str> = Arc::from("r1");
        let bound = vec![
            validated(ResourceKey::Connection, json!({"credentials": "pw"})),
            validated(ResourceKey::Connection, json!({"credentials": "pw"})),
            validated(ResourceKey::Metrics, json!({})),
        ];

        let resources = Resources::instantiate(&run_id, &bound, &log).unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn view_enforces_declarations() {
        let run_id: Arc<str> = Arc::from("r1");
        let bound = vec![
            validated(ResourceKey::Connection, json!({"credentials": "pw"})),
            validated(ResourceKey::Metrics, json!({})),
        ];
        let resources = Resources::instantiate(&run_id, &bound, &NoopEmitter).unwrap();

        let declared = [ResourceKey::Connection];
        let view = resources.view("fetch", &declared);
        assert_eq!(view.connection().unwrap().token(), "PW");

        let err = view.metrics().unwrap_err();
        assert_eq!(err.operator, "fetch");
        assert!(err.cause.contains("not declared"));
    }

    #[test]
    fn metrics_are_shared_between_views() {
        let run_id: Arc<str> = Arc::from("r1");
        let bound = vec![validated(ResourceKey::Metrics, json!({}))];
        let resources = Resources::instantiate(&run_id, &bound, &NoopEmitter).unwrap();
        let declared = [ResourceKey::Metrics];

        resources.view("a", &declared).metrics().unwrap().record("rows", 2);
        resources.view("b", &declared).metrics().unwrap().record("rows", 3);

        assert_eq!(resources.metrics_snapshot()["rows"], 5);
    }
}
