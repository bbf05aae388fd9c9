//! In-memory IO manager with DashMap
//!
//! Keyed by the full `ArtifactKey`, so one shared map serves many runs
//! without collisions.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{OpgraphError, Result};

use super::{validate_run_id, ArtifactKey, ArtifactLocation, IoManager};

#[derive(Clone)]
pub struct MemoryIoManager {
    run_id: String,
    artifacts: Arc<DashMap<ArtifactKey, Value>>,
}

impl MemoryIoManager {
    /// Private map scoped to `run_id`
    pub fn new(run_id: &str) -> Result<Self> {
        Self::with_shared(Arc::new(DashMap::new()), run_id)
    }

    /// Scope a manager to `run_id` over a map shared with other runs
    pub fn with_shared(artifacts: Arc<DashMap<ArtifactKey, Value>>, run_id: &str) -> Result<Self> {
        validate_run_id(run_id)?;
        Ok(Self {
            run_id: run_id.to_string(),
            artifacts,
        })
    }

    fn location(key: &ArtifactKey) -> ArtifactLocation {
        ArtifactLocation::Memory(format!(
            "memory://{}/{}.{}",
            key.run_id, key.operator, key.output
        ))
    }
}

impl IoManager for MemoryIoManager {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    fn put(&self, key: &ArtifactKey, value: &Value) -> Result<ArtifactLocation> {
        self.check_scope(key)?;
        self.artifacts.insert(key.clone(), value.clone());
        Ok(Self::location(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<Value> {
        self.check_scope(key)?;
        self.artifacts
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| OpgraphError::ArtifactNotFound {
                run_id: key.run_id.to_string(),
                operator: key.operator.to_string(),
                output: key.output.to_string(),
            })
    }

    fn list(&self) -> Result<Vec<(ArtifactKey, ArtifactLocation)>> {
        let mut artifacts: Vec<_> = self
            .artifacts
            .iter()
            .filter(|entry| &*entry.key().run_id == self.run_id)
            .map(|entry| (entry.key().clone(), Self::location(entry.key())))
            .collect();
        artifacts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(artifacts)
    }

    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation {
        Self::location(key)
    }

    fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        self.artifacts.retain(|key, _| {
            let keep = &*key.run_id != self.run_id.as_str();
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_get_and_overwrite() {
        let io = MemoryIoManager::new("r1").unwrap();
        let key = ArtifactKey::new("r1", "upper", "upper");

        io.put(&key, &json!("first")).unwrap();
        let location = io.put(&key, &json!("second")).unwrap();

        assert_eq!(io.get(&key).unwrap(), json!("second"));
        assert_eq!(location.to_string(), "memory://r1/upper.upper");
        assert_eq!(io.list().unwrap().len(), 1);
    }

    #[test]
    fn missing_artifact() {
        let io = MemoryIoManager::new("r1").unwrap();
        let err = io.get(&ArtifactKey::new("r1", "fetch", "raw")).unwrap_err();
        assert!(err.to_string().contains("OPG-030"));
    }

    #[test]
    fn clear_leaves_other_runs_in_shared_map() {
        let shared = Arc::new(DashMap::new());
        let r1 = MemoryIoManager::with_shared(Arc::clone(&shared), "r1").unwrap();
        let r2 = MemoryIoManager::with_shared(Arc::clone(&shared), "r2").unwrap();
        r1.put(&ArtifactKey::new("r1", "fetch", "raw"), &json!("a")).unwrap();
        r1.put(&ArtifactKey::new("r1", "strip", "clean"), &json!("b")).unwrap();
        r2.put(&ArtifactKey::new("r2", "fetch", "raw"), &json!("c")).unwrap();

        assert_eq!(r1.clear().unwrap(), 2);
        assert!(r1.list().unwrap().is_empty());
        assert_eq!(r2.list().unwrap().len(), 1);
    }

    #[test]
    fn invalid_run_id_rejected() {
        assert!(MemoryIoManager::new("no/slashes").is_err());
    }
}
