//! RunStorage - the executor's view of storage for one run
//!
//! Wraps an `IoManager` and records a materialization event on every
//! successful `put` and a load event on every `get`.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::event::{EventEmitter, EventKind};

use super::{value_len, ArtifactKey, ArtifactLocation, IoManager};

#[derive(Clone)]
pub struct RunStorage {
    run_id: Arc<str>,
    manager: Arc<dyn IoManager>,
    emitter: Arc<dyn EventEmitter>,
}

impl RunStorage {
    pub fn new(manager: Arc<dyn IoManager>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            run_id: Arc::from(manager.run_id()),
            manager,
            emitter,
        }
    }

    pub fn run_id(&self) -> &Arc<str> {
        &self.run_id
    }

    pub fn key(&self, operator: &Arc<str>, output: &str) -> ArtifactKey {
        ArtifactKey {
            run_id: Arc::clone(&self.run_id),
            operator: Arc::clone(operator),
            output: Arc::from(output),
        }
    }

    #[instrument(skip(self, value), fields(run_id = %self.run_id))]
    pub fn put(&self, operator: &Arc<str>, output: &str, value: &Value) -> Result<ArtifactLocation> {
        let location = self.manager.put(&self.key(operator, output), value)?;
        let len = value_len(value);

        debug!(%location, len, "Materialized artifact");
        self.emitter.emit(EventKind::ArtifactMaterialized {
            run_id: Arc::clone(&self.run_id),
            operator: Arc::clone(operator),
            output: output.to_string(),
            location: location.to_string(),
            len,
        });

        Ok(location)
    }

    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub fn get(&self, operator: &Arc<str>, output: &str) -> Result<Value> {
        let key = self.key(operator, output);
        let value = self.manager.get(&key)?;

        self.emitter.emit(EventKind::ArtifactLoaded {
            run_id: Arc::clone(&self.run_id),
            operator: Arc::clone(operator),
            output: output.to_string(),
            location: self.manager.locate(&key).to_string(),
        });

        Ok(value)
    }

    pub fn list(&self) -> Result<Vec<(ArtifactKey, ArtifactLocation)>> {
        self.manager.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventLog;
    use crate::storage::MemoryIoManager;
    use serde_json::json;

    #[test]
    fn put_emits_materialization_with_length() {
        let log = EventLog::new();
        let storage = RunStorage::new(
            Arc::new(MemoryIoManager::new("r1").unwrap()),
            Arc::new(log.clone()),
        );
        let op: Arc<str> = Arc::from("strip");

        storage.put(&op, "clean", &json!("A B C")).unwrap();

        let events = log.materializations("r1");
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            EventKind::ArtifactMaterialized { operator, output, len, .. } => {
                assert_eq!(&**operator, "strip");
                assert_eq!(output, "clean");
                assert_eq!(*len, 5);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn get_records_backend_location() {
        let log = EventLog::new();
        let storage = RunStorage::new(
            Arc::new(MemoryIoManager::new("r1").unwrap()),
            Arc::new(log.clone()),
        );
        let op: Arc<str> = Arc::from("fetch");
        let stored = storage.put(&op, "raw", &json!("a#b c")).unwrap();

        storage.get(&op, "raw").unwrap();

        let loaded: Vec<String> = log
            .filter_run("r1")
            .into_iter()
            .filter_map(|e| match e.kind {
                EventKind::ArtifactLoaded { location, .. } => Some(location),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, vec![stored.to_string()]);
        assert_eq!(loaded[0], "memory://r1/fetch.raw");
    }

    #[test]
    fn failed_get_emits_nothing() {
        let log = EventLog::new();
        let storage = RunStorage::new(
            Arc::new(MemoryIoManager::new("r1").unwrap()),
            Arc::new(log.clone()),
        );
        assert!(storage.get(&Arc::from("fetch"), "raw").is_err());
        assert!(log.is_empty());
    }
}
