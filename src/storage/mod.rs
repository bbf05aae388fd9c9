//! Storage Module - run-scoped artifact persistence (IO manager)
//!
//! - `IoManager`: backend trait (`put` / `get` / `list`)
//! - `FsIoManager`: `{base}/{run_id}/{operator}.{output}.json`
//! - `MemoryIoManager`: shared `DashMap`, for tests and ephemeral runs
//! - `StorageBackend`: opens a manager scoped to one run id
//! - `RunStorage`: manager + event emission for the executor
//!
//! Contract: write-then-read consistency within a run, overwrite on
//! repeated `put`, and isolation across run ids.

mod fs;
mod memory;
mod run_storage;

pub use fs::FsIoManager;
pub use memory::MemoryIoManager;
pub use run_storage::RunStorage;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{OpgraphError, Result};

/// Logical identity of an artifact: (run, operator, output)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactKey {
    pub run_id: Arc<str>,
    pub operator: Arc<str>,
    pub output: Arc<str>,
}

impl ArtifactKey {
    pub fn new(run_id: &str, operator: &str, output: &str) -> Self {
        Self {
            run_id: Arc::from(run_id),
            operator: Arc::from(operator),
            output: Arc::from(output),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.run_id, self.operator, self.output)
    }
}

/// Durable location of an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactLocation {
    File(PathBuf),
    Memory(String),
}

impl ArtifactLocation {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory(uri) => f.write_str(uri),
        }
    }
}

/// Pluggable storage backend, constructed for one base location and run id
pub trait IoManager: Send + Sync {
    /// Run id this manager is scoped to
    fn run_id(&self) -> &str;

    /// Persist `value`, overwriting any prior value for the same key
    fn put(&self, key: &ArtifactKey, value: &Value) -> Result<ArtifactLocation>;

    /// Load a value written by `put`; `ArtifactNotFound` if never written
    fn get(&self, key: &ArtifactKey) -> Result<Value>;

    /// All artifacts of this manager's run, sorted by key
    fn list(&self) -> Result<Vec<(ArtifactKey, ArtifactLocation)>>;

    /// Where `put` stores (or stored) `key`
    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation;

    /// Delete every artifact of this run, returning how many were removed
    fn clear(&self) -> Result<usize>;

    /// Reject keys belonging to another run
    fn check_scope(&self, key: &ArtifactKey) -> Result<()> {
        if &*key.run_id != self.run_id() {
            return Err(OpgraphError::StorageScopeViolation {
                scope: self.run_id().to_string(),
                run_id: key.run_id.to_string(),
            });
        }
        Ok(())
    }
}

/// Factory for run-scoped IO managers
#[derive(Clone)]
pub enum StorageBackend {
    Filesystem { root: PathBuf },
    Memory { artifacts: Arc<DashMap<ArtifactKey, Value>> },
}

impl StorageBackend {
    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self::Filesystem { root: root.into() }
    }

    pub fn memory() -> Self {
        Self::Memory {
            artifacts: Arc::new(DashMap::new()),
        }
    }

    /// Open a manager for `run_id` (creates the run directory on disk)
    pub fn open(&self, run_id: &str) -> Result<Arc<dyn IoManager>> {
        match self {
            Self::Filesystem { root } => Ok(Arc::new(FsIoManager::new(root, run_id)?)),
            Self::Memory { artifacts } => Ok(Arc::new(MemoryIoManager::with_shared(
                Arc::clone(artifacts),
                run_id,
            )?)),
        }
    }

    /// Open an existing run without creating anything
    pub fn open_existing(&self, run_id: &str) -> Result<Arc<dyn IoManager>> {
        validate_run_id(run_id)?;
        let exists = match self {
            Self::Filesystem { root } => root.join(run_id).is_dir(),
            Self::Memory { artifacts } => artifacts.iter().any(|e| &*e.key().run_id == run_id),
        };
        if !exists {
            return Err(OpgraphError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        self.open(run_id)
    }

    /// Filesystem root, if any
    pub fn root(&self) -> Option<&Path> {
        match self {
            Self::Filesystem { root } => Some(root),
            Self::Memory { .. } => None,
        }
    }
}

impl fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filesystem { root } => f
                .debug_struct("Filesystem")
                .field("root", root)
                .finish(),
            Self::Memory { artifacts } => f
                .debug_struct("Memory")
                .field("artifacts", &artifacts.len())
                .finish(),
        }
    }
}

/// Run ids become directory names: non-empty, `[A-Za-z0-9_-]` only
pub fn validate_run_id(run_id: &str) -> Result<()> {
    let reason = if run_id.is_empty() {
        Some("must not be empty")
    } else if !run_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Some("only ASCII letters, digits, '-' and '_' are allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(OpgraphError::InvalidRunId {
            run_id: run_id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Size metric recorded on materialization
pub(crate) fn value_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().len(),
    }
}
