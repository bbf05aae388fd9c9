//! Local filesystem IO manager
//!
//! Layout: one directory per run id under the base, one JSON file per
//! operator output inside it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::{OpgraphError, Result};

use super::{validate_run_id, ArtifactKey, ArtifactLocation, IoManager};

const EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FsIoManager {
    base: PathBuf,
    run_id: String,
    run_dir: PathBuf,
}

impl FsIoManager {
    /// Scope a manager to `{base}/{run_id}`, creating the directory.
    ///
    /// Safe to call repeatedly for the same run.
    pub fn new(base: impl AsRef<Path>, run_id: &str) -> Result<Self> {
        validate_run_id(run_id)?;

        let base = base.as_ref().to_path_buf();
        let run_dir = base.join(run_id);
        fs::create_dir_all(&run_dir)?;

        Ok(Self {
            base,
            run_id: run_id.to_string(),
            run_dir,
        })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Deterministic file path of an artifact
    pub fn path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.base
            .join(&*key.run_id)
            .join(format!("{}.{}.{}", key.operator, key.output, EXTENSION))
    }

    fn temp_path_for(&self, key: &ArtifactKey) -> PathBuf {
        self.base
            .join(&*key.run_id)
            .join(format!(".{}.{}.{}.tmp", key.operator, key.output, EXTENSION))
    }
}

impl IoManager for FsIoManager {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    #[instrument(skip(self, value), fields(artifact = %key))]
    fn put(&self, key: &ArtifactKey, value: &Value) -> Result<ArtifactLocation> {
        self.check_scope(key)?;

        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write-then-rename: a re-run replaces the file in one step
        let tmp = self.temp_path_for(key);
        fs::write(&tmp, serde_json::to_string(value)?)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), "Artifact written");
        Ok(ArtifactLocation::File(path))
    }

    #[instrument(skip(self), fields(artifact = %key))]
    fn get(&self, key: &ArtifactKey) -> Result<Value> {
        self.check_scope(key)?;

        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(OpgraphError::ArtifactNotFound {
                    run_id: key.run_id.to_string(),
                    operator: key.operator.to_string(),
                    output: key.output.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| OpgraphError::ArtifactDecode {
            location: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn list(&self) -> Result<Vec<(ArtifactKey, ArtifactLocation)>> {
        let mut artifacts = Vec::new();

        for entry in WalkDir::new(&self.run_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| OpgraphError::IoError(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.starts_with('.') {
                continue; // in-flight temp file
            }
            let Some(stem) = name.strip_suffix(&format!(".{}", EXTENSION)) else {
                continue;
            };
            let Some((operator, output)) = stem.split_once('.') else {
                continue;
            };
            let key = ArtifactKey::new(&self.run_id, operator, output);
            artifacts.push((key, ArtifactLocation::File(entry.path().to_path_buf())));
        }

        artifacts.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(artifacts)
    }

    fn locate(&self, key: &ArtifactKey) -> ArtifactLocation {
        ArtifactLocation::File(self.path_for(key))
    }

    fn clear(&self) -> Result<usize> {
        let artifacts = self.list()?;
        for (key, location) in &artifacts {
            if let Some(path) = location.as_path() {
                match fs::remove_file(path) {
                    Ok(()) => debug!(artifact = %key, "Artifact removed"),
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(artifacts.len())
    }
}
