//! Resource definitions - closed key set, schemas and instance types

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use parking_lot::Mutex;

use crate::config::{ConfigSchema, ConfigType};

/// Every resource a job can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKey {
    /// Connection handle built from credentials
    Connection,
    /// Base/run directory resolution
    Paths,
    /// Accumulating counter sink
    Metrics,
}

impl ResourceKey {
    pub const ALL: [ResourceKey; 3] = [Self::Connection, Self::Paths, Self::Metrics];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Paths => "paths",
            Self::Metrics => "metrics",
        }
    }

    /// Declared config schema of the resource
    pub fn config_schema(self) -> ConfigSchema {
        match self {
            Self::Connection => ConfigSchema::new().field("credentials", ConfigType::String),
            Self::Paths => ConfigSchema::new().field("basedir", ConfigType::String),
            Self::Metrics => ConfigSchema::new(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown resource '{}'", s))
    }
}

/// Connection handle: holds the normalised credential token
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionHandle {
    token: String,
}

impl ConnectionHandle {
    pub fn new(credentials: &str) -> Self {
        Self {
            token: credentials.to_uppercase(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// Never print the full token
impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionHandle({})", mask_token(&self.token, 4))
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection({})", mask_token(&self.token, 4))
    }
}

/// Shows the first `visible_chars` chars followed by asterisks
pub fn mask_token(token: &str, visible_chars: usize) -> String {
    if token.is_empty() {
        return String::new();
    }
    let visible: String = token.chars().take(visible_chars).collect();
    format!("{}***", visible)
}

/// Path context: base directory plus the run's own directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathContext {
    basedir: PathBuf,
    rundir: PathBuf,
}

impl PathContext {
    pub fn new(basedir: impl Into<PathBuf>, run_id: &str) -> Self {
        let basedir = basedir.into();
        let rundir = basedir.join(run_id);
        Self { basedir, rundir }
    }

    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    pub fn rundir(&self) -> &Path {
        &self.rundir
    }
}

/// Counter sink shared by all operators of a run.
///
/// Unlike the other resources this one is mutated through a shared
/// reference; the inner mutex serialises concurrent writers.
#[derive(Debug, Default)]
pub struct MetricsSink {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, delta: u64) {
        *self.counters.lock().entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters.lock().clone()
    }
}

/// A constructed resource
#[derive(Debug)]
pub enum ResourceInstance {
    Connection(ConnectionHandle),
    Paths(PathContext),
    Metrics(MetricsSink),
}

impl ResourceInstance {
    pub fn key(&self) -> ResourceKey {
        match self {
            Self::Connection(_) => ResourceKey::Connection,
            Self::Paths(_) => ResourceKey::Paths,
            Self::Metrics(_) => ResourceKey::Metrics,
        }
    }
}
