//! Error taxonomy for the scheduler (spec §7).
//!
//! One `thiserror` enum per raising concern, following the shape of the
//! teacher's `commons::errors::GraphError` (a single enum with an
//! `as_kind()` string so the entry point can log "kind + relevant
//! identifiers" per spec §7's "User-visible behavior").

use std::collections::HashMap;
use std::fmt;

use crate::model::TaskId;

/// Structural or referential violation of the configuration document
/// (spec §4.2), plus the two load-time failure modes (I/O, YAML parsing)
/// that precede any of those checks.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("env var must be set: '{var}'")]
    EnvVarMissing { var: String },

    #[error("stages[#].id must be unique, duplicates={{{}}}", .ids.join(", "))]
    DuplicateStageId { ids: Vec<String> },

    #[error("stage '{stage_id}'.depends_on entry '{target}' must be an existing stage id")]
    UnknownDependsOn { stage_id: String, target: String },

    #[error("stage '{stage_id}' cannot depend on itself")]
    SelfDependency { stage_id: String },

    #[error("stage '{stage_id}': destination '{destination}' must be a known registry key")]
    UnknownDestination {
        stage_id: String,
        destination: String,
    },

    #[error("stage '{stage_id}': from.source '{source}' must be a known registry key")]
    UnknownSource { stage_id: String, source: String },
}

impl ConfigError {
    /// Short machine-stable name for the violation, for the single
    /// user-visible log line spec §7 asks for.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "io",
            ConfigError::Yaml { .. } => "yaml",
            ConfigError::EnvVarMissing { .. } => "env-var-missing",
            ConfigError::DuplicateStageId { .. } => "duplicate-stage-id",
            ConfigError::UnknownDependsOn { .. } => "unknown-depends-on",
            ConfigError::SelfDependency { .. } => "self-dependency",
            ConfigError::UnknownDestination { .. } => "unknown-destination",
            ConfigError::UnknownSource { .. } => "unknown-source",
        }
    }
}

/// The task DAG has a cycle (spec §4.4). Carries the full predecessors map
/// so the message enumerates it, as the literal scenario in spec §8 #5
/// requires.
#[derive(Debug)]
pub struct CyclicDependencyError {
    pub predecessors: HashMap<TaskId, Vec<TaskId>>,
}

impl fmt::Display for CyclicDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entries: Vec<_> = self.predecessors.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        write!(
            f,
            "please remove cyclic dependencies, check predecessors:\n{:#?}",
            entries
        )
    }
}

impl std::error::Error for CyclicDependencyError {}

/// A core invariant was violated (spec §7): task-ID collision or batch/plan
/// size mismatch. These should never happen for a validated configuration;
/// surfacing them as errors rather than panicking keeps a buggy plan from
/// taking down a long-running orchestrator mid-run.
#[derive(Debug, thiserror::Error)]
pub enum InternalError {
    #[error("generated {generated} sync tasks but only {unique} have unique task ids")]
    TaskIdCollision { generated: usize, unique: usize },

    #[error("execution plan has {expected} tasks but deduplicated batches cover {actual}")]
    BatchSizeMismatch { expected: usize, actual: usize },
}

/// One or more tasks in a batch failed (spec §4.5 step 2). Carries every
/// task's outcome, not just the failures, so callers can log a full report.
#[derive(Debug)]
pub struct BatchFailureError {
    pub results: Vec<(TaskId, Result<(), String>)>,
}

impl fmt::Display for BatchFailureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<_> = self
            .results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| format!("{}: {}", id, e)))
            .collect();
        write!(f, "batch failed, could not complete:\n{}", failed.join("\n"))
    }
}

impl std::error::Error for BatchFailureError {}

/// Failure during task expansion (spec §4.3): either the remote tag lookup
/// itself failed, or the resulting task set violated an invariant.
#[derive(Debug, thiserror::Error)]
pub enum ExpandError {
    #[error(transparent)]
    Registry(#[from] registry_client::RegistryError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Top-level error for a full scheduling run, wrapping every concern this
/// crate can raise plus the registry-client's own taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cyclic(#[from] CyclicDependencyError),

    #[error(transparent)]
    Internal(#[from] InternalError),

    #[error(transparent)]
    Batch(#[from] BatchFailureError),

    #[error(transparent)]
    Registry(#[from] registry_client::RegistryError),
}

impl From<ExpandError> for SyncError {
    fn from(e: ExpandError) -> Self {
        match e {
            ExpandError::Registry(e) => SyncError::Registry(e),
            ExpandError::Internal(e) => SyncError::Internal(e),
        }
    }
}
