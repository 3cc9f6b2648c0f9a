//! Core scheduler: configuration model, task expansion, DAG construction and
//! batched execution for copying container images between registries
//! (spec §3-§5).

pub mod config;
pub mod errors;
pub mod executor;
pub mod expand;
pub mod model;
pub mod plan;

pub use errors::SyncError;
pub use model::{Configuration, SyncTask};
pub use plan::ExecutionPlan;
