//! Genealogy relationship engine.
//! This crate is the single source of truth for family-tree invariants.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, EngineConfig};
pub use engine::{
    GenerationResolver, Generations, IntegrityValidator, NodeRole, PersonDeleteMode, PersonNode,
    StatisticsEngine, TreeOperation, TreeSnapshot, TreeStatistics, ViewBuilder, ViewGraph,
    ViewMode,
};
pub use error::{ConflictError, EngineError, EngineResult, NotFoundError, ValidationError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use repo::{SqliteTreeStore, StoreError, StoreResult, TreeStore};
pub use service::{GenealogyError, GenealogyResult, GenealogyService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
