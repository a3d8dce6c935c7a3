//! Incremental backup engine
//!
//! This crate provides:
//! - Engine configuration (TOML)
//! - Source enumeration with ignore rules
//! - Artifact-chain resolution over a generation directory
//! - Full and incremental runs, crash cleanup and journal recovery
//! - Restore of any committed (generation, revision)

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod ignore;
pub mod read;
pub mod report;
pub mod scan;

// Re-exports
pub use config::EngineConfig;
pub use engine::BackupEngine;
pub use error::{EngineError, Result};
pub use report::{
    FailureKind, FileFailure, GenerationInfo, RestoreReport, RunKind, RunPhase, RunReport, StatusReport,
};
