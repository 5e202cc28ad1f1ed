//! Error types for the validation pipeline.
//!
//! Findings reported by the engine are not errors; they travel as
//! [`crate::LintOutcome::FindingsPresent`].

use std::path::PathBuf;

use thiserror::Error;

/// Rule set catalog could not be built.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("unable to read rule sets directory {}: {source}", .dir.display())]
    RulesetsDir {
        dir: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// The request body could not be persisted for the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StageError {
    #[error("failed to create staged document {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write staged document {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The engine did not produce a report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LintError {
    #[error("failed to launch {}: {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for the engine: {0}")]
    Wait(#[source] std::io::Error),
    /// Exit codes other than 0 and 1. `code` is `None` when the process was
    /// terminated by a signal.
    #[error("engine exited with {}: {stderr}", .code.map_or_else(|| "a signal".to_owned(), |c| format!("code {c}")))]
    Exit { code: Option<i32>, stderr: String },
    #[error("engine did not finish within {} ms", .0.as_millis())]
    Timeout(std::time::Duration),
    #[error("engine output file {} could not be read: {source}", .path.display())]
    MissingOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
