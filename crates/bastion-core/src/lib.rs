//! Bastion Core -- the audit engine, template discovery, and aggregation.
//!
//! The [`AuditEngine`] ties the template parser, the loaded rule set, and the
//! violation filter together. It audits a single document with
//! [`AuditEngine::audit`] or a file/directory tree with
//! [`AuditEngine::audit_aggregate`].

use std::path::PathBuf;

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod executor;
pub mod scanner;

pub use aggregate::{AggregateEntry, AggregateResult};
pub use engine::{load_rules, AuditEngine, EngineOptions, FileAuditResult};
pub use executor::{RuleExecutionError, RuleExecutor};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Top-level error type for the bastion-core crate.
///
/// Only failures that abort a whole run live here. Per-file problems are
/// reported as FATAL violations instead.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The audit input does not exist.
    #[error("input path '{}' does not exist", .0.display())]
    InputNotFound(PathBuf),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Rules could not be loaded into the rule set.
    #[error("rule loading error: {0}")]
    RuleLoad(#[from] bastion_rules::RuleSetError),

    /// The template file-name pattern is not a valid regex.
    #[error("invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The worker pool could not be built.
    #[error("worker pool error: {0}")]
    ThreadPool(String),

    /// Tracing/logging initialization failed.
    #[error("tracing initialization error: {0}")]
    TracingInit(String),
}

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

// ---------------------------------------------------------------------------
// Tracing / Logging
// ---------------------------------------------------------------------------

/// Initialize structured tracing with the given verbosity level.
///
/// | `verbose` | `quiet` | `json_output` | Effect                           |
/// |-----------|---------|---------------|----------------------------------|
/// | `true`    | _       | _             | DEBUG level                      |
/// | _         | `true`  | _             | ERROR level only                 |
/// | `false`   | `false` | _             | WARN level (default)             |
/// | _         | _       | `true`        | JSON-formatted log lines         |
/// | _         | _       | `false`       | Human-readable, compact lines    |
///
/// Logs go to stderr; stdout is reserved for reports. `RUST_LOG`, when set,
/// takes precedence over the flags.
///
/// # Errors
///
/// Returns [`CoreError::TracingInit`] if a global subscriber is already set.
pub fn init_tracing(verbose: bool, quiet: bool, json_output: bool) -> Result<(), CoreError> {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_output {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| CoreError::TracingInit(e.to_string()))
    } else {
        fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init()
            .map_err(|e| CoreError::TracingInit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_not_found_names_the_path() {
        let err = CoreError::InputNotFound(PathBuf::from("/no/such/dir"));
        assert_eq!(err.to_string(), "input path '/no/such/dir' does not exist");
    }

    #[test]
    fn bad_pattern_converts_from_regex_error() {
        let err: CoreError = regex::Regex::new("(").unwrap_err().into();
        assert!(err.to_string().starts_with("invalid template pattern"));
    }

    #[test]
    fn second_tracing_init_fails() {
        let _ = init_tracing(false, true, false);
        assert!(matches!(
            init_tracing(false, true, false),
            Err(CoreError::TracingInit(_))
        ));
    }
}
