//! Bastion CLI -- command-line interface for the Bastion template audit engine.
//!
//! This crate provides the subcommands, their argument parsing, and the
//! process exit codes that CI pipelines use as the pass/fail signal.

use std::fmt;

pub mod commands;

// ---------------------------------------------------------------------------
// Exit Codes
// ---------------------------------------------------------------------------

/// Bastion process exit codes.
///
/// | Code | Meaning                                          |
/// |------|--------------------------------------------------|
/// | 0    | Audit completed, no failing violations           |
/// | 1    | Audit completed, failing violations found        |
/// | 2    | Engine error (missing input, I/O)                |
/// | 4    | Configuration error                              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ExitCode {
    /// Audit completed with no failing violations.
    Pass = 0,
    /// Audit completed and found failing violations.
    Failures = 1,
    /// The audit could not run to completion.
    EngineError = 2,
    /// Configuration, rule, or filter files are unusable.
    ConfigError = 4,
}

impl ExitCode {
    /// Returns the numeric exit code as a `u8`.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns all exit code variants.
    #[must_use]
    pub const fn all() -> &'static [ExitCode] {
        &[
            Self::Pass,
            Self::Failures,
            Self::EngineError,
            Self::ConfigError,
        ]
    }

    /// Returns a human-readable description of this exit code.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Pass => "audit completed, no failing violations",
            Self::Failures => "audit completed, failing violations found",
            Self::EngineError => "engine error (missing input, I/O)",
            Self::ConfigError => "configuration error",
        }
    }

    /// `Pass` for zero failures, `Failures` otherwise.
    #[must_use]
    pub const fn from_failure_count(failures: u32) -> Self {
        if failures == 0 {
            Self::Pass
        } else {
            Self::Failures
        }
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exit code {} ({})", self.as_u8(), self.description())
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.as_u8())
    }
}

/// Logs the exit reason and converts `code` for returning from `main`.
///
/// ```rust,no_run
/// use bastion_cli::ExitCode;
///
/// fn main() -> std::process::ExitCode {
///     bastion_cli::terminate(ExitCode::Pass)
/// }
/// ```
pub fn terminate(code: ExitCode) -> std::process::ExitCode {
    match code {
        ExitCode::Pass => tracing::info!(%code, "bastion exiting"),
        ExitCode::Failures => tracing::warn!(%code, "bastion exiting"),
        _ => tracing::error!(%code, "bastion exiting with error"),
    }
    code.into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
