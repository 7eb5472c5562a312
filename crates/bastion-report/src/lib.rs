//! Bastion Report -- renderers for aggregate audit results.
//!
//! Two formats ship by default:
//!
//! - `txt` ([`TxtRenderer`]) -- a human-readable block per file;
//! - `json` ([`JsonRenderer`]) -- the aggregate result as a JSON array.
//!
//! Further formats are added through [`RendererRegistry::register`].
//! [`render_and_audit`] runs an aggregate audit and writes one report.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use regex::Regex;
use tracing::debug;

use bastion_core::scanner::{template_pattern, DEFAULT_TEMPLATE_PATTERN};
use bastion_core::{AggregateResult, AuditEngine, CoreError};

pub mod json;
pub mod txt;

pub use json::JsonRenderer;
pub use txt::TxtRenderer;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors raised while auditing for a report or writing it.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// No renderer is registered under the requested name.
    #[error("unknown output format '{format}' (available: {available})")]
    UnknownFormat { format: String, available: String },

    /// The aggregate audit itself failed.
    #[error(transparent)]
    Audit(#[from] CoreError),

    /// Writing the report failed.
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the report failed.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Writes an [`AggregateResult`] in one output format.
pub trait Renderer: Send + Sync {
    /// Renders `result` to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] if serialization or writing fails.
    fn render(&self, result: &AggregateResult, out: &mut dyn Write) -> Result<(), ReportError>;
}

/// Named renderers. Names are matched exactly.
pub struct RendererRegistry {
    renderers: BTreeMap<String, Box<dyn Renderer>>,
}

impl RendererRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            renderers: BTreeMap::new(),
        }
    }

    /// Registers `renderer` under `name`, returning the renderer it replaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        renderer: Box<dyn Renderer>,
    ) -> Option<Box<dyn Renderer>> {
        self.renderers.insert(name.into(), renderer)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Renderer> {
        self.renderers.get(name).map(|r| &**r)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn formats(&self) -> Vec<&str> {
        self.renderers.keys().map(String::as_str).collect()
    }

    /// Looks up `format` or reports the available names.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownFormat`] if nothing is registered
    /// under `format`.
    pub fn resolve(&self, format: &str) -> Result<&dyn Renderer, ReportError> {
        self.get(format).ok_or_else(|| ReportError::UnknownFormat {
            format: format.to_string(),
            available: self.formats().join(", "),
        })
    }
}

impl Default for RendererRegistry {
    /// A registry holding `txt` and `json`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("txt", Box::new(TxtRenderer));
        registry.register("json", Box::new(JsonRenderer::default()));
        registry
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("formats", &self.formats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// render_and_audit
// ---------------------------------------------------------------------------

/// What to audit.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    /// Template file or directory.
    pub input_path: PathBuf,
    /// Optional parameter-override file applied to every template.
    pub parameters_path: Option<PathBuf>,
    /// Compiled template file-name pattern.
    pub template_pattern: Regex,
}

impl AuditRequest {
    /// A request for `input_path` with no parameters and the default pattern.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Pattern`] only if the default pattern is invalid.
    pub fn new(input_path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Ok(Self {
            input_path: input_path.into(),
            parameters_path: None,
            template_pattern: template_pattern(DEFAULT_TEMPLATE_PATTERN)?,
        })
    }

    #[must_use]
    pub fn with_parameters(mut self, path: impl Into<PathBuf>) -> Self {
        self.parameters_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: Regex) -> Self {
        self.template_pattern = pattern;
        self
    }
}

/// Audits `request` with `engine`, renders the result as `format` using the
/// default registry, and returns the total failure count.
///
/// # Errors
///
/// See [`render_and_audit_with`].
pub fn render_and_audit(
    engine: &AuditEngine,
    request: &AuditRequest,
    format: &str,
    out: &mut dyn Write,
) -> Result<u32, ReportError> {
    render_and_audit_with(&RendererRegistry::default(), engine, request, format, out)
}

/// Like [`render_and_audit`] with a caller-supplied registry.
///
/// The format is resolved before anything is audited.
///
/// # Errors
///
/// - [`ReportError::UnknownFormat`] if `format` is not registered.
/// - [`ReportError::Audit`] if the aggregate audit aborts.
/// - [`ReportError::Io`] or [`ReportError::Serialization`] if rendering fails.
pub fn render_and_audit_with(
    registry: &RendererRegistry,
    engine: &AuditEngine,
    request: &AuditRequest,
    format: &str,
    out: &mut dyn Write,
) -> Result<u32, ReportError> {
    let renderer = registry.resolve(format)?;

    let result = engine.audit_aggregate(
        &request.input_path,
        request.parameters_path.as_deref(),
        &request.template_pattern,
    )?;

    renderer.render(&result, out)?;
    out.flush()?;

    let failures = result.total_failure_count();
    debug!(format, files = result.len(), failures, "report written");
    Ok(failures)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
