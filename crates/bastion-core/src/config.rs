//! Configuration loading and merging for Bastion.
//!
//! Bastion resolves configuration with CLI > project > home > defaults
//! precedence. Configuration is loaded from `.bastion.yaml` files. Relative
//! paths inside a file are resolved against that file's directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::scanner::DEFAULT_TEMPLATE_PATTERN;
use crate::{CoreError, CoreResult};

/// Configuration file name looked up in the home and project directories.
pub const CONFIG_FILE_NAME: &str = ".bastion.yaml";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Top-level Bastion configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BastionConfig {
    /// Engine behaviour.
    pub audit: AuditConfig,
    /// Rule sources.
    pub rules: RulesConfig,
    /// Profile and blacklist files.
    pub filters: FiltersConfig,
    /// Reporting settings.
    pub reporting: ReportingConfig,
}

// ---------------------------------------------------------------------------
// AuditConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Turn rule failures into violations instead of aborting the file.
    pub isolate_rule_exceptions: bool,
    /// Regex a file name must fully match to be audited in a directory walk.
    pub template_pattern: String,
    /// Worker threads for aggregate audits. `None` uses one per CPU.
    pub jobs: Option<usize>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            isolate_rule_exceptions: false,
            template_pattern: DEFAULT_TEMPLATE_PATTERN.to_string(),
            jobs: None,
        }
    }
}

// ---------------------------------------------------------------------------
// RulesConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Load the embedded rule pack.
    pub builtin: bool,
    /// Directories of declarative rule files, loaded after the built-ins.
    pub directories: Vec<PathBuf>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            builtin: true,
            directories: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// FiltersConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Allow-profile file.
    pub profile: Option<PathBuf>,
    /// Deny-blacklist file.
    pub blacklist: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ReportingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Default output format.
    pub default_format: String,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            default_format: "txt".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Load and merge configuration from multiple sources.
///
/// Resolution order (highest priority first):
/// 1. CLI overrides (applied by the caller after loading)
/// 2. `.bastion.yaml` in the project directory
/// 3. `.bastion.yaml` in the user home directory
/// 4. Built-in defaults
///
/// # Errors
///
/// Returns [`CoreError::Config`] if a config file exists but is malformed.
pub fn load_config(project_dir: Option<&Path>) -> CoreResult<BastionConfig> {
    load_config_from(home_dir().as_deref(), project_dir)
}

/// Like [`load_config`] with an explicit home directory. `None` skips the
/// home layer.
///
/// Each layer replaces the `audit` flags, `audit.template_pattern`,
/// `rules.builtin`, and `reporting` of the layers below it, including with
/// defaults the file does not spell out. Rule directories are unioned;
/// `audit.jobs` and filter paths fall back to the lower layer.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if a config file exists but is malformed.
pub fn load_config_from(
    home_dir: Option<&Path>,
    project_dir: Option<&Path>,
) -> CoreResult<BastionConfig> {
    let mut config = BastionConfig::default();

    if let Some(home) = home_dir {
        let home_config = home.join(CONFIG_FILE_NAME);
        if home_config.is_file() {
            debug!(path = %home_config.display(), "loading home config");
            config = merge_config(config, load_config_file(&home_config)?);
        }
    }

    if let Some(dir) = project_dir {
        let project_config = dir.join(CONFIG_FILE_NAME);
        if project_config.is_file() {
            debug!(path = %project_config.display(), "loading project config");
            config = merge_config(config, load_config_file(&project_config)?);
        }
    }

    info!("configuration loaded");
    Ok(config)
}

/// Load a single config file, resolving its relative paths.
///
/// # Errors
///
/// Returns [`CoreError::Config`] if the file cannot be read or parsed.
pub fn load_config_file(path: &Path) -> CoreResult<BastionConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CoreError::Config(format!(
            "failed to read config file '{}': {e}",
            path.display()
        ))
    })?;

    let mut config: BastionConfig = serde_yml::from_str(&content).map_err(|e| {
        CoreError::Config(format!(
            "failed to parse config file '{}': {e}",
            path.display()
        ))
    })?;

    if let Some(base) = path.parent() {
        config.resolve_paths(base);
    }
    Ok(config)
}

impl BastionConfig {
    /// Checks values that deserialize fine but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Config`] describing the first invalid value.
    pub fn validate(&self) -> CoreResult<()> {
        crate::scanner::template_pattern(&self.audit.template_pattern).map_err(|e| {
            CoreError::Config(format!("audit.template_pattern: {e}"))
        })?;
        if self.audit.jobs == Some(0) {
            return Err(CoreError::Config("audit.jobs must be at least 1".into()));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.rules.directories.iter_mut().for_each(resolve);
        self.filters.profile.iter_mut().for_each(resolve);
        self.filters.blacklist.iter_mut().for_each(resolve);
    }
}

/// Merge `overlay` on top of `base`.
///
/// Scalar sections are replaced wholesale by the overlay; rule directories
/// are unioned and optional paths fall back to the base.
fn merge_config(base: BastionConfig, overlay: BastionConfig) -> BastionConfig {
    BastionConfig {
        audit: merge_audit(base.audit, overlay.audit),
        rules: merge_rules(base.rules, overlay.rules),
        filters: merge_filters(base.filters, overlay.filters),
        reporting: overlay.reporting,
    }
}

fn merge_audit(base: AuditConfig, overlay: AuditConfig) -> AuditConfig {
    AuditConfig {
        isolate_rule_exceptions: overlay.isolate_rule_exceptions,
        template_pattern: overlay.template_pattern,
        jobs: overlay.jobs.or(base.jobs),
    }
}

fn merge_rules(base: RulesConfig, overlay: RulesConfig) -> RulesConfig {
    let mut directories = base.directories;
    for dir in overlay.directories {
        if !directories.contains(&dir) {
            directories.push(dir);
        }
    }
    RulesConfig {
        builtin: overlay.builtin,
        directories,
    }
}

fn merge_filters(base: FiltersConfig, overlay: FiltersConfig) -> FiltersConfig {
    FiltersConfig {
        profile: overlay.profile.or(base.profile),
        blacklist: overlay.blacklist.or(base.blacklist),
    }
}

/// Get the user home directory.
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
