//! CLI subcommands and the argument groups they share.

use std::path::{Path, PathBuf};

use bastion_core::config::{BastionConfig, RulesConfig};
use bastion_core::CoreError;

use crate::ExitCode;

pub mod config;
pub mod rules;
pub mod scan;

/// Where audit rules come from.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RuleSourceArgs {
    /// Additional directory of declarative YAML rules (repeatable).
    #[arg(long = "rules-dir", value_name = "DIR")]
    pub rules_dirs: Vec<PathBuf>,

    /// Do not load the built-in rules.
    #[arg(long)]
    pub no_builtin: bool,
}

impl RuleSourceArgs {
    /// Layers the flags over the configured rule sources.
    pub fn apply(&self, rules: &mut RulesConfig) {
        if self.no_builtin {
            rules.builtin = false;
        }
        for dir in &self.rules_dirs {
            if !rules.directories.contains(dir) {
                rules.directories.push(dir.clone());
            }
        }
    }
}

/// Directory whose `.bastion.yaml` applies to `input`.
pub(crate) fn project_dir(input: &Path) -> PathBuf {
    if input.is_dir() {
        return input.to_path_buf();
    }
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Exit code for an error raised while building the engine.
pub(crate) fn exit_code_for(err: &CoreError) -> ExitCode {
    match err {
        CoreError::Config(_) | CoreError::RuleLoad(_) | CoreError::Pattern(_) => {
            ExitCode::ConfigError
        }
        _ => ExitCode::EngineError,
    }
}

/// Loads configuration for `dir` and validates it, printing any error.
///
/// `user_config` controls whether `~/.bastion.yaml` is layered underneath.
pub(crate) fn load_validated_config(
    dir: &Path,
    user_config: bool,
    adjust: impl FnOnce(&mut BastionConfig),
) -> Result<BastionConfig, ExitCode> {
    let mut config = load_layers(dir, user_config).map_err(report)?;
    adjust(&mut config);
    config.validate().map_err(report)?;
    Ok(config)
}

/// Home then project configuration, or project only.
pub(crate) fn load_layers(dir: &Path, user_config: bool) -> Result<BastionConfig, CoreError> {
    if user_config {
        bastion_core::config::load_config(Some(dir))
    } else {
        bastion_core::config::load_config_from(None, Some(dir))
    }
}

/// Prints `err` to stderr and maps it to an exit code.
pub(crate) fn report(err: CoreError) -> ExitCode {
    eprintln!("bastion: error: {err}");
    exit_code_for(&err)
}
