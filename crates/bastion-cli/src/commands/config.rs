//! The `config` CLI subcommand -- show and validate Bastion configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;

use bastion_core::config::BastionConfig;
use bastion_core::AuditEngine;

use super::{exit_code_for, load_layers};
use crate::ExitCode;

// ---------------------------------------------------------------------------
// ConfigArgs
// ---------------------------------------------------------------------------

/// Manage Bastion configuration.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,

    /// Project directory whose `.bastion.yaml` is layered over the home config.
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Ignore `~/.bastion.yaml` and read only the project configuration.
    #[arg(long, global = true)]
    pub no_user_config: bool,
}

/// Config sub-subcommands.
#[derive(Debug, clap::Subcommand)]
pub enum ConfigAction {
    /// Show the merged configuration.
    Show,
    /// Validate configuration, rule sources, and filter files.
    Validate,
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Executes the `config` subcommand.
pub fn execute(args: ConfigArgs) -> Result<ExitCode, anyhow::Error> {
    let user_config = !args.no_user_config;
    match args.action {
        ConfigAction::Show => execute_show(&args.dir, user_config),
        ConfigAction::Validate => Ok(execute_validate(&args.dir, user_config)),
    }
}

/// Prints the merged configuration as YAML.
fn execute_show(dir: &Path, user_config: bool) -> Result<ExitCode, anyhow::Error> {
    let cfg = load_layers(dir, user_config).context("failed to load configuration")?;
    let yaml = serde_yml::to_string(&cfg).context("failed to serialize configuration to YAML")?;
    print!("{yaml}");
    Ok(ExitCode::Pass)
}

fn execute_validate(dir: &Path, user_config: bool) -> ExitCode {
    match check(dir, user_config) {
        Ok(()) => {
            println!("Configuration is valid.");
            ExitCode::Pass
        }
        Err((message, code)) => {
            eprintln!("Configuration error: {message}");
            code
        }
    }
}

/// Builds an engine from the configuration the way `scan` would.
fn check(dir: &Path, user_config: bool) -> Result<(), (String, ExitCode)> {
    let fail = |err: bastion_core::CoreError| (err.to_string(), exit_code_for(&err));

    let cfg: BastionConfig = load_layers(dir, user_config).map_err(fail)?;
    cfg.validate().map_err(fail)?;
    let engine = AuditEngine::from_config(&cfg).map_err(fail)?;
    if let Some(err) = engine.filter().configuration_error() {
        return Err((err.to_string(), ExitCode::ConfigError));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
