//! The `scan` CLI subcommand -- audits templates and writes a report.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use bastion_core::scanner::template_pattern;
use bastion_core::AuditEngine;
use bastion_report::{render_and_audit_with, AuditRequest, RendererRegistry};

use super::{load_validated_config, project_dir, report, RuleSourceArgs};
use crate::ExitCode;

// ---------------------------------------------------------------------------
// ScanArgs
// ---------------------------------------------------------------------------

/// Audit a template file or a directory of templates.
#[derive(Debug, clap::Args)]
pub struct ScanArgs {
    /// Template file or directory to audit.
    pub input: PathBuf,

    /// JSON file of parameter overrides applied to every template.
    #[arg(long, short)]
    pub parameters: Option<PathBuf>,

    /// Regex matched against file names when scanning a directory.
    #[arg(long)]
    pub pattern: Option<String>,

    /// Output format: txt or json. Defaults to `reporting.default_format`.
    #[arg(long, short)]
    pub format: Option<String>,

    /// Profile file listing the rule ids to report.
    #[arg(long)]
    pub profile: Option<PathBuf>,

    /// Blacklist file of rule ids to suppress.
    #[arg(long)]
    pub blacklist: Option<PathBuf>,

    #[command(flatten)]
    pub rules: RuleSourceArgs,

    /// Report a rule that errors as a failing violation under its own id
    /// and keep auditing.
    #[arg(long)]
    pub isolate_rule_exceptions: bool,

    /// Number of parallel jobs.
    #[arg(long, short)]
    pub jobs: Option<usize>,

    /// Ignore `~/.bastion.yaml` and read only the project configuration.
    #[arg(long)]
    pub no_user_config: bool,

    /// Write the report to this file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(long, short)]
    pub verbose: bool,

    /// Suppress all non-essential output.
    #[arg(long, short)]
    pub quiet: bool,

    /// Emit log lines as JSON.
    #[arg(long)]
    pub log_json: bool,
}

// ---------------------------------------------------------------------------
// execute
// ---------------------------------------------------------------------------

/// Executes the `scan` subcommand.
///
/// Returns [`ExitCode::Failures`] when the report contains at least one
/// failing violation and [`ExitCode::ConfigError`] when configuration, rules,
/// or the output format are unusable.
pub fn execute(args: ScanArgs) -> Result<ExitCode, anyhow::Error> {
    // Ignore the error if the subscriber is already set (e.g. in tests).
    let _ = bastion_core::init_tracing(args.verbose, args.quiet, args.log_json);

    let dir = project_dir(&args.input);
    let config = match load_validated_config(&dir, !args.no_user_config, |config| {
        if let Some(pattern) = &args.pattern {
            config.audit.template_pattern.clone_from(pattern);
        }
        if args.jobs.is_some() {
            config.audit.jobs = args.jobs;
        }
        if args.isolate_rule_exceptions {
            config.audit.isolate_rule_exceptions = true;
        }
        if args.profile.is_some() {
            config.filters.profile.clone_from(&args.profile);
        }
        if args.blacklist.is_some() {
            config.filters.blacklist.clone_from(&args.blacklist);
        }
        args.rules.apply(&mut config.rules);
    }) {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };

    let format = args
        .format
        .clone()
        .unwrap_or_else(|| config.reporting.default_format.clone());
    let registry = RendererRegistry::default();
    if let Err(err) = registry.resolve(&format) {
        eprintln!("bastion: error: {err}");
        return Ok(ExitCode::ConfigError);
    }

    let engine = match AuditEngine::from_config(&config) {
        Ok(engine) => engine,
        Err(err) => return Ok(report(err)),
    };
    info!(rules = engine.rules().len(), format = %format, "engine ready");

    let pattern = template_pattern(&config.audit.template_pattern)?;
    let mut request = AuditRequest::new(&args.input)?.with_pattern(pattern);
    if let Some(parameters) = &args.parameters {
        request = request.with_parameters(parameters);
    }

    let spinner = spinner(args.quiet || args.output.is_none());
    spinner.set_message(format!("Auditing {}...", args.input.display()));

    let outcome = match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create output directory {}", parent.display())
                    })?;
                }
            }
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            render_and_audit_with(&registry, &engine, &request, &format, &mut writer)
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            let outcome = render_and_audit_with(&registry, &engine, &request, &format, &mut writer);
            let _ = writer.flush();
            outcome
        }
    };

    let failures = match outcome {
        Ok(failures) => failures,
        Err(err) => {
            spinner.finish_and_clear();
            return Err(err).context("audit failed");
        }
    };

    spinner.finish_with_message(format!("Audit complete: {failures} failure(s)"));
    if let Some(path) = &args.output {
        info!(path = %path.display(), "report written");
    }

    Ok(ExitCode::from_failure_count(failures))
}

/// A stderr spinner, or a hidden bar when progress would interleave with
/// the report or the user asked for quiet output.
fn spinner(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"]));
    }
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}
