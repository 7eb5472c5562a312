//! The `rules` CLI subcommand -- lists the rules an audit would run.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;

use bastion_core::load_rules;
use bastion_rules::{RuleInfo, ViolationKind};

use super::{load_validated_config, report, RuleSourceArgs};
use crate::ExitCode;

/// List the loaded audit rules, warnings first.
#[derive(Debug, clap::Args)]
pub struct RulesArgs {
    /// Output format: txt or json.
    #[arg(long, short, default_value = "txt")]
    pub format: String,

    /// Directory whose `.bastion.yaml` supplies the rule sources.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    #[command(flatten)]
    pub rules: RuleSourceArgs,

    /// Ignore `~/.bastion.yaml` and read only the project configuration.
    #[arg(long)]
    pub no_user_config: bool,
}

/// Executes the `rules` subcommand.
pub fn execute(args: RulesArgs) -> Result<ExitCode, anyhow::Error> {
    let config = match load_validated_config(&args.dir, !args.no_user_config, |config| {
        args.rules.apply(&mut config.rules);
    }) {
        Ok(config) => config,
        Err(code) => return Ok(code),
    };
    let rules = match load_rules(&config.rules) {
        Ok(rules) => rules,
        Err(err) => return Ok(report(err)),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.format.as_str() {
        "txt" => write_txt(&rules.info(), &mut out)?,
        "json" => {
            serde_json::to_writer_pretty(&mut out, &rules.info())
                .context("failed to serialize rule listing")?;
            writeln!(out)?;
        }
        other => {
            eprintln!("bastion: error: unknown rule listing format '{other}' (available: json, txt)");
            return Ok(ExitCode::ConfigError);
        }
    }
    out.flush()?;
    Ok(ExitCode::Pass)
}

/// Writes `info` as two sections. `info` is expected warnings first.
pub fn write_txt(info: &[RuleInfo], out: &mut dyn Write) -> io::Result<()> {
    for (heading, kind) in [
        ("WARNING VIOLATIONS:", ViolationKind::Warning),
        ("FAILING VIOLATIONS:", ViolationKind::Failing),
    ] {
        writeln!(out, "{heading}")?;
        for rule in info.iter().filter(|r| r.kind == kind) {
            writeln!(out, "{} {}", rule.id, rule.message)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_rules::RuleSet;

    #[test]
    fn txt_listing_groups_by_kind() {
        let info = vec![
            RuleInfo {
                id: "W2".into(),
                kind: ViolationKind::Warning,
                message: "open ingress".into(),
            },
            RuleInfo {
                id: "F1".into(),
                kind: ViolationKind::Failing,
                message: "unencrypted volume".into(),
            },
        ];
        let mut out = Vec::new();
        write_txt(&info, &mut out).unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "WARNING VIOLATIONS:\nW2 open ingress\n\nFAILING VIOLATIONS:\nF1 unencrypted volume\n\n"
        );
    }

    #[test]
    fn builtin_listing_names_every_rule() {
        let rules = RuleSet::with_builtin().unwrap();
        let mut out = Vec::new();
        write_txt(&rules.info(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        for id in rules.ids() {
            assert!(text.contains(id), "listing is missing {id}");
        }
        assert!(text.find("WARNING VIOLATIONS:") < text.find("FAILING VIOLATIONS:"));
    }

    #[test]
    fn unknown_format_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let code = execute(RulesArgs {
            format: "xml".into(),
            dir: tmp.path().to_path_buf(),
            rules: RuleSourceArgs::default(),
            no_user_config: true,
        })
        .unwrap();
        assert_eq!(code, ExitCode::ConfigError);
    }

    #[test]
    fn missing_rules_dir_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let code = execute(RulesArgs {
            format: "txt".into(),
            dir: tmp.path().to_path_buf(),
            rules: RuleSourceArgs {
                rules_dirs: vec![tmp.path().join("no-such-rules")],
                no_builtin: false,
            },
            no_user_config: true,
        })
        .unwrap();
        assert_eq!(code, ExitCode::ConfigError);
    }
}
