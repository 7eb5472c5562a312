//! Single-document audit pipeline.
//!
//! The [`AuditEngine`] runs one document through:
//!
//! 1. **Parse** the document and apply parameter overrides.
//! 2. **Execute** every loaded rule against the model.
//! 3. **Filter** the findings through the profile and blacklist.
//! 4. **Summarize** them as a [`FileAuditResult`].
//!
//! Parse failures and filter misconfiguration never escape: each becomes a
//! single FATAL violation. Rule failures escape only when rule isolation is
//! off.
//!
//! # Example
//!
//! ```no_run
//! use bastion_core::{AuditEngine, EngineOptions};
//! use bastion_policy::ViolationFilter;
//! use bastion_rules::RuleSet;
//!
//! let rules = RuleSet::with_builtin().unwrap();
//! let engine = AuditEngine::new(rules, ViolationFilter::unrestricted(), EngineOptions::default());
//! let template = r#"{"Resources": {"Disk": {"Type": "AWS::EC2::Volume"}}}"#;
//! let result = engine.audit(template, None).unwrap();
//! println!("{} failing violations", result.failure_count());
//! ```

use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use bastion_model::{ModelParser, TemplateParser};
use bastion_policy::ViolationFilter;
use bastion_rules::{count_failures, count_warnings, RuleSet, Violation};

use crate::config::{AuditConfig, BastionConfig, RulesConfig};
use crate::executor::{RuleExecutionError, RuleExecutor};
use crate::CoreError;

// ---------------------------------------------------------------------------
// FileAuditResult
// ---------------------------------------------------------------------------

/// Outcome of auditing one document.
///
/// `failure_count` is derived from `violations` when the value is built and
/// cannot be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAuditResult {
    failure_count: u32,
    violations: Vec<Violation>,
}

impl FileAuditResult {
    #[must_use]
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            failure_count: count_failures(&violations),
            violations,
        }
    }

    /// A result holding only a FATAL violation with `message`.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::from_violations(vec![Violation::fatal(message)])
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn warning_count(&self) -> u32 {
        count_warnings(&self.violations)
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }
}

// ---------------------------------------------------------------------------
// EngineOptions
// ---------------------------------------------------------------------------

/// Engine behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Record rule failures as violations instead of failing the audit.
    pub isolate_rule_exceptions: bool,
    /// Worker threads for aggregate audits; `None` lets rayon decide.
    pub jobs: Option<usize>,
}

impl From<&AuditConfig> for EngineOptions {
    fn from(config: &AuditConfig) -> Self {
        Self {
            isolate_rule_exceptions: config.isolate_rule_exceptions,
            jobs: config.jobs,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEngine
// ---------------------------------------------------------------------------

/// Parser, rules, filter, and options, fixed at construction.
///
/// The engine is immutable and `Send + Sync`; aggregate audits share one
/// engine across worker threads.
pub struct AuditEngine {
    parser: Box<dyn ModelParser>,
    rules: RuleSet,
    filter: ViolationFilter,
    options: EngineOptions,
}

impl AuditEngine {
    /// Creates an engine using the default [`TemplateParser`].
    #[must_use]
    pub fn new(rules: RuleSet, filter: ViolationFilter, options: EngineOptions) -> Self {
        Self::with_parser(Box::new(TemplateParser), rules, filter, options)
    }

    /// Creates an engine with a custom document parser.
    #[must_use]
    pub fn with_parser(
        parser: Box<dyn ModelParser>,
        rules: RuleSet,
        filter: ViolationFilter,
        options: EngineOptions,
    ) -> Self {
        Self {
            parser,
            rules,
            filter,
            options,
        }
    }

    /// Builds an engine from resolved configuration.
    ///
    /// Loads rules with [`load_rules`], then reads the profile and blacklist
    /// files. Errors in their *content* are left to the filter and surface as
    /// FATAL violations during audits.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::RuleLoad`] if rules cannot be loaded, or
    /// [`CoreError::Config`] if a profile or blacklist file cannot be read.
    pub fn from_config(config: &BastionConfig) -> Result<Self, CoreError> {
        let rules = load_rules(&config.rules)?;

        let profile = read_definition("profile", config.filters.profile.as_deref())?;
        let blacklist = read_definition("blacklist", config.filters.blacklist.as_deref())?;
        let filter =
            ViolationFilter::from_definitions(profile.as_deref(), blacklist.as_deref(), &rules);

        Ok(Self::new(rules, filter, EngineOptions::from(&config.audit)))
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub fn filter(&self) -> &ViolationFilter {
        &self.filter
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Audits one document.
    ///
    /// A document or parameter parse error yields a result holding exactly
    /// one FATAL violation, and no rules run.
    ///
    /// # Errors
    ///
    /// Returns [`RuleExecutionError`] only when a rule fails and rule
    /// isolation is off.
    pub fn audit(
        &self,
        document: &str,
        parameter_overrides: Option<&str>,
    ) -> Result<FileAuditResult, RuleExecutionError> {
        let model = match self.parser.parse(document, parameter_overrides) {
            Ok(model) => model,
            Err(err) => {
                warn!(error = %err, "template could not be parsed");
                return Ok(FileAuditResult::fatal(err.to_string()));
            }
        };
        debug!(resources = model.resource_count(), "template parsed");

        let violations =
            RuleExecutor::new(&self.rules, self.options.isolate_rule_exceptions).execute(&model)?;
        let result = FileAuditResult::from_violations(self.filter.apply(violations));

        debug!(
            failures = result.failure_count(),
            violations = result.violations().len(),
            "template audited"
        );
        Ok(result)
    }
}

impl fmt::Debug for AuditEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditEngine")
            .field("rules", &self.rules)
            .field("filter", &self.filter)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Assembles the rule set: the built-in pack when enabled, then each rule
/// directory in order.
///
/// # Errors
///
/// Returns [`CoreError::RuleLoad`] if a directory cannot be loaded or two
/// rules share an id.
pub fn load_rules(config: &RulesConfig) -> Result<RuleSet, CoreError> {
    let mut rules = if config.builtin {
        RuleSet::with_builtin()?
    } else {
        RuleSet::new()
    };
    for dir in &config.directories {
        let count = rules.load_dir(dir)?;
        info!(count, dir = %dir.display(), "loaded declarative rules");
    }
    info!(rules = rules.len(), "rule set ready");
    Ok(rules)
}

fn read_definition(kind: &str, path: Option<&Path>) -> Result<Option<String>, CoreError> {
    path.map(|path| {
        std::fs::read_to_string(path).map_err(|e| {
            CoreError::Config(format!("failed to read {kind} file '{}': {e}", path.display()))
        })
    })
    .transpose()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::tests::{rule_set, Scripted};
    use bastion_model::{ParseError, ParseResult, TemplateModel};
    use bastion_policy::{Blacklist, Profile};
    use bastion_rules::{ViolationKind, FATAL_RULE_ID};

    const BUCKET: &str = r#"{"Resources": {"Bucket": {"Type": "AWS::S3::Bucket"}}}"#;

    fn scripted_engine(filter: ViolationFilter, isolate: bool) -> AuditEngine {
        let rules = rule_set(vec![
            Scripted::Emit("W1", ViolationKind::Warning),
            Scripted::Emit("W2", ViolationKind::Warning),
            Scripted::Emit("F1", ViolationKind::Failing),
        ]);
        AuditEngine::new(
            rules,
            filter,
            EngineOptions {
                isolate_rule_exceptions: isolate,
                jobs: None,
            },
        )
    }

    fn ids(result: &FileAuditResult) -> Vec<&str> {
        result.violations().iter().map(Violation::id).collect()
    }

    #[test]
    fn audit_runs_rules_and_counts_failures() {
        let engine = scripted_engine(ViolationFilter::unrestricted(), false);
        let result = engine.audit(BUCKET, None).unwrap();

        assert_eq!(ids(&result), vec!["W1", "W2", "F1"]);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.warning_count(), 2);
    }

    #[test]
    fn profile_keeps_single_warning() {
        let filter = ViolationFilter::new(Some(Profile::from_ids(["W1"])), None);
        let result = scripted_engine(filter, false).audit(BUCKET, None).unwrap();

        assert_eq!(ids(&result), vec!["W1"]);
        assert_eq!(result.failure_count(), 0);
    }

    #[test]
    fn blacklist_beats_profile() {
        let filter = ViolationFilter::new(
            Some(Profile::from_ids(["W1", "W2"])),
            Some(Blacklist::from_ids(["W2"])),
        );
        let result = scripted_engine(filter, false).audit(BUCKET, None).unwrap();
        assert_eq!(ids(&result), vec!["W1"]);
    }

    #[test]
    fn invalid_json_is_single_fatal() {
        let engine = scripted_engine(ViolationFilter::unrestricted(), false);
        let result = engine.audit(r#"{"Resources": "#, None).unwrap();

        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.violations().len(), 1);
        let fatal = &result.violations()[0];
        assert_eq!(fatal.id(), FATAL_RULE_ID);
        assert_eq!(fatal.kind(), ViolationKind::Failing);
        assert!(!fatal.message().is_empty());
    }

    #[test]
    fn invalid_yaml_is_single_fatal() {
        let engine = scripted_engine(ViolationFilter::unrestricted(), false);
        let result = engine.audit("Resources:\n  Bucket: [unclosed\n", None).unwrap();
        assert_eq!(ids(&result), vec![FATAL_RULE_ID]);
        assert_eq!(result.failure_count(), 1);
    }

    #[test]
    fn bad_parameters_are_single_fatal() {
        let engine = scripted_engine(ViolationFilter::unrestricted(), false);
        let result = engine.audit(BUCKET, Some("{not json")).unwrap();

        assert_eq!(ids(&result), vec![FATAL_RULE_ID]);
        assert!(result.violations()[0]
            .message()
            .starts_with("JSON Parameter values parse error:"));
    }

    #[test]
    fn parse_errors_skip_the_filter() {
        let filter = ViolationFilter::new(Some(Profile::from_ids(["W1"])), None);
        let result = scripted_engine(filter, false).audit("{", None).unwrap();
        assert_eq!(ids(&result), vec![FATAL_RULE_ID]);
    }

    #[test]
    fn misconfigured_filter_returns_unfiltered_plus_fatal() {
        let rules = RuleSet::with_builtin().unwrap();
        let filter = ViolationFilter::from_definitions(Some("NOT_A_RULE\n"), None, &rules);
        let engine = AuditEngine::new(rules, filter, EngineOptions::default());

        let result = engine.audit(BUCKET, None).unwrap();
        assert_eq!(ids(&result), vec!["W35", "W41", FATAL_RULE_ID]);
        assert_eq!(result.failure_count(), 1);
    }

    #[test]
    fn rule_failure_without_isolation_is_an_error() {
        let rules = rule_set(vec![Scripted::Fail("F9", "no model")]);
        let engine = AuditEngine::new(rules, ViolationFilter::unrestricted(), EngineOptions::default());

        let err = engine.audit(BUCKET, None).unwrap_err();
        assert_eq!(err.rule_id, "F9");
    }

    #[test]
    fn rule_failure_with_isolation_is_filtered_like_any_violation() {
        let rules = rule_set(vec![
            Scripted::Fail("F9", "no model"),
            Scripted::Emit("W1", ViolationKind::Warning),
        ]);
        let options = EngineOptions {
            isolate_rule_exceptions: true,
            jobs: None,
        };
        let filter = ViolationFilter::new(None, Some(Blacklist::from_ids(["F9"])));
        let engine = AuditEngine::new(rules, filter, options);

        let result = engine.audit(BUCKET, None).unwrap();
        assert_eq!(ids(&result), vec!["W1"]);
    }

    #[test]
    fn builtin_rules_flag_unencrypted_resources() {
        let engine = AuditEngine::new(
            RuleSet::with_builtin().unwrap(),
            ViolationFilter::unrestricted(),
            EngineOptions::default(),
        );
        let yaml = r#"
Parameters:
  Encrypt:
    Type: String
    Default: "false"
Resources:
  Volume:
    Type: AWS::EC2::Volume
    Properties:
      Encrypted: !Ref Encrypt
"#;
        let result = engine.audit(yaml, None).unwrap();
        assert_eq!(ids(&result), vec!["F1"]);
        assert_eq!(result.violations()[0].logical_resource_ids(), ["Volume".to_string()]);

        let fixed = engine
            .audit(yaml, Some(r#"{"Parameters": {"Encrypt": "true"}}"#))
            .unwrap();
        assert!(fixed.violations().is_empty());
    }

    #[test]
    fn custom_parser_is_used() {
        struct Refusing;
        impl ModelParser for Refusing {
            fn parse(&self, _: &str, _: Option<&str>) -> ParseResult<TemplateModel> {
                Err(ParseError::Syntax("refused".into()))
            }
        }

        let engine = AuditEngine::with_parser(
            Box::new(Refusing),
            RuleSet::new(),
            ViolationFilter::unrestricted(),
            EngineOptions::default(),
        );
        let result = engine.audit(BUCKET, None).unwrap();
        assert_eq!(result.violations()[0].message(), "refused");
    }

    #[test]
    fn failure_count_matches_violations() {
        let result = FileAuditResult::from_violations(vec![
            Violation::new("F1", ViolationKind::Failing, "a"),
            Violation::new("W1", ViolationKind::Warning, "b"),
            Violation::fatal("c"),
        ]);
        assert_eq!(result.failure_count(), 2);
        assert_eq!(result.warning_count(), 1);
    }

    #[test]
    fn from_config_reads_filter_files() {
        let tmp = tempfile::tempdir().unwrap();
        let profile = tmp.path().join("profile.txt");
        std::fs::write(&profile, "W35\n").unwrap();

        let mut config = BastionConfig::default();
        config.filters.profile = Some(profile);
        let engine = AuditEngine::from_config(&config).unwrap();

        let result = engine.audit(BUCKET, None).unwrap();
        assert_eq!(ids(&result), vec!["W35"]);
    }

    #[test]
    fn from_config_missing_filter_file_is_config_error() {
        let mut config = BastionConfig::default();
        config.filters.blacklist = Some("/nonexistent/blacklist.yaml".into());
        assert!(matches!(
            AuditEngine::from_config(&config),
            Err(CoreError::Config(msg)) if msg.contains("blacklist")
        ));
    }

    #[test]
    fn from_config_without_builtin_loads_directories() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("c1.yaml"),
            "id: C1\nkind: failing\nmessage: buckets must be versioned\n\
             resource_type: AWS::S3::Bucket\nproperty: VersioningConfiguration\ncondition: missing\n",
        )
        .unwrap();

        let mut config = BastionConfig::default();
        config.rules.builtin = false;
        config.rules.directories = vec![tmp.path().to_path_buf()];
        let engine = AuditEngine::from_config(&config).unwrap();

        assert_eq!(engine.rules().ids(), vec!["C1"]);
        assert_eq!(engine.audit(BUCKET, None).unwrap().failure_count(), 1);
    }
}
