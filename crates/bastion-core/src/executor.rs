//! Rule execution.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use bastion_model::TemplateModel;
use bastion_rules::{AuditRule, RuleError, RuleSet, Violation, ViolationKind};

/// A rule failed while auditing and rule isolation was off.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rule {rule_id} failed: {message}")]
pub struct RuleExecutionError {
    pub rule_id: String,
    pub message: String,
}

/// Runs every rule of a [`RuleSet`] against one model.
///
/// Findings are concatenated in rule order, then in the order each rule
/// returned them. Panics inside a rule are caught and handled like a
/// [`RuleError`].
#[derive(Debug, Clone, Copy)]
pub struct RuleExecutor<'a> {
    rules: &'a RuleSet,
    isolate_rule_exceptions: bool,
}

impl<'a> RuleExecutor<'a> {
    #[must_use]
    pub fn new(rules: &'a RuleSet, isolate_rule_exceptions: bool) -> Self {
        Self {
            rules,
            isolate_rule_exceptions,
        }
    }

    /// Audits `model` with every rule.
    ///
    /// With isolation on, a failing rule contributes one FAILING violation
    /// carrying its id and the error text, and the remaining rules still run.
    ///
    /// # Errors
    ///
    /// With isolation off, returns the first rule failure.
    pub fn execute(&self, model: &TemplateModel) -> Result<Vec<Violation>, RuleExecutionError> {
        let mut violations = Vec::new();

        for rule in self.rules.iter() {
            match run_rule(rule, model) {
                Ok(found) => {
                    if !found.is_empty() {
                        debug!(rule_id = rule.id(), count = found.len(), "rule produced violations");
                    }
                    violations.extend(found);
                }
                Err(err) if self.isolate_rule_exceptions => {
                    warn!(rule_id = rule.id(), error = %err, "rule failed; recorded as a violation");
                    violations.push(Violation::new(
                        rule.id(),
                        ViolationKind::Failing,
                        err.to_string(),
                    ));
                }
                Err(err) => {
                    return Err(RuleExecutionError {
                        rule_id: rule.id().to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(violations)
    }
}

fn run_rule(rule: &dyn AuditRule, model: &TemplateModel) -> Result<Vec<Violation>, RuleError> {
    match panic::catch_unwind(AssertUnwindSafe(|| rule.audit(model))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(RuleError::Panicked(message))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bastion_model::{ModelParser, TemplateParser};

    /// Test rule with a scripted outcome.
    pub(crate) enum Scripted {
        Emit(&'static str, ViolationKind),
        Fail(&'static str, &'static str),
        Panic(&'static str, &'static str),
    }

    impl AuditRule for Scripted {
        fn id(&self) -> &str {
            match self {
                Self::Emit(id, _) | Self::Fail(id, _) | Self::Panic(id, _) => id,
            }
        }

        fn kind(&self) -> ViolationKind {
            match self {
                Self::Emit(_, kind) => *kind,
                _ => ViolationKind::Failing,
            }
        }

        fn message(&self) -> &str {
            "scripted rule"
        }

        fn audit(&self, _model: &TemplateModel) -> Result<Vec<Violation>, RuleError> {
            match self {
                Self::Emit(..) => Ok(vec![self.violation(vec!["R1".into()])]),
                Self::Fail(_, message) => Err(RuleError::Evaluation((*message).to_string())),
                Self::Panic(_, message) => panic!("{message}"),
            }
        }
    }

    pub(crate) fn rule_set(rules: Vec<Scripted>) -> RuleSet {
        let mut set = RuleSet::new();
        set.extend(rules.into_iter().map(|r| Box::new(r) as Box<dyn AuditRule>))
            .unwrap();
        set
    }

    fn model() -> TemplateModel {
        TemplateParser
            .parse(r#"{"Resources": {"R1": {"Type": "AWS::S3::Bucket"}}}"#, None)
            .unwrap()
    }

    fn ids(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(Violation::id).collect()
    }

    #[test]
    fn concatenates_in_rule_order() {
        let rules = rule_set(vec![
            Scripted::Emit("W2", ViolationKind::Warning),
            Scripted::Emit("F1", ViolationKind::Failing),
            Scripted::Emit("W1", ViolationKind::Warning),
        ]);
        let out = RuleExecutor::new(&rules, false).execute(&model()).unwrap();
        assert_eq!(ids(&out), vec!["W2", "F1", "W1"]);
        assert_eq!(out[0].logical_resource_ids(), ["R1".to_string()]);
    }

    #[test]
    fn empty_rule_set_yields_nothing() {
        let rules = RuleSet::new();
        assert!(RuleExecutor::new(&rules, false).execute(&model()).unwrap().is_empty());
    }

    #[test]
    fn failure_without_isolation_stops_execution() {
        let rules = rule_set(vec![
            Scripted::Emit("W1", ViolationKind::Warning),
            Scripted::Fail("F9", "boom"),
            Scripted::Emit("W2", ViolationKind::Warning),
        ]);
        let err = RuleExecutor::new(&rules, false).execute(&model()).unwrap_err();
        assert_eq!(
            err,
            RuleExecutionError {
                rule_id: "F9".into(),
                message: "boom".into()
            }
        );
        assert_eq!(err.to_string(), "rule F9 failed: boom");
    }

    #[test]
    fn failure_with_isolation_becomes_violation() {
        let rules = rule_set(vec![
            Scripted::Fail("W9", "cannot evaluate"),
            Scripted::Emit("W1", ViolationKind::Warning),
        ]);
        let out = RuleExecutor::new(&rules, true).execute(&model()).unwrap();

        assert_eq!(ids(&out), vec!["W9", "W1"]);
        assert_eq!(out[0].kind(), ViolationKind::Failing);
        assert_eq!(out[0].message(), "cannot evaluate");
    }

    #[test]
    fn panic_is_caught_and_isolated() {
        let rules = rule_set(vec![
            Scripted::Panic("F7", "index out of range"),
            Scripted::Emit("W1", ViolationKind::Warning),
        ]);
        let out = RuleExecutor::new(&rules, true).execute(&model()).unwrap();

        assert_eq!(ids(&out), vec!["F7", "W1"]);
        assert_eq!(out[0].message(), "rule panicked: index out of range");
    }

    #[test]
    fn panic_without_isolation_is_an_error() {
        let rules = rule_set(vec![Scripted::Panic("F7", "kaboom")]);
        let err = RuleExecutor::new(&rules, false).execute(&model()).unwrap_err();
        assert_eq!(err.message, "rule panicked: kaboom");
    }
}
