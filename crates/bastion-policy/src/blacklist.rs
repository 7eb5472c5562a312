//! Deny-blacklists.
//!
//! A blacklist is a YAML document listing rules to suppress:
//!
//! ```yaml
//! RulesToSuppress:
//!   - id: W35
//!     reason: access logs are shipped by the platform team
//!   - id: W41
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use bastion_rules::RuleSet;

use crate::{DefinitionKind, FilterError};

/// One suppressed rule and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suppression {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BlacklistFile {
    #[serde(rename = "RulesToSuppress")]
    rules_to_suppress: Vec<Suppression>,
}

/// The set of rule ids whose violations are always dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    suppressions: Vec<Suppression>,
    rule_ids: BTreeSet<String>,
}

impl Blacklist {
    /// Builds a blacklist from ids without validating them against a rule set.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let suppressions: Vec<Suppression> = ids
            .into_iter()
            .map(|id| Suppression {
                id: id.into(),
                reason: None,
            })
            .collect();
        let rule_ids = suppressions.iter().map(|s| s.id.clone()).collect();
        Self {
            suppressions,
            rule_ids,
        }
    }

    /// Parses blacklist YAML and checks every id against `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Syntax`] if the YAML is malformed or lacks a
    /// `RulesToSuppress` list, or [`FilterError::UnknownRule`] for an id
    /// that is not loaded.
    pub fn parse(text: &str, rules: &RuleSet) -> Result<Self, FilterError> {
        let file: BlacklistFile = serde_yml::from_str(text).map_err(|e| FilterError::Syntax {
            definition: DefinitionKind::Blacklist,
            message: e.to_string(),
        })?;

        if let Some(unknown) = file
            .rules_to_suppress
            .iter()
            .find(|s| !rules.contains(&s.id))
        {
            return Err(FilterError::UnknownRule {
                definition: DefinitionKind::Blacklist,
                rule_id: unknown.id.clone(),
                legal: rules.ids().join(", "),
            });
        }

        let rule_ids = file
            .rules_to_suppress
            .iter()
            .map(|s| s.id.clone())
            .collect();
        Ok(Self {
            suppressions: file.rules_to_suppress,
            rule_ids,
        })
    }

    /// Whether violations from `rule_id` are suppressed.
    #[must_use]
    pub fn suppresses(&self, rule_id: &str) -> bool {
        self.rule_ids.contains(rule_id)
    }

    /// The recorded reason for suppressing `rule_id`, if any.
    #[must_use]
    pub fn reason(&self, rule_id: &str) -> Option<&str> {
        self.suppressions
            .iter()
            .find(|s| s.id == rule_id)
            .and_then(|s| s.reason.as_deref())
    }

    /// Entries in definition order.
    #[must_use]
    pub fn suppressions(&self) -> &[Suppression] {
        &self.suppressions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLACKLIST: &str = r#"
RulesToSuppress:
  - id: W35
    reason: access logs are shipped by the platform team
  - id: W41
"#;

    #[test]
    fn parses_entries_and_reasons() {
        let rules = RuleSet::with_builtin().unwrap();
        let blacklist = Blacklist::parse(BLACKLIST, &rules).unwrap();

        assert_eq!(blacklist.suppressions().len(), 2);
        assert!(blacklist.suppresses("W35"));
        assert!(blacklist.suppresses("W41"));
        assert!(!blacklist.suppresses("F1"));
        assert_eq!(
            blacklist.reason("W35"),
            Some("access logs are shipped by the platform team")
        );
        assert_eq!(blacklist.reason("W41"), None);
    }

    #[test]
    fn malformed_yaml_is_syntax_error() {
        let rules = RuleSet::with_builtin().unwrap();
        let err = Blacklist::parse("RulesToSuppress: [unclosed", &rules).unwrap_err();
        assert!(matches!(
            err,
            FilterError::Syntax { definition: DefinitionKind::Blacklist, .. }
        ));
    }

    #[test]
    fn wrong_shape_is_syntax_error() {
        let rules = RuleSet::with_builtin().unwrap();
        let err = Blacklist::parse("- W35\n- W41\n", &rules).unwrap_err();
        assert!(err.to_string().starts_with("blacklist parse error"));
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let rules = RuleSet::with_builtin().unwrap();
        let err = Blacklist::parse("RulesToSuppress:\n  - id: Z1\n", &rules).unwrap_err();
        assert!(err.to_string().contains("Z1 is not a legal rule identifier"));
    }

    #[test]
    fn from_ids_builds_unvalidated_blacklist() {
        let blacklist = Blacklist::from_ids(["W1"]);
        assert!(blacklist.suppresses("W1"));
        assert_eq!(blacklist.suppressions()[0].reason, None);
    }
}
