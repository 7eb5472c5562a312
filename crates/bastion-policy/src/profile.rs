//! Allow-profiles.
//!
//! A profile is plain text with one rule id per line. Blank lines and lines
//! starting with `#` are ignored; trailing `# comments` are stripped. Text
//! after the id on the same line is a free-form description.
//!
//! ```text
//! # production profile
//! F1 EBS volume encryption
//! F26   # databases
//! W2
//! ```
//!
//! A profile must list at least one id.

use std::collections::BTreeSet;

use bastion_rules::RuleSet;
use tracing::trace;

use crate::{DefinitionKind, FilterError};

/// The set of rule ids whose violations may be reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    rule_ids: BTreeSet<String>,
}

impl Profile {
    /// Builds a profile from ids without validating them against a rule set.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses profile text and checks every id against `rules`.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::UnknownRule`] for the first id that is not
    /// loaded, or [`FilterError::Syntax`] when the text lists no ids.
    pub fn parse(text: &str, rules: &RuleSet) -> Result<Self, FilterError> {
        let mut rule_ids = BTreeSet::new();

        for (index, line) in text.lines().enumerate() {
            let content = line.split('#').next().unwrap_or_default();
            let Some(rule_id) = content.split_whitespace().next() else {
                continue;
            };
            if !rules.contains(rule_id) {
                return Err(FilterError::UnknownRule {
                    definition: DefinitionKind::Profile,
                    rule_id: rule_id.to_string(),
                    legal: rules.ids().join(", "),
                });
            }
            trace!(line = index + 1, rule_id, "profile entry");
            rule_ids.insert(rule_id.to_string());
        }

        if rule_ids.is_empty() {
            return Err(FilterError::Syntax {
                definition: DefinitionKind::Profile,
                message: "profile lists no rule ids".to_string(),
            });
        }
        Ok(Self { rule_ids })
    }

    /// Whether violations from `rule_id` survive this profile.
    #[must_use]
    pub fn allows(&self, rule_id: &str) -> bool {
        self.rule_ids.contains(rule_id)
    }

    /// Allowed ids in sorted order.
    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.rule_ids.iter().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rule_ids.is_empty()
    }
}
