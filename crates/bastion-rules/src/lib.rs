//! Bastion Rules -- violations, the audit rule trait, and rule sets.
//!
//! A rule is anything implementing [`AuditRule`]: it has a stable id, a
//! default [`ViolationKind`], a message, and an `audit` capability that
//! inspects a [`TemplateModel`] and returns zero or more [`Violation`]s.
//! Rules are collected, in load order, into a [`RuleSet`].
//!
//! Two rule sources ship with this crate:
//!
//! - [`declarative`] -- YAML property-check rules loaded from files;
//! - [`builtin`] -- a small declarative pack compiled into the binary.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use bastion_model::TemplateModel;

pub mod builtin;
pub mod declarative;

pub use declarative::{Condition, DeclarativeError, DeclarativeRule, DeclarativeRuleLoader};

/// Id reserved for violations synthesized by the engine itself.
pub const FATAL_RULE_ID: &str = "FATAL";

// ---------------------------------------------------------------------------
// ViolationKind
// ---------------------------------------------------------------------------

/// Whether a violation fails the audit or is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Counts towards the failure count and the process exit signal.
    #[serde(rename = "FAILING", alias = "failing")]
    Failing,
    /// Reported but does not fail the audit.
    #[serde(rename = "WARNING", alias = "warning")]
    Warning,
}

impl ViolationKind {
    /// Short label used by the text renderer (`FAIL` / `WARN`).
    #[must_use]
    pub const fn short_label(self) -> &'static str {
        match self {
            Self::Failing => "FAIL",
            Self::Warning => "WARN",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Failing => "FAILING",
            Self::Warning => "WARNING",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Violation
// ---------------------------------------------------------------------------

/// A single finding produced by a rule or synthesized by the engine.
///
/// Violations are immutable once built; fields are exposed through getters.
/// `logical_resource_ids` is omitted from serialized output when empty, so a
/// resource-less violation serializes as exactly `{id, kind, message}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Violation {
    id: String,
    kind: ViolationKind,
    message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    logical_resource_ids: Vec<String>,
}

impl Violation {
    /// Creates a violation with no resource ids attached.
    pub fn new(id: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            message: message.into(),
            logical_resource_ids: Vec::new(),
        }
    }

    /// Attaches the logical ids of the offending resources.
    #[must_use]
    pub fn with_resources(mut self, logical_resource_ids: Vec<String>) -> Self {
        self.logical_resource_ids = logical_resource_ids;
        self
    }

    /// The engine-synthesized FAILING violation with id [`FATAL_RULE_ID`].
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FATAL_RULE_ID, ViolationKind::Failing, message)
    }

    /// Id of the producing rule, or `FATAL`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn logical_resource_ids(&self) -> &[String] {
        &self.logical_resource_ids
    }

    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.kind == ViolationKind::Failing
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.id == FATAL_RULE_ID
    }
}

/// Number of [`ViolationKind::Failing`] entries in `violations`.
#[must_use]
pub fn count_failures(violations: &[Violation]) -> u32 {
    count_kind(violations, ViolationKind::Failing)
}

/// Number of [`ViolationKind::Warning`] entries in `violations`.
#[must_use]
pub fn count_warnings(violations: &[Violation]) -> u32 {
    count_kind(violations, ViolationKind::Warning)
}

fn count_kind(violations: &[Violation], kind: ViolationKind) -> u32 {
    let n = violations.iter().filter(|v| v.kind == kind).count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ---------------------------------------------------------------------------
// RuleError
// ---------------------------------------------------------------------------

/// Errors a rule can raise while auditing a model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    /// The rule could not evaluate the model.
    #[error("{0}")]
    Evaluation(String),

    /// The rule panicked; carries the panic payload when it was a string.
    #[error("rule panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// AuditRule
// ---------------------------------------------------------------------------

/// A pluggable audit rule.
///
/// Rules are shared across worker threads and invoked once per audited
/// document, so implementations must be `Send + Sync` and must not carry
/// state from one call to the next.
pub trait AuditRule: Send + Sync {
    /// Stable, unique rule identifier (e.g. `W35`).
    fn id(&self) -> &str;

    /// Kind of the violations this rule produces.
    fn kind(&self) -> ViolationKind;

    /// Human-readable description used as the violation message.
    fn message(&self) -> &str;

    /// Inspects `model` and returns the rule's findings.
    ///
    /// # Errors
    ///
    /// Returns a [`RuleError`] if the rule cannot evaluate the model.
    fn audit(&self, model: &TemplateModel) -> Result<Vec<Violation>, RuleError>;

    /// Builds this rule's violation for the given resources.
    fn violation(&self, logical_resource_ids: Vec<String>) -> Violation {
        Violation::new(self.id(), self.kind(), self.message()).with_resources(logical_resource_ids)
    }
}

/// Static description of a loaded rule, used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: String,
    pub kind: ViolationKind,
    pub message: String,
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Errors raised while assembling a [`RuleSet`].
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    /// Two rules share an id.
    #[error("duplicate rule id '{0}'")]
    DuplicateId(String),

    /// A rule tried to claim the engine's reserved id.
    #[error("rule id '{FATAL_RULE_ID}' is reserved")]
    ReservedId,

    /// Loading declarative rule files failed.
    #[error(transparent)]
    Declarative(#[from] DeclarativeError),
}

/// An ordered collection of rules with unique ids.
///
/// Insertion order is execution order. Once handed to the engine the set is
/// never mutated.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn AuditRule>>,
    ids: HashSet<String>,
}

impl RuleSet {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule.
    ///
    /// # Errors
    ///
    /// Returns [`RuleSetError::DuplicateId`] if a rule with the same id is
    /// already present, or [`RuleSetError::ReservedId`] for `FATAL`.
    pub fn add(&mut self, rule: Box<dyn AuditRule>) -> Result<(), RuleSetError> {
        let id = rule.id().to_string();
        if id == FATAL_RULE_ID {
            return Err(RuleSetError::ReservedId);
        }
        if !self.ids.insert(id.clone()) {
            return Err(RuleSetError::DuplicateId(id));
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Appends every rule from `rules`, in order.
    ///
    /// # Errors
    ///
    /// Stops at the first rule that [`add`](Self::add) rejects.
    pub fn extend<I>(&mut self, rules: I) -> Result<(), RuleSetError>
    where
        I: IntoIterator<Item = Box<dyn AuditRule>>,
    {
        for rule in rules {
            self.add(rule)?;
        }
        Ok(())
    }

    /// Loads the embedded built-in pack into a fresh set.
    ///
    /// # Errors
    ///
    /// Returns an error only if the embedded definitions are invalid.
    pub fn with_builtin() -> Result<Self, RuleSetError> {
        let mut set = Self::new();
        set.extend(
            builtin::builtin_rules()?
                .into_iter()
                .map(|r| Box::new(r) as Box<dyn AuditRule>),
        )?;
        Ok(set)
    }

    /// Loads every declarative rule under `dir` and appends them.
    ///
    /// # Errors
    ///
    /// Returns loader errors or duplicate-id errors.
    pub fn load_dir(&mut self, dir: &std::path::Path) -> Result<usize, RuleSetError> {
        let loaded = DeclarativeRuleLoader.load_from_dir(dir)?;
        let count = loaded.len();
        self.extend(loaded.into_iter().map(|r| Box::new(r) as Box<dyn AuditRule>))?;
        Ok(count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Whether a rule with `id` is loaded.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Rules in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn AuditRule> {
        self.rules.iter().map(|r| &**r)
    }

    /// Rule ids in execution order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    /// Rule descriptions: warnings first, then failings, each sorted by id.
    #[must_use]
    pub fn info(&self) -> Vec<RuleInfo> {
        let mut info: Vec<RuleInfo> = self
            .rules
            .iter()
            .map(|r| RuleInfo {
                id: r.id().to_string(),
                kind: r.kind(),
                message: r.message().to_string(),
            })
            .collect();
        info.sort_by(|a, b| {
            let rank = |k: ViolationKind| u8::from(k == ViolationKind::Failing);
            rank(a.kind).cmp(&rank(b.kind)).then_with(|| a.id.cmp(&b.id))
        });
        info
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.ids())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
