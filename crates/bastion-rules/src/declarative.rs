//! Declarative YAML rule loader.
//!
//! A declarative rule checks one property of every resource of a given
//! type. Each YAML file describes exactly one rule:
//!
//! ```yaml
//! id: W35
//! kind: warning
//! message: S3 Bucket should have access logging configured
//! resource_type: AWS::S3::Bucket
//! property: LoggingConfiguration
//! condition: missing
//! ```
//!
//! `property` is a dotted path into the resource's `Properties`; a `*`
//! segment iterates every element of a sequence (or every value of a
//! mapping). `condition` is one of:
//!
//! | condition    | fires when                                         |
//! |--------------|----------------------------------------------------|
//! | `missing`    | nothing exists at the path                         |
//! | `present`    | something exists at the path                       |
//! | `equals`     | some value at the path equals `value`              |
//! | `not_equals` | no value at the path equals `value` (absent fires) |
//!
//! A rule produces at most one violation per audit, listing the logical
//! ids of every offending resource.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};
use walkdir::WalkDir;

use bastion_model::TemplateModel;

use crate::{AuditRule, RuleError, Violation, ViolationKind, FATAL_RULE_ID};

// ---------------------------------------------------------------------------
// DeclarativeError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading declarative YAML rule files.
#[derive(Debug, thiserror::Error)]
pub enum DeclarativeError {
    /// An I/O error occurred while reading a rule file.
    #[error("I/O error reading rule file '{}': {source}", path.display())]
    IoError {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The YAML content could not be parsed.
    #[error("YAML parse error in '{}': {source}", path.display())]
    YamlParseError {
        /// The path that contained invalid YAML.
        path: PathBuf,
        /// The underlying YAML parsing error.
        source: serde_yml::Error,
    },

    /// A parsed rule failed validation.
    #[error("validation error in '{}': {message}", path.display())]
    ValidationError {
        /// The file containing the invalid rule.
        path: PathBuf,
        /// What was wrong with it.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// The check a declarative rule applies to the values found at its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Fires when the path resolves to nothing.
    Missing,
    /// Fires when the path resolves to at least one value.
    Present,
    /// Fires when some resolved value equals the expected value.
    Equals,
    /// Fires when no resolved value equals the expected value.
    NotEquals,
}

impl Condition {
    fn needs_value(self) -> bool {
        matches!(self, Self::Equals | Self::NotEquals)
    }
}

// ---------------------------------------------------------------------------
// DeclarativeRuleFile (intermediate deserialization struct)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeclarativeRuleFile {
    id: String,
    kind: ViolationKind,
    message: String,
    resource_type: String,
    property: String,
    condition: Condition,
    #[serde(default)]
    value: Option<Value>,
}

// ---------------------------------------------------------------------------
// DeclarativeRule
// ---------------------------------------------------------------------------

/// A property check over every resource of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclarativeRule {
    id: String,
    kind: ViolationKind,
    message: String,
    resource_type: String,
    path: Vec<String>,
    condition: Condition,
    value: Option<Value>,
}

impl DeclarativeRule {
    /// The resource type this rule inspects.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The property path, split on `.`.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    #[must_use]
    pub fn condition(&self) -> Condition {
        self.condition
    }

    fn fires(&self, found: &[&Value]) -> bool {
        match self.condition {
            Condition::Missing => found.is_empty(),
            Condition::Present => !found.is_empty(),
            Condition::Equals => self
                .value
                .as_ref()
                .is_some_and(|expected| found.iter().any(|v| loosely_equal(v, expected))),
            Condition::NotEquals => self
                .value
                .as_ref()
                .is_some_and(|expected| !found.iter().any(|v| loosely_equal(v, expected))),
        }
    }
}

impl AuditRule for DeclarativeRule {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ViolationKind {
        self.kind
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn audit(&self, model: &TemplateModel) -> Result<Vec<Violation>, RuleError> {
        let offending: Vec<String> = model
            .resources_by_type(&self.resource_type)
            .filter(|resource| {
                let mut found = Vec::new();
                resolve(resource.properties(), &self.path, &mut found);
                self.fires(&found)
            })
            .map(|resource| resource.logical_id().to_string())
            .collect();

        if offending.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![self.violation(offending)])
        }
    }
}

impl TryFrom<DeclarativeRuleFile> for DeclarativeRule {
    type Error = String;

    fn try_from(file: DeclarativeRuleFile) -> Result<Self, Self::Error> {
        if file.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        if file.id == FATAL_RULE_ID {
            return Err(format!("rule id '{FATAL_RULE_ID}' is reserved"));
        }
        if file.resource_type.trim().is_empty() {
            return Err(format!("rule '{}' has an empty resource_type", file.id));
        }

        let path: Vec<String> = file.property.split('.').map(str::to_string).collect();
        if path.iter().any(String::is_empty) {
            return Err(format!(
                "rule '{}' has an invalid property path '{}'",
                file.id, file.property
            ));
        }
        if file.condition.needs_value() && file.value.is_none() {
            return Err(format!(
                "rule '{}' uses condition {:?} but sets no value",
                file.id, file.condition
            ));
        }

        Ok(Self {
            id: file.id,
            kind: file.kind,
            message: file.message,
            resource_type: file.resource_type,
            path,
            condition: file.condition,
            value: file.value,
        })
    }
}

/// Collects every non-null value reachable from `node` along `path`.
fn resolve<'a>(node: &'a Value, path: &[String], found: &mut Vec<&'a Value>) {
    let Some((segment, rest)) = path.split_first() else {
        if !node.is_null() {
            found.push(node);
        }
        return;
    };

    if segment == "*" {
        match node {
            Value::Array(items) => items.iter().for_each(|v| resolve(v, rest, found)),
            Value::Object(map) => map.values().for_each(|v| resolve(v, rest, found)),
            _ => {}
        }
    } else if let Some(child) = node.get(segment.as_str()) {
        resolve(child, rest, found);
    }
}

/// Equality that treats `"true"`/`true` and `"10"`/`10` alike, since
/// templates routinely quote scalars.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Bool(flag)) | (Value::Bool(flag), Value::String(s)) => {
            s.eq_ignore_ascii_case(if *flag { "true" } else { "false" })
        }
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// DeclarativeRuleLoader
// ---------------------------------------------------------------------------

/// Loads declarative rules from YAML files.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use bastion_rules::declarative::DeclarativeRuleLoader;
///
/// let rules = DeclarativeRuleLoader.load_from_dir(Path::new("rules/")).unwrap();
/// println!("loaded {} rules", rules.len());
/// ```
pub struct DeclarativeRuleLoader;

impl DeclarativeRuleLoader {
    /// Loads a single rule from a YAML file.
    ///
    /// # Errors
    ///
    /// - [`DeclarativeError::IoError`] if the file cannot be read.
    /// - [`DeclarativeError::YamlParseError`] if the YAML is malformed or a
    ///   required field is missing.
    /// - [`DeclarativeError::ValidationError`] if the rule is inconsistent.
    pub fn load_from_file(&self, path: &Path) -> Result<DeclarativeRule, DeclarativeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| DeclarativeError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_from_str(&contents, path)
    }

    /// Loads every `.yaml` / `.yml` file under `dir`, recursively, in
    /// file-path order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub fn load_from_dir(&self, dir: &Path) -> Result<Vec<DeclarativeRule>, DeclarativeError> {
        let mut rules = Vec::new();

        for entry in WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map_or_else(|| dir.to_path_buf(), Path::to_path_buf);
                DeclarativeError::IoError {
                    path,
                    source: std::io::Error::other(e),
                }
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            match path.extension().and_then(|ext| ext.to_str()) {
                Some("yaml" | "yml") => {}
                _ => {
                    trace!(path = %path.display(), "skipping non-YAML file");
                    continue;
                }
            }

            rules.push(self.load_from_file(path)?);
        }

        Ok(rules)
    }

    /// Parses one rule from YAML text. `source_path` is used only in errors.
    ///
    /// # Errors
    ///
    /// See [`load_from_file`](Self::load_from_file).
    pub fn load_from_str(
        &self,
        yaml: &str,
        source_path: &Path,
    ) -> Result<DeclarativeRule, DeclarativeError> {
        let file: DeclarativeRuleFile =
            serde_yml::from_str(yaml).map_err(|e| DeclarativeError::YamlParseError {
                path: source_path.to_path_buf(),
                source: e,
            })?;

        let rule =
            DeclarativeRule::try_from(file).map_err(|message| DeclarativeError::ValidationError {
                path: source_path.to_path_buf(),
                message,
            })?;
        debug!(id = %rule.id, path = %source_path.display(), "loaded declarative rule");
        Ok(rule)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
