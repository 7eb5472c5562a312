//! Template parser: JSON or YAML text to [`TemplateModel`].
//!
//! The [`ModelParser`] trait is the seam the audit engine depends on.
//! [`TemplateParser`] is the bundled implementation:
//!
//! - text whose first non-whitespace character is `{` is parsed as JSON,
//!   everything else as YAML;
//! - YAML short-form intrinsic tags are normalized to their long form
//!   (`!Ref x` becomes `{"Ref": "x"}`, `!GetAtt a.b` becomes
//!   `{"Fn::GetAtt": ["a", "b"]}`, `!Sub s` becomes `{"Fn::Sub": "s"}`);
//! - `Ref`s to declared parameters are replaced by the supplied override or,
//!   failing that, the parameter's default.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use tracing::trace;

use crate::error::{ParseError, ParseResult};
use crate::model::TemplateModel;
use crate::parameters::{apply_overrides, parse_overrides};

// ---------------------------------------------------------------------------
// ModelParser trait
// ---------------------------------------------------------------------------

/// Turns document text into a [`TemplateModel`].
///
/// Implementations must be `Send + Sync` so one parser can serve every
/// worker thread during a batch audit.
pub trait ModelParser: Send + Sync {
    /// Parses `document`, applying `parameter_overrides` when present.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] for malformed documents or overrides.
    fn parse(&self, document: &str, parameter_overrides: Option<&str>) -> ParseResult<TemplateModel>;
}

// ---------------------------------------------------------------------------
// TemplateParser
// ---------------------------------------------------------------------------

/// The default JSON/YAML template parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateParser;

impl ModelParser for TemplateParser {
    fn parse(&self, document: &str, parameter_overrides: Option<&str>) -> ParseResult<TemplateModel> {
        let raw = parse_document(document)?;
        let mut model = TemplateModel::from_value(raw)?;

        let overrides = match parameter_overrides {
            Some(text) => parse_overrides(text)?,
            None => BTreeMap::new(),
        };
        trace!(count = overrides.len(), "applying parameter overrides");
        apply_overrides(&mut model, overrides);

        Ok(model)
    }
}

/// Parses document text into a JSON value without any structural checks.
///
/// # Errors
///
/// Returns [`ParseError::Syntax`] carrying the underlying parser's message.
pub fn parse_document(text: &str) -> ParseResult<Value> {
    if text.trim_start().starts_with('{') {
        serde_json::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))
    } else {
        let yaml: serde_yml::Value =
            serde_yml::from_str(text).map_err(|e| ParseError::Syntax(e.to_string()))?;
        Ok(yaml_to_json(yaml))
    }
}

// ---------------------------------------------------------------------------
// YAML normalization
// ---------------------------------------------------------------------------

fn yaml_to_json(value: serde_yml::Value) -> Value {
    match value {
        serde_yml::Value::Null => Value::Null,
        serde_yml::Value::Bool(b) => Value::Bool(b),
        serde_yml::Value::Number(n) => yaml_number(&n),
        serde_yml::Value::String(s) => Value::String(s),
        serde_yml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                map.insert(yaml_key(&key), yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yml::Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            intrinsic(tag.trim_start_matches('!'), yaml_to_json(tagged.value))
        }
    }
}

fn yaml_number(n: &serde_yml::Number) -> Value {
    if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

fn yaml_key(key: &serde_yml::Value) -> String {
    match key {
        serde_yml::Value::String(s) => s.clone(),
        serde_yml::Value::Bool(b) => b.to_string(),
        serde_yml::Value::Number(n) => n.to_string(),
        serde_yml::Value::Null => "null".to_string(),
        other => serde_yml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Expands a short-form intrinsic tag into its long-form mapping.
fn intrinsic(name: &str, value: Value) -> Value {
    let (key, value) = match name {
        "Ref" | "Condition" => (name.to_string(), value),
        "GetAtt" => {
            let value = match value {
                Value::String(s) => match s.split_once('.') {
                    Some((resource, attribute)) => Value::Array(vec![
                        Value::String(resource.to_string()),
                        Value::String(attribute.to_string()),
                    ]),
                    None => Value::String(s),
                },
                other => other,
            };
            ("Fn::GetAtt".to_string(), value)
        }
        _ => (format!("Fn::{name}"), value),
    };

    let mut map = Map::new();
    map.insert(key, value);
    Value::Object(map)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
