//! Parameter override parsing and `Ref` substitution.
//!
//! Overrides are supplied as JSON in one of two shapes:
//!
//! ```json
//! { "Parameters": { "Env": "prod", "Encrypt": true } }
//! ```
//!
//! ```json
//! [ { "ParameterKey": "Env", "ParameterValue": "prod" } ]
//! ```
//!
//! Once applied, every `{"Ref": "<parameter>"}` node inside resource
//! properties is replaced by the parameter's effective value (override, else
//! declared default).

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{ParseError, ParseResult};
use crate::model::TemplateModel;

/// Parses parameter overrides text into a name -> value map.
///
/// # Errors
///
/// Returns [`ParseError::Parameters`] if the text is not valid JSON or has
/// neither of the accepted shapes.
pub fn parse_overrides(text: &str) -> ParseResult<BTreeMap<String, Value>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ParseError::Parameters(e.to_string()))?;

    match value {
        Value::Object(mut root) => match root.remove("Parameters") {
            Some(Value::Object(params)) => Ok(params.into_iter().collect()),
            Some(_) => Err(ParseError::Parameters(
                "Parameters must be a JSON object".to_string(),
            )),
            None => Err(ParseError::Parameters(
                "expected a top-level Parameters key".to_string(),
            )),
        },
        Value::Array(entries) => entries
            .into_iter()
            .map(|entry| {
                let key = entry
                    .get("ParameterKey")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ParseError::Parameters("list entry is missing ParameterKey".to_string())
                    })?
                    .to_string();
                let value = entry.get("ParameterValue").cloned().ok_or_else(|| {
                    ParseError::Parameters(format!("parameter '{key}' has no ParameterValue"))
                })?;
                Ok((key, value))
            })
            .collect(),
        _ => Err(ParseError::Parameters(
            "parameter values must be a JSON object or list".to_string(),
        )),
    }
}

/// Records `overrides` on the model's declared parameters and substitutes
/// `Ref` nodes in resource properties.
pub fn apply_overrides(model: &mut TemplateModel, overrides: BTreeMap<String, Value>) {
    for (name, value) in overrides {
        match model.parameters_mut().get_mut(&name) {
            Some(parameter) => parameter.set_override(value),
            None => debug!(parameter = %name, "override for undeclared parameter; ignoring"),
        }
    }

    let values: BTreeMap<String, Value> = model
        .parameters()
        .iter()
        .filter_map(|(name, p)| p.effective_value().map(|v| (name.clone(), v.clone())))
        .collect();

    if values.is_empty() {
        return;
    }

    for resource in model.resources_mut() {
        substitute_refs(resource.properties_mut(), &values);
    }
}

fn substitute_refs(node: &mut Value, values: &BTreeMap<String, Value>) {
    let replacement = match node {
        Value::Object(map) if map.len() == 1 => map
            .get("Ref")
            .and_then(Value::as_str)
            .and_then(|target| values.get(target))
            .cloned(),
        _ => None,
    };

    if let Some(value) = replacement {
        *node = value;
        return;
    }

    match node {
        Value::Object(map) => map.values_mut().for_each(|v| substitute_refs(v, values)),
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_refs(v, values)),
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
