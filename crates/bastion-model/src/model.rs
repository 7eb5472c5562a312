//! The parsed template model handed to audit rules.
//!
//! A [`TemplateModel`] keeps the raw document alongside an indexed view of
//! its `Resources` and `Parameters` sections. Resources are keyed by logical
//! id in a `BTreeMap` so iteration order is stable across runs.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::{ParseError, ParseResult};

// ---------------------------------------------------------------------------
// Resource
// ---------------------------------------------------------------------------

/// A single entry of the template's `Resources` section.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    logical_id: String,
    resource_type: String,
    properties: Value,
}

impl Resource {
    /// The resource's logical id (its key under `Resources`).
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// The resource `Type`, e.g. `AWS::S3::Bucket`.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// The resource `Properties` mapping. An empty object when the template omits it.
    #[must_use]
    pub fn properties(&self) -> &Value {
        &self.properties
    }

    /// Looks up a top-level property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub(crate) fn properties_mut(&mut self) -> &mut Value {
        &mut self.properties
    }
}

// ---------------------------------------------------------------------------
// Parameter
// ---------------------------------------------------------------------------

/// A declared template parameter, optionally carrying an override value.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    parameter_type: Option<String>,
    default: Option<Value>,
    override_value: Option<Value>,
}

impl Parameter {
    /// The parameter name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared `Type`, if any.
    #[must_use]
    pub fn parameter_type(&self) -> Option<&str> {
        self.parameter_type.as_deref()
    }

    /// The declared `Default`, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The value supplied through parameter overrides, if any.
    #[must_use]
    pub fn override_value(&self) -> Option<&Value> {
        self.override_value.as_ref()
    }

    /// The override when present, otherwise the declared default.
    #[must_use]
    pub fn effective_value(&self) -> Option<&Value> {
        self.override_value.as_ref().or(self.default.as_ref())
    }

    pub(crate) fn set_override(&mut self, value: Value) {
        self.override_value = Some(value);
    }
}

// ---------------------------------------------------------------------------
// TemplateModel
// ---------------------------------------------------------------------------

/// A structurally valid template.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateModel {
    raw: Value,
    resources: BTreeMap<String, Resource>,
    parameters: BTreeMap<String, Parameter>,
}

impl TemplateModel {
    /// Builds a model from an already-parsed document value.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Structure`] if the document is not a mapping,
    /// has no non-empty `Resources` mapping, or contains a resource without
    /// a string `Type`.
    pub fn from_value(raw: Value) -> ParseResult<Self> {
        let root = raw.as_object().ok_or_else(|| {
            ParseError::Structure("template document must be a mapping".to_string())
        })?;

        let resources = parse_resources(root)?;
        let parameters = parse_parameters(root)?;

        Ok(Self {
            raw,
            resources,
            parameters,
        })
    }

    /// The document exactly as parsed (before parameter substitution).
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// All resources, ordered by logical id.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Resources whose `Type` equals `resource_type`, ordered by logical id.
    pub fn resources_by_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.resource_type == resource_type)
    }

    /// Looks up a resource by logical id.
    #[must_use]
    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Number of resources in the template.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Declared parameters, keyed by name.
    #[must_use]
    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut BTreeMap<String, Parameter> {
        &mut self.parameters
    }

    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }
}

fn parse_resources(root: &Map<String, Value>) -> ParseResult<BTreeMap<String, Resource>> {
    let section = match root.get("Resources") {
        Some(Value::Object(map)) if !map.is_empty() => map,
        Some(Value::Object(_)) => {
            return Err(ParseError::Structure(
                "template Resources section must not be empty".to_string(),
            ))
        }
        Some(_) => {
            return Err(ParseError::Structure(
                "template Resources section must be a mapping".to_string(),
            ))
        }
        None => {
            return Err(ParseError::Structure(
                "template has no Resources section".to_string(),
            ))
        }
    };

    let mut resources = BTreeMap::new();
    for (logical_id, definition) in section {
        let body = definition.as_object().ok_or_else(|| {
            ParseError::Structure(format!("resource '{logical_id}' must be a mapping"))
        })?;

        let resource_type = body
            .get("Type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ParseError::Structure(format!("resource '{logical_id}' is missing a string Type"))
            })?
            .to_string();

        let properties = body
            .get("Properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        resources.insert(
            logical_id.clone(),
            Resource {
                logical_id: logical_id.clone(),
                resource_type,
                properties,
            },
        );
    }

    Ok(resources)
}

fn parse_parameters(root: &Map<String, Value>) -> ParseResult<BTreeMap<String, Parameter>> {
    let section = match root.get("Parameters") {
        None | Some(Value::Null) => return Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ParseError::Structure(
                "template Parameters section must be a mapping".to_string(),
            ))
        }
    };

    Ok(section
        .iter()
        .map(|(name, declaration)| {
            let parameter = Parameter {
                name: name.clone(),
                parameter_type: declaration
                    .get("Type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                default: declaration.get("Default").cloned(),
                override_value: None,
            };
            (name.clone(), parameter)
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
