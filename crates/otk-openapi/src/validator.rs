//! Runtime parameter validators.
//!
//! A [`Validator`] is the translated form of one OpenAPI schema node. The
//! parameter shape of a tool is an [`ObjectShape`] whose fields are the union
//! of path, query and flattened body parameters.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use thiserror::Error;

/// One validator node, with the description carried over from the schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Validator {
    pub kind: ValidatorKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatorKind {
    /// `lenient` is the fallback for absent or unrecognized types and accepts
    /// any non-null value.
    String { lenient: bool },
    Enum(Vec<String>),
    /// `integer` only affects the rendered JSON schema.
    Number { integer: bool },
    Boolean,
    Array(Box<Validator>),
    Object(ObjectShape),
}

/// Object validator: named fields, each required or optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    pub fields: BTreeMap<String, Field>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub validator: Validator,
    pub required: bool,
}

/// A single failed check, addressed by a dotted path into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

/// All issues found while validating one input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid parameters: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.path, i.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Validator {
    pub fn new(kind: ValidatorKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        if description.is_some() {
            self.description = description;
        }
        self
    }

    /// Validate a value, returning the accepted value with unknown object
    /// keys removed.
    pub fn validate(&self, value: &Value) -> Result<Value, ValidationError> {
        let mut issues = Vec::new();
        match self.check(value, "$", &mut issues) {
            Some(accepted) if issues.is_empty() => Ok(accepted),
            _ => Err(ValidationError { issues }),
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Option<Value> {
        match &self.kind {
            ValidatorKind::String { lenient: true } if !value.is_null() => Some(value.clone()),
            ValidatorKind::String { .. } => match value {
                Value::String(_) => Some(value.clone()),
                other => fail(
                    issues,
                    path,
                    format!("expected string, received {}", type_name(other)),
                ),
            },
            ValidatorKind::Enum(allowed) => match value {
                Value::String(s) if allowed.iter().any(|a| a == s) => Some(value.clone()),
                Value::String(s) => fail(
                    issues,
                    path,
                    format!("'{}' is not one of [{}]", s, allowed.join(", ")),
                ),
                other => fail(
                    issues,
                    path,
                    format!("expected string, received {}", type_name(other)),
                ),
            },
            ValidatorKind::Number { .. } => match value {
                Value::Number(_) => Some(value.clone()),
                other => fail(
                    issues,
                    path,
                    format!("expected number, received {}", type_name(other)),
                ),
            },
            ValidatorKind::Boolean => match value {
                Value::Bool(_) => Some(value.clone()),
                other => fail(
                    issues,
                    path,
                    format!("expected boolean, received {}", type_name(other)),
                ),
            },
            ValidatorKind::Array(items) => match value {
                Value::Array(elements) => {
                    let accepted: Vec<Value> = elements
                        .iter()
                        .enumerate()
                        .filter_map(|(i, element)| {
                            items.check(element, &format!("{path}[{i}]"), issues)
                        })
                        .collect();
                    (accepted.len() == elements.len()).then_some(Value::Array(accepted))
                }
                other => fail(
                    issues,
                    path,
                    format!("expected array, received {}", type_name(other)),
                ),
            },
            ValidatorKind::Object(shape) => shape.check(value, path, issues),
        }
    }

    /// Render this validator as a JSON Schema fragment.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            ValidatorKind::String { .. } => json!({ "type": "string" }),
            ValidatorKind::Enum(values) => json!({ "type": "string", "enum": values }),
            ValidatorKind::Number { integer: true } => json!({ "type": "integer" }),
            ValidatorKind::Number { integer: false } => json!({ "type": "number" }),
            ValidatorKind::Boolean => json!({ "type": "boolean" }),
            ValidatorKind::Array(items) => json!({
                "type": "array",
                "items": items.to_json_schema(),
            }),
            ValidatorKind::Object(shape) => shape.to_json_schema(),
        };

        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

impl ObjectShape {
    pub fn insert(&mut self, name: impl Into<String>, validator: Validator, required: bool) {
        self.fields.insert(
            name.into(),
            Field {
                validator,
                required,
            },
        );
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate an input object. Missing optional fields and `null` optional
    /// values are dropped; unknown keys are stripped.
    pub fn validate(&self, value: &Value) -> Result<Map<String, Value>, ValidationError> {
        let mut issues = Vec::new();
        match self.check(value, "$", &mut issues) {
            Some(Value::Object(accepted)) if issues.is_empty() => Ok(accepted),
            _ => Err(ValidationError { issues }),
        }
    }

    fn check(&self, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Option<Value> {
        let Value::Object(input) = value else {
            issues.push(ValidationIssue {
                path: path.to_string(),
                message: format!("expected object, received {}", type_name(value)),
            });
            return None;
        };

        let mut accepted = Map::new();
        let mut ok = true;
        for (name, field) in &self.fields {
            let field_path = if path == "$" {
                name.clone()
            } else {
                format!("{path}.{name}")
            };

            match input.get(name) {
                Some(v) if !v.is_null() => match field.validator.check(v, &field_path, issues) {
                    Some(checked) => {
                        accepted.insert(name.clone(), checked);
                    }
                    None => ok = false,
                },
                _ if field.required => {
                    issues.push(ValidationIssue {
                        path: field_path,
                        message: "required".to_string(),
                    });
                    ok = false;
                }
                _ => {}
            }
        }

        ok.then_some(Value::Object(accepted))
    }

    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, field)| (name.clone(), field.validator.to_json_schema()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, field)| field.required)
            .map(|(name, _)| name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        if let Some(description) = &self.description {
            schema["description"] = json!(description);
        }
        schema
    }
}

fn fail(issues: &mut Vec<ValidationIssue>, path: &str, message: String) -> Option<Value> {
    issues.push(ValidationIssue {
        path: path.to_string(),
        message,
    });
    None
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
