//! Translation of OpenAPI schema nodes into runtime validators.
//!
//! Supported subset: primitives, string enums, arrays of non-object items,
//! and objects nested at most one level below the parameter or body root.
//! `$ref` is followed only for `#/components/schemas/<Name>` pointers.
//! Everything else fails with [`OpenApiError::UnsupportedSchema`].

use crate::error::{OpenApiError, Result};
use crate::validator::{ObjectShape, Validator, ValidatorKind};
use openapiv3::OpenAPI;
use serde_json::Value;

const COMPONENT_SCHEMA_PREFIX: &str = "#/components/schemas/";

/// Deepest level at which an object schema may appear. The parameter or
/// body root is depth 0.
pub const MAX_OBJECT_DEPTH: usize = 1;

/// Translate one schema node found at `context_path` within `document`.
///
/// Reference cycle tracking starts empty for every call.
pub fn translate(
    schema: &Value,
    context_path: &str,
    document: &OpenAPI,
    depth: usize,
) -> Result<Validator> {
    SchemaTranslator::new(document).translate(schema, context_path, depth)
}

/// Translator bound to the document whose components resolve `$ref`s.
#[derive(Clone, Copy)]
pub struct SchemaTranslator<'a> {
    document: &'a OpenAPI,
}

impl<'a> SchemaTranslator<'a> {
    pub fn new(document: &'a OpenAPI) -> Self {
        Self { document }
    }

    pub fn translate(&self, schema: &Value, path: &str, depth: usize) -> Result<Validator> {
        self.translate_node(schema, path, depth, &[])
    }

    /// Follow `$ref` pointers until a concrete schema is reached.
    ///
    /// Returns the schema together with the spec path it was found at.
    pub fn resolve(&self, schema: &Value, path: &str) -> Result<(Value, String)> {
        self.resolve_chain(schema, path, &[])
    }

    fn resolve_chain(&self, schema: &Value, path: &str, seen: &[String]) -> Result<(Value, String)> {
        match schema.get("$ref") {
            Some(reference) => {
                let (name, component) = self.lookup(reference, path, seen)?;
                let mut chain = seen.to_vec();
                chain.push(name.clone());
                self.resolve_chain(&component, &component_path(&name), &chain)
            }
            None => Ok((schema.clone(), path.to_string())),
        }
    }

    fn translate_node(
        &self,
        schema: &Value,
        path: &str,
        depth: usize,
        seen: &[String],
    ) -> Result<Validator> {
        if let Some(reference) = schema.get("$ref") {
            let (name, component) = self.lookup(reference, path, seen)?;
            let mut chain = seen.to_vec();
            chain.push(name.clone());
            return self.translate_node(&component, &component_path(&name), depth, &chain);
        }

        for keyword in ["anyOf", "oneOf", "allOf"] {
            if schema.get(keyword).is_some() {
                return Err(OpenApiError::unsupported(
                    path,
                    format!("'{keyword}' schema composition is not supported"),
                ));
            }
        }

        let description = schema
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let kind = match schema_type(schema) {
            Some("string") => string_kind(schema, path)?,
            Some("number") => ValidatorKind::Number { integer: false },
            Some("integer") => ValidatorKind::Number { integer: true },
            Some("boolean") => ValidatorKind::Boolean,
            Some("array") => self.array_kind(schema, path, depth, seen)?,
            Some("object") => {
                ValidatorKind::Object(self.object_shape(schema, path, depth, seen)?)
            }
            _ => ValidatorKind::String { lenient: true },
        };

        Ok(Validator { kind, description })
    }

    fn array_kind(
        &self,
        schema: &Value,
        path: &str,
        depth: usize,
        seen: &[String],
    ) -> Result<ValidatorKind> {
        let items_path = format!("{path}.items");
        let Some(items) = schema.get("items") else {
            return Ok(ValidatorKind::Array(Box::new(Validator::new(
                ValidatorKind::String { lenient: true },
            ))));
        };

        let (resolved, _) = self.resolve_chain(items, &items_path, seen)?;
        if is_object_schema(&resolved) {
            return Err(OpenApiError::unsupported(
                items_path,
                "arrays of objects are not supported",
            ));
        }

        // Array items do not count toward the nesting depth.
        let items = self.translate_node(items, &items_path, depth, seen)?;
        Ok(ValidatorKind::Array(Box::new(items)))
    }

    fn object_shape(
        &self,
        schema: &Value,
        path: &str,
        depth: usize,
        seen: &[String],
    ) -> Result<ObjectShape> {
        if depth > MAX_OBJECT_DEPTH {
            return Err(OpenApiError::unsupported(
                path,
                format!(
                    "objects nested more than {MAX_OBJECT_DEPTH} level below the parameter root are not supported"
                ),
            ));
        }

        let required = required_names(schema);
        let mut shape = ObjectShape {
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..ObjectShape::default()
        };

        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let property_path = format!("{path}.properties.{name}");
                let validator = self.translate_node(property, &property_path, depth + 1, seen)?;
                shape.insert(name.clone(), validator, required.contains(name));
            }
        }

        Ok(shape)
    }

    fn lookup(&self, reference: &Value, path: &str, seen: &[String]) -> Result<(String, Value)> {
        let pointer = reference.as_str().ok_or_else(|| {
            OpenApiError::unsupported(path, "'$ref' must be a string")
        })?;

        let name = pointer
            .strip_prefix(COMPONENT_SCHEMA_PREFIX)
            .filter(|name| !name.is_empty() && !name.contains('/'))
            .ok_or_else(|| {
                OpenApiError::unsupported(
                    path,
                    format!("unsupported reference '{pointer}'; only '{COMPONENT_SCHEMA_PREFIX}<Name>' is resolved"),
                )
            })?;

        if seen.iter().any(|s| s == name) {
            return Err(OpenApiError::unsupported(
                path,
                format!("reference cycle detected at '{pointer}'"),
            ));
        }

        let component = self
            .document
            .components
            .as_ref()
            .and_then(|c| c.schemas.get(name))
            .ok_or_else(|| {
                OpenApiError::unsupported(path, format!("reference '{pointer}' does not exist"))
            })?;

        let value = serde_json::to_value(component).map_err(|e| {
            OpenApiError::unsupported(component_path(name), format!("unreadable schema: {e}"))
        })?;

        Ok((name.to_string(), value))
    }
}

fn string_kind(schema: &Value, path: &str) -> Result<ValidatorKind> {
    if is_binary_string(schema) {
        return Err(OpenApiError::unsupported(
            path,
            "binary strings (file uploads) are not supported",
        ));
    }

    let values: Vec<String> = schema
        .get("enum")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if values.is_empty() {
        Ok(ValidatorKind::String { lenient: false })
    } else {
        Ok(ValidatorKind::Enum(values))
    }
}

fn required_names(schema: &Value) -> Vec<String> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn component_path(name: &str) -> String {
    format!("components.schemas.{name}")
}

/// The declared `type`. An untyped schema with `properties` is an object.
fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type").and_then(Value::as_str) {
        Some(kind) => Some(kind),
        None if schema.get("properties").is_some_and(Value::is_object) => Some("object"),
        None => None,
    }
}

pub(crate) fn is_object_schema(schema: &Value) -> bool {
    schema_type(schema) == Some("object")
}

pub(crate) fn is_binary_string(schema: &Value) -> bool {
    schema.get("type").and_then(Value::as_str) == Some("string")
        && schema.get("format").and_then(Value::as_str) == Some("binary")
}
