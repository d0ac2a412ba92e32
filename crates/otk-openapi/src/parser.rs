//! OpenAPI operation parser.
//!
//! Walks the path × method matrix of a document and emits one
//! [`ToolDefinition`] per operation. A schema outside the supported subset
//! aborts the whole parse.

use crate::error::{OpenApiError, Result};
use crate::security::resolve_operation_auth;
use crate::translator::{SchemaTranslator, is_binary_string, is_object_schema};
use crate::types::{HttpMethod, ParameterLocation, ParameterPlacement, ToolDefinition};
use crate::validator::{ObjectShape, ValidatorKind};
use openapiv3::{
    OpenAPI, Operation, Parameter, ParameterData, ParameterSchemaOrContent, PathItem,
    ReferenceOr, RequestBody,
};
use serde_json::Value;
use tracing::{debug, warn};

const JSON_MEDIA_TYPE: &str = "application/json";
const PARAMETER_REF_PREFIX: &str = "#/components/parameters/";
const REQUEST_BODY_REF_PREFIX: &str = "#/components/requestBodies/";

/// Parse every supported operation of `document`.
pub fn parse_operations(document: &OpenAPI) -> Result<Vec<ToolDefinition>> {
    OpenApiParser::new(document).parse()
}

/// Parser over a loaded document.
pub struct OpenApiParser<'a> {
    document: &'a OpenAPI,
    translator: SchemaTranslator<'a>,
}

impl<'a> OpenApiParser<'a> {
    pub fn new(document: &'a OpenAPI) -> Self {
        Self {
            document,
            translator: SchemaTranslator::new(document),
        }
    }

    /// Parse the document and extract all operations, in document order.
    pub fn parse(&self) -> Result<Vec<ToolDefinition>> {
        let mut definitions = Vec::new();

        for (path, item) in &self.document.paths.paths {
            let item = match item {
                ReferenceOr::Item(item) => item,
                ReferenceOr::Reference { reference } => {
                    warn!("Skipping path '{}': path references ({}) are not supported", path, reference);
                    continue;
                }
            };

            for method in HttpMethod::ALL {
                if let Some(operation) = operation_for(item, method) {
                    definitions.push(self.parse_operation(path, method, &item.parameters, operation)?);
                }
            }
        }

        debug!("Parsed {} operations", definitions.len());
        Ok(definitions)
    }

    fn parse_operation(
        &self,
        path: &str,
        method: HttpMethod,
        path_parameters: &'a [ReferenceOr<Parameter>],
        operation: &'a Operation,
    ) -> Result<ToolDefinition> {
        let name = operation
            .operation_id
            .clone()
            .unwrap_or_else(|| synthesize_name(method, path));
        let scope = format!("paths.{path}.{}", method.as_str().to_lowercase());

        let description = operation
            .summary
            .as_ref()
            .or(operation.description.as_ref())
            .filter(|d| !d.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("{method} {path}"));

        let mut parameters = ObjectShape {
            description: Some(description.clone()),
            ..ObjectShape::default()
        };
        let mut placement = ParameterPlacement::default();

        // Operation-level parameters come last so they replace path-level
        // parameters of the same name.
        for parameter in path_parameters.iter().chain(&operation.parameters) {
            let Some(parameter) = self.resolve_parameter(parameter) else {
                continue;
            };
            self.add_parameter(&scope, parameter, &mut parameters, &mut placement)?;
        }

        if let Some(body) = &operation.request_body {
            if let Some(body) = self.resolve_request_body(body) {
                self.add_request_body(&scope, body, &mut parameters, &mut placement)?;
            }
        }

        let auth = resolve_operation_auth(self.document, operation.security.as_deref());
        debug!("Parsed operation {} ({} {}), auth: {}", name, method, path, auth.kind());

        Ok(ToolDefinition {
            name,
            description,
            parameters,
            method,
            path: path.to_string(),
            auth,
            placement,
        })
    }

    fn resolve_parameter(&self, parameter: &'a ReferenceOr<Parameter>) -> Option<&'a Parameter> {
        match parameter {
            ReferenceOr::Item(parameter) => Some(parameter),
            ReferenceOr::Reference { reference } => {
                let resolved = reference
                    .strip_prefix(PARAMETER_REF_PREFIX)
                    .and_then(|name| self.document.components.as_ref()?.parameters.get(name));
                match resolved {
                    Some(ReferenceOr::Item(parameter)) => Some(parameter),
                    _ => {
                        warn!("Skipping unresolvable parameter reference '{}'", reference);
                        None
                    }
                }
            }
        }
    }

    fn resolve_request_body(&self, body: &'a ReferenceOr<RequestBody>) -> Option<&'a RequestBody> {
        match body {
            ReferenceOr::Item(body) => Some(body),
            ReferenceOr::Reference { reference } => {
                let resolved = reference
                    .strip_prefix(REQUEST_BODY_REF_PREFIX)
                    .and_then(|name| self.document.components.as_ref()?.request_bodies.get(name));
                match resolved {
                    Some(ReferenceOr::Item(body)) => Some(body),
                    _ => {
                        warn!("Skipping unresolvable request body reference '{}'", reference);
                        None
                    }
                }
            }
        }
    }

    fn add_parameter(
        &self,
        scope: &str,
        parameter: &Parameter,
        shape: &mut ObjectShape,
        placement: &mut ParameterPlacement,
    ) -> Result<()> {
        let (data, location) = match parameter {
            Parameter::Path { parameter_data, .. } => (parameter_data, ParameterLocation::Path),
            Parameter::Query { parameter_data, .. } => (parameter_data, ParameterLocation::Query),
            Parameter::Header { parameter_data, .. } | Parameter::Cookie { parameter_data, .. } => {
                debug!("Ignoring header/cookie parameter '{}'", parameter_data.name);
                return Ok(());
            }
        };

        let Some(schema) = parameter_schema(data)? else {
            warn!(
                "Skipping parameter '{}': content-based parameters are not supported",
                data.name
            );
            return Ok(());
        };

        let path = format!("{scope}.parameters.{}", data.name);
        let validator = self
            .translator
            .translate(&schema, &path, 0)?
            .with_description(data.description.clone());

        shape.insert(data.name.clone(), validator, data.required);
        placement.assign(&data.name, location);
        Ok(())
    }

    /// Flatten the JSON body object's properties into the parameter shape.
    fn add_request_body(
        &self,
        scope: &str,
        body: &RequestBody,
        shape: &mut ObjectShape,
        placement: &mut ParameterPlacement,
    ) -> Result<()> {
        let Some(schema) = body.content.get(JSON_MEDIA_TYPE).and_then(|m| m.schema.as_ref()) else {
            debug!("{}: no application/json request body schema", scope);
            return Ok(());
        };

        let path = format!("{scope}.requestBody");
        let schema = serde_json::to_value(schema)
            .map_err(|e| OpenApiError::unsupported(&path, format!("unreadable schema: {e}")))?;

        let (resolved, _) = self.translator.resolve(&schema, &path)?;
        if !is_object_schema(&resolved) {
            warn!("{}: ignoring request body that is not an object schema", path);
            return Ok(());
        }

        if let Some(properties) = resolved.get("properties").and_then(Value::as_object) {
            for (name, property) in properties {
                let property_path = format!("{path}.{name}");
                let (property, _) = self.translator.resolve(property, &property_path)?;
                if is_binary_string(&property) {
                    return Err(OpenApiError::unsupported(
                        property_path,
                        "file upload properties are not supported in request bodies",
                    ));
                }
            }
        }

        let ValidatorKind::Object(body_shape) = self.translator.translate(&schema, &path, 0)?.kind
        else {
            return Ok(());
        };

        for (name, field) in body_shape.fields {
            placement.assign(&name, ParameterLocation::Body);
            shape.fields.insert(name, field);
        }
        Ok(())
    }
}

fn operation_for(item: &PathItem, method: HttpMethod) -> Option<&Operation> {
    match method {
        HttpMethod::Get => item.get.as_ref(),
        HttpMethod::Post => item.post.as_ref(),
        HttpMethod::Put => item.put.as_ref(),
        HttpMethod::Patch => item.patch.as_ref(),
        HttpMethod::Delete => item.delete.as_ref(),
    }
}

fn parameter_schema(data: &ParameterData) -> Result<Option<Value>> {
    match &data.format {
        ParameterSchemaOrContent::Schema(schema) => serde_json::to_value(schema)
            .map(Some)
            .map_err(|e| OpenApiError::unsupported(&data.name, format!("unreadable schema: {e}"))),
        ParameterSchemaOrContent::Content(_) => Ok(None),
    }
}

/// `GET /users/{id}` becomes `get_users_id`.
pub fn synthesize_name(method: HttpMethod, path: &str) -> String {
    let path: String = path.chars().filter(|c| !matches!(c, '{' | '}')).collect();
    let path = path.replace('/', "_");
    format!(
        "{}_{}",
        method.as_str().to_lowercase(),
        path.trim_start_matches('_')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::loader::parse_spec;

    const TEST_SPEC: &str = r#"
openapi: 3.0.0
info:
  title: Test API
  version: 1.0.0
paths:
  /users:
    get:
      operationId: listUsers
      summary: List users
      description: Returns every user
      parameters:
        - name: limit
          in: query
          schema: {type: integer}
        - name: X-Request-Id
          in: header
          schema: {type: string}
      responses: {'200': {description: OK}}
    post:
      operationId: createUser
      requestBody:
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/NewUser'
      responses: {'201': {description: Created}}
  /users/{id}:
    parameters:
      - name: id
        in: path
        required: true
        schema: {type: string}
    get:
      parameters:
        - $ref: '#/components/parameters/UserId'
      responses: {'200': {description: OK}}
    delete:
      description: Remove a user
      responses: {'204': {description: Deleted}}
components:
  parameters:
    UserId:
      name: id
      in: path
      required: true
      description: Numeric user id
      schema: {type: integer}
  schemas:
    NewUser:
      type: object
      required: [name]
      properties:
        name: {type: string}
        email: {type: string}
"#;

    fn parse(spec: &str) -> Result<Vec<ToolDefinition>> {
        parse_operations(&parse_spec(spec, "spec.yaml").unwrap())
    }

    fn find<'a>(tools: &'a [ToolDefinition], name: &str) -> &'a ToolDefinition {
        tools.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_operations_in_document_order() {
        let tools = parse(TEST_SPEC).unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            ["listUsers", "createUser", "get_users_id", "delete_users_id"]
        );
    }

    #[test]
    fn test_description_fallbacks() {
        let tools = parse(TEST_SPEC).unwrap();
        assert_eq!(find(&tools, "listUsers").description, "List users");
        assert_eq!(find(&tools, "delete_users_id").description, "Remove a user");
        assert_eq!(find(&tools, "createUser").description, "POST /users");
    }

    #[test]
    fn test_header_parameters_are_skipped() {
        let tools = parse(TEST_SPEC).unwrap();
        let list = find(&tools, "listUsers");
        assert_eq!(list.parameters.field_names().collect::<Vec<_>>(), ["limit"]);
        assert!(list.placement.query_params.contains("limit"));
    }

    #[test]
    fn test_operation_parameter_overrides_path_parameter() {
        let tools = parse(TEST_SPEC).unwrap();
        let get = find(&tools, "get_users_id");
        let id = &get.parameters.fields["id"];
        assert_eq!(id.validator.kind, ValidatorKind::Number { integer: true });
        assert_eq!(id.validator.description.as_deref(), Some("Numeric user id"));
        assert!(get.placement.path_params.contains("id"));

        // Path-level parameters still apply to operations that do not redeclare them.
        let delete = find(&tools, "delete_users_id");
        assert_eq!(
            delete.parameters.fields["id"].validator.kind,
            ValidatorKind::String { lenient: false }
        );
    }

    #[test]
    fn test_body_is_flattened() {
        let tools = parse(TEST_SPEC).unwrap();
        let create = find(&tools, "createUser");
        assert!(create.parameters.fields["name"].required);
        assert!(!create.parameters.fields["email"].required);
        assert_eq!(create.placement.body_params.len(), 2);
        assert_eq!(create.auth, AuthConfig::None);
    }

    #[test]
    fn test_binary_body_property_has_operation_scoped_path() {
        let spec = r#"
openapi: 3.0.0
info: {title: Upload, version: "1"}
paths:
  /files:
    post:
      operationId: upload
      requestBody:
        content:
          application/json:
            schema:
              type: object
              properties:
                file: {type: string, format: binary}
      responses: {'200': {description: OK}}
"#;
        match parse(spec) {
            Err(OpenApiError::UnsupportedSchema { path, .. }) => {
                assert_eq!(path, "paths./files.post.requestBody.file");
            }
            other => panic!("expected UnsupportedSchema, got {other:?}"),
        }
    }

    #[test]
    fn test_untyped_body_with_properties_is_flattened() {
        let spec = r#"
openapi: 3.0.0
info: {title: Untyped, version: "1"}
paths:
  /users:
    post:
      operationId: createUser
      requestBody:
        content:
          application/json:
            schema:
              required: [name]
              properties:
                name: {type: string}
      responses: {'201': {description: Created}}
"#;
        let tools = parse(spec).unwrap();
        let create = find(&tools, "createUser");
        assert!(create.parameters.fields["name"].required);
        assert!(create.placement.body_params.contains("name"));
    }

    #[test]
    fn test_non_json_and_non_object_bodies_are_ignored() {
        let spec = r#"
openapi: 3.0.0
info: {title: Bodies, version: "1"}
paths:
  /upload:
    put:
      operationId: putRaw
      requestBody:
        content:
          text/plain:
            schema: {type: string}
      responses: {'200': {description: OK}}
  /tags:
    put:
      operationId: putTags
      requestBody:
        content:
          application/json:
            schema: {type: array, items: {type: string}}
      responses: {'200': {description: OK}}
"#;
        let tools = parse(spec).unwrap();
        assert!(tools.iter().all(|t| t.parameters.is_empty()));
    }

    #[test]
    fn test_schema_error_aborts_parse() {
        let spec = r#"
openapi: 3.0.0
info: {title: Bad, version: "1"}
paths:
  /ok:
    get:
      operationId: ok
      responses: {'200': {description: OK}}
  /bad:
    get:
      operationId: bad
      parameters:
        - name: filter
          in: query
          schema:
            oneOf: [{type: string}, {type: integer}]
      responses: {'200': {description: OK}}
"#;
        assert!(matches!(
            parse(spec),
            Err(OpenApiError::UnsupportedSchema { .. })
        ));
    }

    #[test]
    fn test_synthesized_names() {
        assert_eq!(synthesize_name(HttpMethod::Get, "/users/{id}"), "get_users_id");
        assert_eq!(
            synthesize_name(HttpMethod::Patch, "/orgs/{org}/members"),
            "patch_orgs_org_members"
        );
    }
}
