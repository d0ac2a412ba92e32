//! REST API tool implementation.

use crate::auth::AuthManager;
use crate::error::{OpenApiError, Result};
use crate::types::{HttpMethod, ParameterLocation, ToolDefinition};
use async_trait::async_trait;
use otk_core::{Tool, ToolContext, ToolResponse};
use otk_telemetry::{ToolSpanAttributes, safe_serialize, trace_tool_call};
use reqwest::header::CONTENT_TYPE;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;

/// A fully assembled request, ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    /// JSON body, present only for POST/PUT/PATCH with body fields
    pub body: Option<Value>,
}

/// A non-2xx response.
#[derive(Error, Debug)]
#[error("HTTP {status} {reason}: {method} {url}. Response: {payload}{}", hint_suffix(.status))]
pub struct HttpStatusError {
    pub status: u16,
    pub reason: String,
    pub method: HttpMethod,
    pub url: String,
    pub payload: String,
}

fn hint_suffix(status: &u16) -> String {
    status_hint(*status)
        .map(|hint| format!(". {hint}"))
        .unwrap_or_default()
}

/// Human-readable hint for a failed status.
pub fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("Authentication failed. Check that the credentials are valid and not expired."),
        403 => Some("Permission denied. The credentials lack access to this resource."),
        404 => Some("Resource not found. Verify the identifiers in the request."),
        429 => Some("Rate limit exceeded. Wait before retrying."),
        500..=599 => Some("The API server encountered an error. Try again later."),
        _ => None,
    }
}

struct ToolOutput {
    status: u16,
    body: Value,
}

/// A tool that executes one REST API operation.
///
/// Binds a [`ToolDefinition`] to the API base URL and the session's
/// [`AuthManager`].
pub struct RestApiTool {
    definition: ToolDefinition,
    base_url: String,
    auth: Arc<AuthManager>,
    client: reqwest::Client,
    schema: Value,
}

impl RestApiTool {
    pub fn new(definition: ToolDefinition, base_url: impl Into<String>, auth: Arc<AuthManager>) -> Self {
        let schema = definition.parameters.to_json_schema();
        Self {
            definition,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            client: reqwest::Client::new(),
            schema,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Validate `params` and assemble the request without sending it.
    pub fn prepare(&self, params: &Value) -> Result<PreparedRequest> {
        self.build_request(params)
            .map_err(|e| OpenApiError::tool(&self.definition.name, e))
    }

    /// Validate, send and classify. Every failure is a `ToolExecution` error.
    pub async fn invoke(&self, params: Value) -> Result<Value> {
        self.run(&params).await.map(|output| output.body)
    }

    async fn run(&self, params: &Value) -> Result<ToolOutput> {
        let request = self.prepare(params)?;
        self.send(request)
            .await
            .map_err(|e| OpenApiError::tool(&self.definition.name, e))
    }

    #[instrument(skip(self, params), fields(tool = %self.definition.name))]
    fn build_request(&self, params: &Value) -> anyhow::Result<PreparedRequest> {
        let empty = Value::Object(Map::new());
        let params = if params.is_null() { &empty } else { params };
        let validated = self.definition.parameters.validate(params)?;

        let mut path = self.definition.path.clone();
        for (name, value) in &validated {
            let placeholder = format!("{{{name}}}");
            if path.contains(&placeholder) {
                path = path.replace(&placeholder, &urlencoding::encode(&value_to_string(value)));
            }
        }

        let mut url = Url::parse(&format!("{}{}", self.base_url, path))?;
        let mut body = Map::new();
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in &validated {
                match self.definition.placement.location_of(name) {
                    ParameterLocation::Path => {}
                    ParameterLocation::Query => {
                        query.append_pair(name, &value_to_string(value));
                    }
                    ParameterLocation::Body => {
                        body.insert(name.clone(), value.clone());
                    }
                }
            }

            if self.auth.requires_auth(Some(&self.definition.auth)) {
                for (name, value) in self.auth.auth_query_params(Some(&self.definition.auth)) {
                    query.append_pair(&name, &value);
                }
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let mut headers = BTreeMap::new();
        if self.auth.requires_auth(Some(&self.definition.auth)) {
            headers.extend(self.auth.auth_headers(Some(&self.definition.auth)));
        }

        let body = (self.definition.method.carries_body() && !body.is_empty()).then(|| {
            headers.insert(CONTENT_TYPE.to_string(), "application/json".to_string());
            Value::Object(body)
        });

        debug!("Request URL: {} {}", self.definition.method, url);
        Ok(PreparedRequest {
            method: self.definition.method,
            url,
            headers,
            body,
        })
    }

    #[instrument(skip(self, request), fields(tool = %self.definition.name))]
    async fn send(&self, request: PreparedRequest) -> anyhow::Result<ToolOutput> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        let response = builder.send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        if !status.is_success() {
            let payload = match &body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            error!(
                "API request failed: {} {} - Status: {}",
                request.method, self.definition.path, status
            );
            return Err(HttpStatusError {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                method: request.method,
                url: request.url.to_string(),
                payload,
            }
            .into());
        }

        Ok(ToolOutput {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Tool for RestApiTool {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn description(&self) -> &str {
        &self.definition.description
    }

    fn schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(
        &self,
        ctx: Arc<dyn ToolContext>,
        params: Value,
    ) -> otk_core::Result<ToolResponse> {
        debug!("Executing REST API tool: {}", self.definition.name);

        let result = self.run(&params).await;
        let status_code = match &result {
            Ok(output) => Some(output.status),
            Err(OpenApiError::ToolExecution { source, .. }) => {
                source.downcast_ref::<HttpStatusError>().map(|e| e.status)
            }
            Err(_) => None,
        };

        trace_tool_call(ToolSpanAttributes {
            tool_name: self.definition.name.clone(),
            method: self.definition.method.to_string(),
            path_template: self.definition.path.clone(),
            tool_call_id: ctx.function_call_id().to_string(),
            invocation_id: ctx.invocation_id().to_string(),
            args_json: safe_serialize(&params),
            status_code,
            outcome: if result.is_ok() { "success" } else { "error" },
        });

        let output = result?;
        Ok(ToolResponse {
            result: output.body,
        })
    }
}

/// Render a value for a path segment or query string. Arrays are
/// comma-joined.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
