//! Span creation helpers for tool invocations and auth flows

use crate::attributes::*;

/// Attributes for tracing a tool call
#[derive(Debug, Clone)]
pub struct ToolSpanAttributes {
    pub tool_name: String,
    pub method: String,
    pub path_template: String,
    pub tool_call_id: String,
    pub invocation_id: String,
    pub args_json: String,
    pub status_code: Option<u16>,
    pub outcome: &'static str,
}

/// Attributes for tracing a credential acquisition flow
#[derive(Debug, Clone)]
pub struct AuthSpanAttributes {
    pub auth_type: String,
    pub outcome: &'static str,
}

/// Record a span for one tool execution.
///
/// Argument payloads are recorded as given; callers must not pass
/// credentials in `args_json`.
pub fn trace_tool_call(attrs: ToolSpanAttributes) {
    let span = tracing::info_span!(
        "execute_tool",
        { OTK_TOOL_NAME } = %attrs.tool_name,
        { HTTP_REQUEST_METHOD } = %attrs.method,
        { URL_TEMPLATE } = %attrs.path_template,
        { OTK_TOOL_CALL_ID } = %attrs.tool_call_id,
        { OTK_INVOCATION_ID } = %attrs.invocation_id,
        { OTK_TOOL_ARGS } = %attrs.args_json,
        { OTK_OUTCOME } = attrs.outcome,
        { HTTP_RESPONSE_STATUS_CODE } = tracing::field::Empty,
    );

    if let Some(status) = attrs.status_code {
        span.record(HTTP_RESPONSE_STATUS_CODE, status);
    }

    let _guard = span.enter();
}

/// Record a span for one authentication attempt.
pub fn trace_auth_flow(attrs: AuthSpanAttributes) {
    let span = tracing::info_span!(
        "authenticate",
        { OTK_AUTH_TYPE } = %attrs.auth_type,
        { OTK_OUTCOME } = attrs.outcome,
    );

    let _guard = span.enter();
}

/// Helper to safely serialize to JSON string
pub fn safe_serialize<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<not serializable>".to_string())
}
