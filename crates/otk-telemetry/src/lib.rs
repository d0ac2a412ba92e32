//! # OTK Telemetry
//!
//! Structured logging and OpenTelemetry tracing for OpenAPI tool invocations
//! and credential acquisition flows.

mod spans;
mod tracer;

pub use spans::{
    AuthSpanAttributes, ToolSpanAttributes, safe_serialize, trace_auth_flow, trace_tool_call,
};
pub use tracer::{init_telemetry, register_span_processor, tracer_provider};

/// Span attribute names recorded by OTK.
///
/// HTTP attributes follow the OpenTelemetry semantic conventions; tool and
/// auth attributes live under the `otk.` namespace.
pub mod attributes {
    // HTTP semantic conventions
    pub const HTTP_REQUEST_METHOD: &str = "http.request.method";
    pub const HTTP_RESPONSE_STATUS_CODE: &str = "http.response.status_code";
    pub const URL_TEMPLATE: &str = "url.template";

    // Tool attributes
    pub const OTK_TOOL_NAME: &str = "otk.tool.name";
    pub const OTK_TOOL_CALL_ID: &str = "otk.tool.call_id";
    pub const OTK_INVOCATION_ID: &str = "otk.invocation_id";
    pub const OTK_TOOL_ARGS: &str = "otk.tool.args";
    pub const OTK_OUTCOME: &str = "otk.outcome";

    // Auth attributes
    pub const OTK_AUTH_TYPE: &str = "otk.auth.type";

    /// Instrumentation scope name
    pub const SYSTEM_NAME: &str = "otk";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_constants() {
        assert_eq!(attributes::HTTP_REQUEST_METHOD, "http.request.method");
        assert_eq!(attributes::OTK_TOOL_NAME, "otk.tool.name");
        assert_eq!(attributes::SYSTEM_NAME, "otk");
    }
}
