//! # OTK OpenAPI Tool Compiler
//!
//! Turns an OpenAPI document into schema-validated tools and executes them
//! as authenticated HTTP requests.
//!
//! ## Features
//!
//! - Load OpenAPI 3.x specifications (JSON or YAML, local path or URL)
//! - Translate parameter and request body schemas into validators, with
//!   path/query/body placement recorded per field
//! - API key, bearer, basic and OAuth2 (dynamic registration + PKCE)
//!   authentication, resolved per operation
//! - Request assembly and response classification with status hints
//!
//! ## Example
//!
//! ```no_run
//! use otk_openapi::{OpenApiToolset, ToolsetOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let toolset = OpenApiToolset::load("./api/openapi.yaml", ToolsetOptions::default()).await?;
//! if toolset.requires_auth() {
//!     toolset.authenticate().await?;
//! }
//!
//! let tool = toolset.get_tool("listUsers").expect("tool exists");
//! let users = tool.invoke(serde_json::json!({"limit": 5})).await?;
//! println!("{users}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
mod error;
pub mod loader;
pub mod parser;
mod rest_api_tool;
pub mod security;
mod toolset;
pub mod translator;
mod types;
pub mod validator;

pub use auth::{
    AuthConfig, AuthLocation, AuthManager, AuthSettings, AuthState, BrowserLauncher,
    CredentialPrompt, StdinPrompt, SystemBrowser,
};
pub use error::{OpenApiError, Result};
pub use loader::{load_spec, parse_spec, resolve_base_url};
pub use parser::{OpenApiParser, parse_operations};
pub use rest_api_tool::{HttpStatusError, PreparedRequest, RestApiTool, status_hint};
pub use toolset::{OpenApiToolset, ToolsetOptions};
pub use translator::{SchemaTranslator, translate};
pub use types::{HttpMethod, ParameterLocation, ParameterPlacement, ToolDefinition};
pub use validator::{ObjectShape, ValidationError, Validator, ValidatorKind};
