//! Data structures produced by the operation parser.

use crate::auth::AuthConfig;
use crate::validator::ObjectShape;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// HTTP methods turned into tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Methods in the order the parser visits them under each path.
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether a JSON body is sent when body fields are present.
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Request part a parameter is sent in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    /// Path parameter (e.g., /users/{id})
    Path,
    /// Query parameter (e.g., ?limit=5)
    Query,
    /// Field of the flattened JSON request body
    Body,
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterLocation::Path => write!(f, "path"),
            ParameterLocation::Query => write!(f, "query"),
            ParameterLocation::Body => write!(f, "body"),
        }
    }
}

/// Which request part each parameter field belongs to.
///
/// The three sets are always disjoint: assigning a name to one location
/// removes it from the others, matching the last-wins assignment of fields
/// into the parameter shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterPlacement {
    pub path_params: BTreeSet<String>,
    pub query_params: BTreeSet<String>,
    pub body_params: BTreeSet<String>,
}

impl ParameterPlacement {
    pub fn assign(&mut self, name: &str, location: ParameterLocation) {
        self.path_params.remove(name);
        self.query_params.remove(name);
        self.body_params.remove(name);

        let set = match location {
            ParameterLocation::Path => &mut self.path_params,
            ParameterLocation::Query => &mut self.query_params,
            ParameterLocation::Body => &mut self.body_params,
        };
        set.insert(name.to_string());
    }

    /// Location of a field. Fields absent from every set default to the body.
    pub fn location_of(&self, name: &str) -> ParameterLocation {
        if self.path_params.contains(name) {
            ParameterLocation::Path
        } else if self.query_params.contains(name) {
            ParameterLocation::Query
        } else {
            ParameterLocation::Body
        }
    }
}

/// A parsed operation, ready to be bound into an executable tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// operationId, or `{method}_{path}` when absent
    pub name: String,
    /// summary, then description, then `"{METHOD} {path}"`
    pub description: String,
    /// Validator for the flattened parameter object
    pub parameters: ObjectShape,
    pub method: HttpMethod,
    /// Path template (e.g., "/users/{id}")
    pub path: String,
    /// Auth requirement resolved for this operation
    pub auth: AuthConfig,
    pub placement: ParameterPlacement,
}
