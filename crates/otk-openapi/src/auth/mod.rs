//! Authentication support for OpenAPI tools.
//!
//! Supported schemes:
//! - API Key (in header or query parameter)
//! - Bearer Token (Authorization: Bearer <token>)
//! - Basic Auth (Authorization: Basic <base64>)
//! - OAuth2 authorization code with PKCE and dynamic client registration

mod callback;
mod manager;
mod oauth;
mod prompt;

pub use manager::{AuthManager, AuthState};
pub use prompt::{BrowserLauncher, CredentialPrompt, StdinPrompt, SystemBrowser};

use otk_core::config::OAuthConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolved authentication requirement of a document or operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// No credential is attached
    #[default]
    None,

    /// API key sent as a named header or query parameter
    ApiKey {
        /// Name of the header or query parameter
        name: String,
        location: AuthLocation,
    },

    /// Authorization: Bearer <token>
    Bearer,

    /// Authorization: Basic <base64(username:password)>
    Basic,

    /// OAuth2 authorization code flow; the token is sent as a bearer token
    #[serde(rename = "oauth2")]
    OAuth2 {
        authorization_url: String,
        token_url: String,
        scopes: Vec<String>,
    },
}

/// Location where an API key is provided.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthLocation {
    /// In HTTP header
    Header,
    /// In URL query parameter
    Query,
}

impl AuthConfig {
    pub fn api_key_header(name: impl Into<String>) -> Self {
        Self::ApiKey {
            name: name.into(),
            location: AuthLocation::Header,
        }
    }

    pub fn api_key_query(name: impl Into<String>) -> Self {
        Self::ApiKey {
            name: name.into(),
            location: AuthLocation::Query,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Short label used in logs and spans.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey { .. } => "api_key",
            Self::Bearer => "bearer",
            Self::Basic => "basic",
            Self::OAuth2 { .. } => "oauth2",
        }
    }
}

/// Settings for the interactive OAuth2 flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// Fixed loopback port of the redirect listener
    pub callback_port: u16,
    /// How long to wait for the redirect
    pub timeout: Duration,
    /// `client_name` sent during dynamic client registration
    pub client_name: String,
    /// Open the system browser at the authorization URL
    pub open_browser: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::from_config(&OAuthConfig::default())
    }
}

impl AuthSettings {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            callback_port: config.callback_port,
            timeout: Duration::from_secs(config.timeout_secs),
            client_name: config.client_name.clone(),
            open_browser: config.open_browser,
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.callback_port)
    }
}
