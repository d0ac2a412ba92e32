//! Configuration management for OTK
//!
//! Loads configuration with priority:
//! 1. Explicitly specified config file
//! 2. otk.toml in the current directory or one of its parents
//! 3. Defaults
//!
//! String values written as `${VAR_NAME}` are resolved from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the config file searched for in the working directory tree
pub const CONFIG_FILE_NAME: &str = "otk.toml";

/// Environment variable consulted when no access token is configured
pub const ACCESS_TOKEN_ENV: &str = "OTK_ACCESS_TOKEN";

/// OTK configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtkConfig {
    #[serde(default)]
    pub spec: SpecConfig,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Where the OpenAPI document comes from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Local path or http(s) URL of the OpenAPI document
    pub source: Option<String>,

    /// Overrides the base URL derived from the document's servers
    pub base_url: Option<String>,
}

/// Pre-supplied credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSection {
    /// Access credential injected before any tool runs
    pub access_token: Option<String>,
}

/// OAuth2 authorization-code flow settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_client_name")]
    pub client_name: String,

    #[serde(default = "default_open_browser")]
    pub open_browser: bool,
}

/// Logging and tracing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            callback_port: default_callback_port(),
            timeout_secs: default_timeout_secs(),
            client_name: default_client_name(),
            open_browser: default_open_browser(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            service_name: None,
        }
    }
}

impl OtkConfig {
    /// Load configuration, falling back to defaults when no otk.toml exists
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
                let mut config = Self::default();
                config.resolve_env_vars();
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::debug!("Loading configuration from: {:?}", path);

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let mut config: OtkConfig = toml::from_str(contents)?;
        config.resolve_env_vars();
        Ok(config)
    }

    /// Find otk.toml by searching current directory and parents
    fn find_config_file() -> Option<PathBuf> {
        let mut current = env::current_dir().ok()?;

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Some(config_path);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Resolve ${VAR_NAME} references to environment variables
    fn resolve_env_vars(&mut self) {
        self.spec.source = self.spec.source.as_deref().and_then(Self::resolve_env_var);
        self.spec.base_url = self
            .spec
            .base_url
            .as_deref()
            .and_then(Self::resolve_env_var);

        let token = self
            .auth
            .access_token
            .as_deref()
            .and_then(Self::resolve_env_var)
            .filter(|t| !t.is_empty());
        self.auth.access_token = token.or_else(|| {
            env::var(ACCESS_TOKEN_ENV)
                .ok()
                .filter(|t| !t.is_empty())
        });
    }

    /// Resolve a single ${VAR_NAME} reference
    fn resolve_env_var(value: &str) -> Option<String> {
        if value.starts_with("${") && value.ends_with('}') {
            let var_name = &value[2..value.len() - 1];
            env::var(var_name).ok()
        } else {
            Some(value.to_string())
        }
    }
}

fn default_callback_port() -> u16 {
    8765
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_client_name() -> String {
    "otk".to_string()
}

fn default_open_browser() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OtkConfig::default();
        assert_eq!(config.oauth.callback_port, 8765);
        assert_eq!(config.oauth.timeout_secs, 300);
        assert!(config.oauth.open_browser);
        assert_eq!(config.observability.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_resolve_env_var() {
        unsafe {
            env::set_var("OTK_TEST_VAR", "test_value");
        }

        let resolved = OtkConfig::resolve_env_var("${OTK_TEST_VAR}");
        assert_eq!(resolved, Some("test_value".to_string()));

        let not_var = OtkConfig::resolve_env_var("plain_value");
        assert_eq!(not_var, Some("plain_value".to_string()));

        let missing = OtkConfig::resolve_env_var("${OTK_TEST_VAR_MISSING}");
        assert_eq!(missing, None);

        unsafe {
            env::remove_var("OTK_TEST_VAR");
        }
    }

    #[test]
    fn test_from_toml() {
        let config = OtkConfig::from_toml(
            r#"
[spec]
source = "./openapi.yaml"
base_url = "https://api.example.com"

[oauth]
callback_port = 9000
open_browser = false

[observability]
log_format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.spec.source.as_deref(), Some("./openapi.yaml"));
        assert_eq!(
            config.spec.base_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(config.oauth.callback_port, 9000);
        assert_eq!(config.oauth.timeout_secs, 300);
        assert!(!config.oauth.open_browser);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_access_token_reference() {
        unsafe {
            env::set_var("OTK_TEST_TOKEN_REF", "secret123");
        }

        let config = OtkConfig::from_toml(
            r#"
[auth]
access_token = "${OTK_TEST_TOKEN_REF}"
"#,
        )
        .unwrap();
        assert_eq!(config.auth.access_token.as_deref(), Some("secret123"));

        unsafe {
            env::remove_var("OTK_TEST_TOKEN_REF");
        }
    }
}
