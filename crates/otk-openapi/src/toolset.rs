//! OpenAPI toolset container.

use crate::auth::{AuthConfig, AuthManager, AuthSettings, BrowserLauncher, CredentialPrompt};
use crate::error::Result;
use crate::loader::{load_spec, parse_spec, resolve_base_url};
use crate::parser::parse_operations;
use crate::rest_api_tool::RestApiTool;
use crate::security::resolve_global_auth;
use openapiv3::OpenAPI;
use otk_core::{OtkConfig, Tool, Toolset};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session options applied when building a toolset.
#[derive(Clone, Default)]
pub struct ToolsetOptions {
    /// Overrides the base URL derived from the document
    pub base_url: Option<String>,
    /// Credential injected before any tool runs
    pub access_token: Option<String>,
    pub auth_settings: AuthSettings,
    pub prompt: Option<Arc<dyn CredentialPrompt>>,
    pub browser: Option<Arc<dyn BrowserLauncher>>,
}

impl ToolsetOptions {
    pub fn from_config(config: &OtkConfig) -> Self {
        Self {
            base_url: config.spec.base_url.clone(),
            access_token: config.auth.access_token.clone(),
            auth_settings: AuthSettings::from_config(&config.oauth),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_auth_settings(mut self, settings: AuthSettings) -> Self {
        self.auth_settings = settings;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = Some(browser);
        self
    }
}

/// The bound tools of one session, with the resolved base URL and the
/// shared [`AuthManager`].
///
/// # Example
///
/// ```no_run
/// use otk_openapi::{OpenApiToolset, ToolsetOptions};
///
/// # async fn example() -> Result<(), otk_openapi::OpenApiError> {
/// let toolset = OpenApiToolset::load(
///     "./api/openapi.yaml",
///     ToolsetOptions::default().with_access_token("secret"),
/// )
/// .await?;
/// println!("Generated {} tools", toolset.len());
/// # Ok(())
/// # }
/// ```
pub struct OpenApiToolset {
    tools: Vec<Arc<RestApiTool>>,
    base_url: String,
    auth: Arc<AuthManager>,
}

impl OpenApiToolset {
    /// Load a spec from a local path or an http(s) URL and generate tools.
    pub async fn load(source: &str, options: ToolsetOptions) -> Result<Self> {
        info!("Loading OpenAPI spec from: {}", source);
        let document = load_spec(source).await?;
        Self::from_document(&document, Some(source), options)
    }

    /// Parse spec text (JSON or YAML) and generate tools.
    ///
    /// Without a spec URL, the base URL comes from the document's servers
    /// or `options.base_url`.
    pub fn from_str(content: &str, options: ToolsetOptions) -> Result<Self> {
        debug!("Parsing OpenAPI spec from string");
        let document = parse_spec(content, "<inline>")?;
        Self::from_document(&document, None, options)
    }

    /// Generate tools from a parsed document. `source` is the location the
    /// document was loaded from, used to resolve relative server URLs.
    pub fn from_document(
        document: &OpenAPI,
        source: Option<&str>,
        options: ToolsetOptions,
    ) -> Result<Self> {
        let definitions = parse_operations(document)?;
        let base_url = resolve_base_url(document, options.base_url.as_deref(), source)?;
        info!("Parsed {} operations, base URL {}", definitions.len(), base_url);

        let global = resolve_global_auth(document);
        let mut auth = AuthManager::new(global).with_settings(options.auth_settings);
        if let Some(prompt) = options.prompt {
            auth = auth.with_prompt(prompt);
        }
        if let Some(browser) = options.browser {
            auth = auth.with_browser(browser);
        }
        if let Some(token) = options.access_token.filter(|t| !t.is_empty()) {
            auth.set_access_token(token);
        }
        let auth = Arc::new(auth);

        let client = reqwest::Client::new();
        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if !seen.insert(definition.name.clone()) {
                warn!(
                    "Duplicate tool name '{}' ({} {}); keeping the first definition",
                    definition.name, definition.method, definition.path
                );
                continue;
            }
            tools.push(Arc::new(
                RestApiTool::new(definition, base_url.clone(), auth.clone())
                    .with_client(client.clone()),
            ));
        }
        debug!("Generated {} tools", tools.len());

        Ok(Self {
            tools,
            base_url,
            auth,
        })
    }

    /// Get all tools generated from the OpenAPI spec.
    pub fn tools(&self) -> Vec<Arc<dyn Tool>> {
        self.tools
            .iter()
            .map(|t| t.clone() as Arc<dyn Tool>)
            .collect()
    }

    /// The bound tools with their definitions.
    pub fn rest_tools(&self) -> &[Arc<RestApiTool>] {
        &self.tools
    }

    /// Get a specific tool by name.
    pub fn get_tool(&self, name: &str) -> Option<Arc<RestApiTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Get the names of all tools in the toolset.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Get the number of tools in the toolset.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the toolset is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &Arc<AuthManager> {
        &self.auth
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.auth.set_access_token(token);
    }

    /// Whether any tool needs a credential.
    pub fn requires_auth(&self) -> bool {
        self.tools
            .iter()
            .any(|t| self.auth.requires_auth(Some(&t.definition().auth)))
    }

    /// The scheme [`authenticate`](Self::authenticate) satisfies: the global
    /// one, else the first scheme required by a tool.
    pub fn session_auth(&self) -> AuthConfig {
        if !self.auth.config().is_none() {
            return self.auth.config().clone();
        }
        self.tools
            .iter()
            .map(|t| &t.definition().auth)
            .find(|auth| !auth.is_none())
            .cloned()
            .unwrap_or_default()
    }

    /// Acquire a credential for [`session_auth`](Self::session_auth).
    pub async fn authenticate(&self) -> Result<()> {
        let config = self.session_auth();
        self.auth.authenticate(Some(&config)).await
    }
}

impl Toolset for OpenApiToolset {
    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        OpenApiToolset::tools(self)
    }

    fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        OpenApiToolset::get_tool(self, name).map(|t| t as Arc<dyn Tool>)
    }
}
