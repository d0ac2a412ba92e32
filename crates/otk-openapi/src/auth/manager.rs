//! Session-scoped credential holder and credential acquisition flows.

use super::callback::CallbackListener;
use super::oauth::{self, Pkce, RegisteredClient};
use super::prompt::{BrowserLauncher, CredentialPrompt, StdinPrompt, SystemBrowser};
use super::{AuthConfig, AuthLocation, AuthSettings};
use crate::error::{OpenApiError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use otk_telemetry::{AuthSpanAttributes, trace_auth_flow};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Credential state of a session.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// A flow of the given auth type is in progress
    Authenticating(&'static str),
    Authenticated(String),
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("Unauthenticated"),
            Self::Authenticating(kind) => write!(f, "Authenticating({kind})"),
            Self::Authenticated(_) => f.write_str("Authenticated(<redacted>)"),
        }
    }
}

/// Holds one access credential and the session's global auth requirement.
///
/// Every method taking an `override_config` uses it in place of the global
/// configuration when given; tools pass their operation-level requirement.
pub struct AuthManager {
    config: AuthConfig,
    settings: AuthSettings,
    state: RwLock<AuthState>,
    oauth_client: RwLock<Option<RegisteredClient>>,
    http: reqwest::Client,
    prompt: Arc<dyn CredentialPrompt>,
    browser: Arc<dyn BrowserLauncher>,
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            settings: AuthSettings::default(),
            state: RwLock::new(AuthState::Unauthenticated),
            oauth_client: RwLock::new(None),
            http: reqwest::Client::new(),
            prompt: Arc::new(StdinPrompt),
            browser: Arc::new(SystemBrowser),
        }
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CredentialPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The session's global auth requirement.
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    fn effective<'a>(&'a self, override_config: Option<&'a AuthConfig>) -> &'a AuthConfig {
        override_config.unwrap_or(&self.config)
    }

    pub fn requires_auth(&self, override_config: Option<&AuthConfig>) -> bool {
        !self.effective(override_config).is_none()
    }

    pub fn state(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state(), AuthState::Authenticated(_))
    }

    /// Client id issued by dynamic registration, if a flow registered one.
    pub fn oauth_client_id(&self) -> Option<String> {
        self.oauth_client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.client_id.clone())
    }

    fn token(&self) -> Option<String> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            AuthState::Authenticated(token) => Some(token.clone()),
            _ => None,
        }
    }

    fn set_state(&self, state: AuthState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Store a pre-supplied credential, skipping every interactive flow.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.set_state(AuthState::Authenticated(token.into()));
        debug!("Access token set directly");
    }

    /// Acquire a credential for the effective auth type.
    ///
    /// On failure the previous state is restored and the call may be retried.
    pub async fn authenticate(&self, override_config: Option<&AuthConfig>) -> Result<()> {
        let config = self.effective(override_config).clone();
        if config.is_none() {
            debug!("No authentication required");
            return Ok(());
        }

        let previous = self.state();
        self.set_state(AuthState::Authenticating(config.kind()));
        info!("Authenticating ({})", config.kind());

        let result = self.acquire(&config).await;
        trace_auth_flow(AuthSpanAttributes {
            auth_type: config.kind().to_string(),
            outcome: if result.is_ok() { "success" } else { "error" },
        });

        match result {
            Ok(token) => {
                self.set_state(AuthState::Authenticated(token));
                info!("Authentication succeeded ({})", config.kind());
                Ok(())
            }
            Err(e) => {
                self.set_state(previous);
                warn!("Authentication failed: {}", e);
                Err(e)
            }
        }
    }

    async fn acquire(&self, config: &AuthConfig) -> Result<String> {
        match config {
            AuthConfig::None => Err(OpenApiError::auth("No authentication scheme to satisfy")),
            AuthConfig::ApiKey { name, .. } => {
                self.ask(&format!("API key ({name})"), true).await
            }
            AuthConfig::Bearer => self.ask("Bearer token", true).await,
            AuthConfig::Basic => {
                let username = self.ask("Username", false).await?;
                let password = self.ask("Password", true).await?;
                Ok(STANDARD.encode(format!("{username}:{password}")))
            }
            AuthConfig::OAuth2 {
                authorization_url,
                token_url,
                scopes,
            } => self.oauth_flow(authorization_url, token_url, scopes).await,
        }
    }

    async fn ask(&self, label: &str, secret: bool) -> Result<String> {
        let value = self
            .prompt
            .prompt(label, secret)
            .await
            .map_err(|e| OpenApiError::auth(format!("Failed to read {label}: {e}")))?;

        if value.trim().is_empty() {
            return Err(OpenApiError::auth(format!("{label} must not be empty")));
        }
        Ok(value.trim().to_string())
    }

    async fn oauth_flow(
        &self,
        authorization_url: &str,
        token_url: &str,
        scopes: &[String],
    ) -> Result<String> {
        let listener = CallbackListener::bind(self.settings.callback_port).await?;
        let redirect_uri = self.settings.redirect_uri();

        let client =
            oauth::register_client(&self.http, token_url, &self.settings.client_name, &redirect_uri)
                .await?;
        debug!("Registered OAuth client {}", client.client_id);
        *self
            .oauth_client
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(client.clone());

        let pkce = Pkce::generate();
        let state = oauth::random_token();
        let url = oauth::authorization_url(
            authorization_url,
            &client.client_id,
            &redirect_uri,
            &pkce.challenge,
            &state,
            scopes,
        )?;
        self.launch_browser(&url);

        let code = listener
            .wait_for_code(&state, self.settings.timeout)
            .await?;
        debug!("Received authorization code");

        oauth::exchange_code(
            &self.http,
            token_url,
            &code,
            &redirect_uri,
            &client,
            &pkce.verifier,
        )
        .await
    }

    fn launch_browser(&self, url: &str) {
        if !self.settings.open_browser {
            info!("Open this URL to authorize: {}", url);
            return;
        }

        if let Err(e) = self.browser.open(url) {
            warn!("Could not open a browser ({}). Open this URL to authorize: {}", e, url);
        }
    }

    /// Headers carrying the credential. Empty when no credential is set.
    pub fn auth_headers(&self, override_config: Option<&AuthConfig>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let Some(token) = self.token() else {
            return headers;
        };

        match self.effective(override_config) {
            AuthConfig::Bearer | AuthConfig::OAuth2 { .. } => {
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            AuthConfig::Basic => {
                headers.insert("Authorization".to_string(), format!("Basic {token}"));
            }
            AuthConfig::ApiKey {
                name,
                location: AuthLocation::Header,
            } => {
                headers.insert(name.clone(), token);
            }
            AuthConfig::ApiKey { .. } | AuthConfig::None => {}
        }
        headers
    }

    /// Query parameters carrying the credential. Empty when no credential is set.
    pub fn auth_query_params(
        &self,
        override_config: Option<&AuthConfig>,
    ) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        if let (
            Some(token),
            AuthConfig::ApiKey {
                name,
                location: AuthLocation::Query,
            },
        ) = (self.token(), self.effective(override_config))
        {
            params.insert(name.clone(), token);
        }
        params
    }
}
