//! End-to-end OAuth2 authorization code flow against a mock provider.
//!
//! The "browser" follows the authorization URL straight to the loopback
//! redirect listener with whatever query the test scripts.

use otk_openapi::{
    AuthConfig, AuthManager, AuthSettings, AuthState, BrowserLauncher, OpenApiToolset,
    ToolsetOptions,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// How the fake browser answers the authorization request.
#[derive(Clone)]
enum Redirect {
    /// Echo the state back with this code
    Code(&'static str),
    /// Redirect with `error=...`
    Error(&'static str),
    /// Redirect without code or error
    Empty,
    /// Redirect with a code and a forged state
    WrongState,
    /// Redirect with an error and a forged state
    ForgedError,
    /// Never redirect
    Never,
}

struct FakeBrowser {
    redirect: Redirect,
    opened: Mutex<Vec<String>>,
}

impl FakeBrowser {
    fn new(redirect: Redirect) -> Arc<Self> {
        Arc::new(Self {
            redirect,
            opened: Mutex::new(Vec::new()),
        })
    }

    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl BrowserLauncher for FakeBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().unwrap().push(url.to_string());

        let authorize = Url::parse(url)?;
        let param = |key: &str| {
            authorize
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let state = param("state").unwrap_or_default();
        let redirect_uri = Url::parse(&param("redirect_uri").unwrap_or_default())?;
        let port = redirect_uri.port().unwrap_or(80);

        let mut callback = Url::parse(&format!("http://127.0.0.1:{port}/callback"))?;
        match &self.redirect {
            Redirect::Code(code) => {
                callback
                    .query_pairs_mut()
                    .append_pair("code", code)
                    .append_pair("state", &state);
            }
            Redirect::Error(error) => {
                callback
                    .query_pairs_mut()
                    .append_pair("error", error)
                    .append_pair("error_description", "user said no")
                    .append_pair("state", &state);
            }
            Redirect::Empty => {
                callback.query_pairs_mut().append_pair("state", &state);
            }
            Redirect::WrongState => {
                callback
                    .query_pairs_mut()
                    .append_pair("code", "abc")
                    .append_pair("state", "forged");
            }
            Redirect::ForgedError => {
                callback
                    .query_pairs_mut()
                    .append_pair("error", "access_denied")
                    .append_pair("state", "forged");
            }
            Redirect::Never => return Ok(()),
        }

        tokio::spawn(async move {
            let _ = reqwest::get(callback).await;
        });
        Ok(())
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn settings(port: u16, timeout: Duration) -> AuthSettings {
    AuthSettings {
        callback_port: port,
        timeout,
        client_name: "otk-test".to_string(),
        open_browser: true,
    }
}

fn oauth_config(server: &mockito::Server) -> AuthConfig {
    AuthConfig::OAuth2 {
        authorization_url: format!("{}/oauth/authorize", server.url()),
        token_url: format!("{}/oauth/token", server.url()),
        scopes: vec!["read".to_string(), "write".to_string()],
    }
}

async fn mock_registration(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("POST", "/oauth/register")
        .match_body(mockito::Matcher::PartialJson(json!({
            "client_name": "otk-test",
            "grant_types": ["authorization_code"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none"
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"client_id": "client-123"}"#)
        .create_async()
        .await
}

fn manager(server: &mockito::Server, browser: Arc<FakeBrowser>, port: u16) -> AuthManager {
    AuthManager::new(oauth_config(server))
        .with_settings(settings(port, Duration::from_secs(5)))
        .with_browser(browser)
}

#[tokio::test]
async fn test_oauth_flow_end_to_end() {
    let mut server = mockito::Server::new_async().await;
    let register = mock_registration(&mut server).await;
    let token = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            mockito::Matcher::UrlEncoded("code".into(), "abc".into()),
            mockito::Matcher::UrlEncoded("client_id".into(), "client-123".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "tok-xyz", "token_type": "Bearer"}"#)
        .create_async()
        .await;
    let api = server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok-xyz")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"login": "ann"}"#)
        .create_async()
        .await;

    let spec = format!(
        r#"
openapi: 3.0.0
info: {{title: OAuth API, version: "1"}}
paths:
  /me:
    get:
      operationId: whoami
      responses: {{'200': {{description: OK}}}}
security:
  - oauth: [read]
components:
  securitySchemes:
    oauth:
      type: oauth2
      flows:
        authorizationCode:
          authorizationUrl: {url}/oauth/authorize
          tokenUrl: {url}/oauth/token
          scopes:
            read: Read access
"#,
        url = server.url()
    );

    let port = free_port();
    let browser = FakeBrowser::new(Redirect::Code("abc"));
    let toolset = OpenApiToolset::from_str(
        &spec,
        ToolsetOptions::default()
            .with_base_url(server.url())
            .with_browser(browser.clone())
            .with_auth_settings(settings(port, Duration::from_secs(5))),
    )
    .unwrap();

    assert!(toolset.requires_auth());
    toolset.authenticate().await.unwrap();

    assert!(toolset.auth().is_authenticated());
    assert_eq!(toolset.auth().oauth_client_id().as_deref(), Some("client-123"));

    let opened = browser.opened();
    assert_eq!(opened.len(), 1);
    let authorize = Url::parse(&opened[0]).unwrap();
    assert_eq!(authorize.path(), "/oauth/authorize");
    let query: Vec<(String, String)> = authorize.query_pairs().into_owned().collect();
    assert!(query.contains(&("response_type".into(), "code".into())));
    assert!(query.contains(&("client_id".into(), "client-123".into())));
    assert!(query.contains(&("code_challenge_method".into(), "S256".into())));
    assert!(query.contains(&("scope".into(), "read".into())));
    assert!(query.contains(&(
        "redirect_uri".into(),
        format!("http://127.0.0.1:{port}/callback")
    )));

    let me = toolset
        .get_tool("whoami")
        .unwrap()
        .invoke(json!({}))
        .await
        .unwrap();
    assert_eq!(me["login"], "ann");

    register.assert_async().await;
    token.assert_async().await;
    api.assert_async().await;
}

#[tokio::test]
async fn test_provider_error_is_reported() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;

    let auth = manager(&server, FakeBrowser::new(Redirect::Error("access_denied")), free_port());
    let err = auth.authenticate(None).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("access_denied"), "{message}");
    assert!(message.contains("user said no"), "{message}");
    assert!(matches!(auth.state(), AuthState::Unauthenticated));
}

#[tokio::test]
async fn test_malformed_callback_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;

    let auth = manager(&server, FakeBrowser::new(Redirect::Empty), free_port());
    let err = auth.authenticate(None).await.unwrap_err();
    assert!(
        err.to_string()
            .contains("neither an authorization code nor an error")
    );
}

#[tokio::test]
async fn test_state_mismatch_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;
    let token = server
        .mock("POST", "/oauth/token")
        .expect(0)
        .create_async()
        .await;

    let auth = manager(&server, FakeBrowser::new(Redirect::WrongState), free_port());
    let err = auth.authenticate(None).await.unwrap_err();
    assert!(err.to_string().contains("state does not match"));
    assert!(!auth.is_authenticated());
    token.assert_async().await;
}

#[tokio::test]
async fn test_error_with_forged_state_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;

    let auth = manager(&server, FakeBrowser::new(Redirect::ForgedError), free_port());
    let err = auth.authenticate(None).await.unwrap_err();
    assert!(err.to_string().contains("state does not match"), "{err}");
    assert!(!err.to_string().contains("access_denied"));
}

#[tokio::test]
async fn test_callback_timeout_releases_port() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;

    let port = free_port();
    let auth = AuthManager::new(oauth_config(&server))
        .with_settings(settings(port, Duration::from_secs(1)))
        .with_browser(FakeBrowser::new(Redirect::Never));

    let err = auth.authenticate(None).await.unwrap_err();
    assert!(err.to_string().contains("Timed out after 1s"), "{err}");
    assert!(matches!(auth.state(), AuthState::Unauthenticated));

    let rebound = tokio::net::TcpListener::bind(("127.0.0.1", port)).await;
    assert!(rebound.is_ok(), "callback port still held after the flow");
}

#[tokio::test]
async fn test_port_conflict_fails_before_registration() {
    let mut server = mockito::Server::new_async().await;
    let register = server
        .mock("POST", "/oauth/register")
        .expect(0)
        .create_async()
        .await;

    let holder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    let browser = FakeBrowser::new(Redirect::Code("abc"));
    let auth = manager(&server, browser.clone(), port);
    let err = auth.authenticate(None).await.unwrap_err();

    assert!(err.to_string().contains(&port.to_string()), "{err}");
    assert!(browser.opened().is_empty());
    register.assert_async().await;
}

#[tokio::test]
async fn test_retry_after_failure_succeeds() {
    let mut server = mockito::Server::new_async().await;
    mock_registration(&mut server).await;
    server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "second-try"}"#)
        .create_async()
        .await;

    let port = free_port();
    let failing = AuthManager::new(oauth_config(&server))
        .with_settings(settings(port, Duration::from_secs(5)))
        .with_browser(FakeBrowser::new(Redirect::Error("temporarily_unavailable")));
    assert!(failing.authenticate(None).await.is_err());

    let auth = manager(&server, FakeBrowser::new(Redirect::Code("abc")), port);
    auth.authenticate(None).await.unwrap();
    assert_eq!(
        auth.auth_headers(None)["Authorization"],
        "Bearer second-try"
    );
}
