//! OAuth2 building blocks: dynamic client registration, PKCE and the
//! authorization code exchange.

use crate::error::{OpenApiError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

/// Client issued by the authorization server's registration endpoint.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct RegisteredClient {
    pub client_id: String,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for RegisteredClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: [&'a str; 1],
    grant_types: [&'a str; 1],
    response_types: [&'a str; 1],
    token_endpoint_auth_method: &'a str,
}

#[derive(Deserialize)]
struct RegistrationResponse {
    client_id: String,
    client_secret: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Registration endpoint next to `token_url`: a trailing `/token` segment
/// becomes `/register`; without one, `/register` at the server root.
pub(crate) fn registration_url(token_url: &str) -> Result<String> {
    let mut url = Url::parse(token_url)
        .map_err(|e| OpenApiError::auth(format!("Invalid token URL '{token_url}': {e}")))?;

    let path = url.path().trim_end_matches('/').to_string();
    let register_path = match path.strip_suffix("/token") {
        Some(prefix) => format!("{prefix}/register"),
        None => "/register".to_string(),
    };

    url.set_path(&register_path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Register a public client for the authorization code grant.
#[instrument(skip(http))]
pub(crate) async fn register_client(
    http: &reqwest::Client,
    token_url: &str,
    client_name: &str,
    redirect_uri: &str,
) -> Result<RegisteredClient> {
    let url = registration_url(token_url)?;
    debug!("Registering OAuth client at {}", url);

    let request = RegistrationRequest {
        client_name,
        redirect_uris: [redirect_uri],
        grant_types: ["authorization_code"],
        response_types: ["code"],
        token_endpoint_auth_method: "none",
    };

    let response = http
        .post(&url)
        .json(&request)
        .send()
        .await
        .map_err(|e| OpenApiError::auth(format!("Client registration request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenApiError::auth(format!(
            "Client registration failed: HTTP {status}: {body}"
        )));
    }

    let registration: RegistrationResponse = response
        .json()
        .await
        .map_err(|e| OpenApiError::auth(format!("Invalid client registration response: {e}")))?;

    Ok(RegisteredClient {
        client_id: registration.client_id,
        client_secret: registration.client_secret,
    })
}

/// PKCE verifier and its S256 challenge.
pub(crate) struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = random_token();
        let challenge = Self::challenge_for(&verifier);
        Self {
            verifier,
            challenge,
        }
    }

    pub fn challenge_for(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

/// 32 random bytes, base64url without padding (43 characters).
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn authorization_url(
    authorization_endpoint: &str,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
    scopes: &[String],
) -> Result<String> {
    let mut url = Url::parse(authorization_endpoint).map_err(|e| {
        OpenApiError::auth(format!(
            "Invalid authorization URL '{authorization_endpoint}': {e}"
        ))
    })?;

    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code_challenge", challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", state);
        if !scopes.is_empty() {
            query.append_pair("scope", &scopes.join(" "));
        }
    }

    Ok(url.to_string())
}

/// Exchange an authorization code for an access token.
#[instrument(skip(http, code, client, verifier))]
pub(crate) async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    code: &str,
    redirect_uri: &str,
    client: &RegisteredClient,
    verifier: &str,
) -> Result<String> {
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client.client_id.as_str()),
        ("code_verifier", verifier),
    ];
    if let Some(secret) = &client.client_secret {
        form.push(("client_secret", secret.as_str()));
    }

    let response = http
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(|e| OpenApiError::auth(format!("Token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenApiError::auth(format!(
            "Token exchange failed: HTTP {status}: {body}"
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| OpenApiError::auth(format!("Invalid token response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(OpenApiError::auth("Token response carried an empty access_token"));
    }
    Ok(token.access_token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_url_derivation() {
        assert_eq!(
            registration_url("https://auth.example.com/oauth/token").unwrap(),
            "https://auth.example.com/oauth/register"
        );
        assert_eq!(
            registration_url("https://auth.example.com/oauth2/v1/access").unwrap(),
            "https://auth.example.com/register"
        );
        assert!(registration_url("not a url").is_err());
    }

    #[test]
    fn test_pkce_challenge() {
        // RFC 7636 appendix B
        assert_eq!(
            Pkce::challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );

        let pkce = Pkce::generate();
        assert_eq!(pkce.verifier.len(), 43);
        assert_eq!(pkce.challenge, Pkce::challenge_for(&pkce.verifier));
        assert_ne!(random_token(), random_token());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let url = authorization_url(
            "https://auth.example.com/authorize",
            "client-1",
            "http://localhost:8765/callback",
            "challenge",
            "state-1",
            &["read".to_string(), "write".to_string()],
        )
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8765/callback");
        assert_eq!(pairs["scope"], "read write");
    }

    #[tokio::test]
    async fn test_register_and_exchange() {
        let mut server = mockito::Server::new_async().await;
        let register = server
            .mock("POST", "/oauth/register")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "token_endpoint_auth_method": "none",
                "grant_types": ["authorization_code"]
            })))
            .with_status(201)
            .with_body(r#"{"client_id": "abc", "client_secret": "shh"}"#)
            .create_async()
            .await;
        let token = server
            .mock("POST", "/oauth/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("code".into(), "the-code".into()),
                mockito::Matcher::UrlEncoded("code_verifier".into(), "v".into()),
                mockito::Matcher::UrlEncoded("client_secret".into(), "shh".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token": "tok", "token_type": "Bearer"}"#)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let token_url = format!("{}/oauth/token", server.url());
        let client = register_client(&http, &token_url, "otk", "http://localhost:1/callback")
            .await
            .unwrap();
        assert_eq!(client.client_id, "abc");

        let access = exchange_code(&http, &token_url, "the-code", "http://localhost:1/callback", &client, "v")
            .await
            .unwrap();
        assert_eq!(access, "tok");

        register.assert_async().await;
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_registration_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/register")
            .with_status(400)
            .with_body("invalid_redirect_uri")
            .create_async()
            .await;

        let err = register_client(
            &reqwest::Client::new(),
            &format!("{}/token", server.url()),
            "otk",
            "http://localhost:1/callback",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, OpenApiError::Authentication(_)));
        assert!(err.to_string().contains("invalid_redirect_uri"));
    }
}
