//! Loopback listener receiving the OAuth2 authorization redirect.

use crate::error::{OpenApiError, Result};
use axum::Router;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// How long in-flight connections may take to finish after the outcome.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type Outcome = Result<String>;

#[derive(Clone)]
struct CallbackState {
    expected_state: Arc<str>,
    sender: Arc<Mutex<Option<oneshot::Sender<Outcome>>>>,
}

/// A bound, not yet serving, callback listener.
pub(crate) struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind `127.0.0.1:port`. A port already in use is an auth error.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.map_err(|e| {
            OpenApiError::auth(format!(
                "Cannot listen for the OAuth callback on port {port}: {e}"
            ))
        })?;
        debug!("OAuth callback listener bound on port {}", port);
        Ok(Self { listener, port })
    }

    /// Serve `/callback` until one redirect arrives or `timeout` elapses.
    ///
    /// The listener is shut down and the port released on every outcome.
    pub async fn wait_for_code(self, expected_state: &str, timeout: Duration) -> Result<String> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState {
            expected_state: Arc::from(expected_state),
            sender: Arc::new(Mutex::new(Some(outcome_tx))),
        };
        let app = Router::new()
            .route("/callback", get(handle_callback))
            .with_state(state);

        let listener = self.listener;
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let outcome = match tokio::time::timeout(timeout, outcome_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(OpenApiError::auth(
                "OAuth callback listener stopped before a redirect arrived",
            )),
            Err(_) => Err(OpenApiError::auth(format!(
                "Timed out after {}s waiting for the OAuth callback",
                timeout.as_secs()
            ))),
        };

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut server).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("OAuth callback listener failed: {}", e),
            Ok(Err(e)) => warn!("OAuth callback listener task failed: {}", e),
            Err(_) => {
                server.abort();
                let _ = server.await;
            }
        }
        debug!("OAuth callback listener on port {} closed", self.port);

        outcome
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    params: std::result::Result<Query<CallbackParams>, QueryRejection>,
) -> impl IntoResponse {
    let outcome = match params {
        Ok(Query(params)) => evaluate(&params, &state.expected_state),
        Err(rejection) => Err(OpenApiError::auth(format!(
            "OAuth callback query is malformed: {}",
            rejection.body_text()
        ))),
    };
    let page = match &outcome {
        Ok(_) => page(
            "Authorization complete",
            "You can close this window and return to the terminal.",
        ),
        Err(e) => page("Authorization failed", &e.to_string()),
    };

    let sender = state
        .sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match sender {
        Some(sender) => {
            let _ = sender.send(outcome);
        }
        None => debug!("Ignoring repeated OAuth callback"),
    }

    ([(header::CONNECTION, "close")], Html(page))
}

fn evaluate(params: &CallbackParams, expected_state: &str) -> Outcome {
    if params.state.as_deref() != Some(expected_state) {
        return Err(OpenApiError::auth(
            "OAuth callback state does not match the authorization request",
        ));
    }

    if let Some(error) = &params.error {
        let detail = params
            .error_description
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        return Err(OpenApiError::auth(format!(
            "Authorization server returned error '{error}'{detail}"
        )));
    }

    match params.code.as_deref().filter(|c| !c.is_empty()) {
        Some(code) => Ok(code.to_string()),
        None => Err(OpenApiError::auth(
            "OAuth callback carried neither an authorization code nor an error",
        )),
    }
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
