//! Local HTTP server receiving the OAuth redirect.
//!
//! The server answers exactly one callback. Its outcome travels to the
//! waiting flow through a oneshot channel and the server is stopped as soon
//! as that outcome has been read, or when the handle is dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    response::Html,
    routing::get,
};
use serde::Deserialize;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, AuthResult};
use crate::{AuthorizationCode, OAUTH_CALLBACK_PATH, OAUTH_CALLBACK_PORT};

/// Where the callback server listens.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Local port; must match the registered redirect URL
    pub port: u16,
    /// Callback path, without the leading slash
    pub path: String,
}

impl CallbackConfig {
    /// Create new config; a leading `/` on `path` is ignored
    pub fn new(port: u16, path: impl Into<String>) -> Self {
        Self {
            port,
            path: path.into().trim_start_matches('/').to_string(),
        }
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self::new(OAUTH_CALLBACK_PORT, OAUTH_CALLBACK_PATH)
    }
}

/// Query parameters of the OAuth redirect
#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

type CallbackOutcome = AuthResult<AuthorizationCode>;

struct ServerState {
    /// Taken by the first callback; later requests find it empty
    result_tx: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
    expected_state: Option<String>,
}

/// Starts the local server the provider redirects to
pub struct CallbackReceiver;

impl CallbackReceiver {
    /// Bind the callback port and start serving in the background.
    ///
    /// When `expected_state` is set, a callback carrying a different `state`
    /// is rejected.
    pub async fn start(
        config: &CallbackConfig,
        expected_state: Option<String>,
    ) -> AuthResult<CallbackHandle> {
        let (result_tx, result_rx) = oneshot::channel();

        let state = Arc::new(ServerState {
            result_tx: Mutex::new(Some(result_tx)),
            expected_state,
        });

        let app = Router::new()
            .route(&format!("/{}", config.path), get(handle_callback))
            .with_state(state);

        let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::PortUnavailable { addr, source: e })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::PortUnavailable { addr, source: e })?;

        info!(addr = %local_addr, path = %config.path, "Started OAuth callback server");

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "OAuth callback server failed");
            }
        });

        Ok(CallbackHandle {
            result_rx: Some(result_rx),
            server: Some(server),
            local_addr,
            path: config.path.clone(),
        })
    }
}

/// A running callback server.
///
/// Dropping the handle stops the server.
pub struct CallbackHandle {
    result_rx: Option<oneshot::Receiver<CallbackOutcome>>,
    server: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
    path: String,
}

impl CallbackHandle {
    /// Address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URL to register with the authorization request.
    ///
    /// `localhost` reaches the IPv4 loopback the server is bound to.
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/{}", self.local_addr.port(), self.path)
    }

    /// Wait for the first callback, then stop the server.
    ///
    /// The port is free again once this returns.
    pub async fn await_code(mut self) -> AuthResult<AuthorizationCode> {
        let result_rx = self.result_rx.take().ok_or(AuthError::CallbackClosed)?;
        let outcome = result_rx
            .await
            .unwrap_or_else(|_| Err(AuthError::CallbackClosed));
        self.shutdown().await;
        outcome
    }

    async fn shutdown(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
            let _ = server.await;
            info!(addr = %self.local_addr, "Stopped OAuth callback server");
        }
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
            debug!(addr = %self.local_addr, "OAuth callback server aborted");
        }
    }
}

async fn handle_callback(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<CallbackParams>,
) -> Html<String> {
    let Some(tx) = state.result_tx.lock().await.take() else {
        debug!("Ignoring OAuth callback received after completion");
        return Html(page(
            "Authorization Already Completed",
            "This authorization has already been handled. You can close this window.",
        ));
    };

    let outcome = evaluate(params, state.expected_state.as_deref());
    let html = match &outcome {
        Ok(_) => {
            info!("Received authorization code");
            page(
                "Authorization Successful!",
                "You can close this window and return to the application.",
            )
        }
        Err(e) => {
            warn!(error = %e, "OAuth callback did not carry a usable code");
            page(
                "Authorization Failed",
                &format!("Error: {}. You can close this window.", escape(&e.to_string())),
            )
        }
    };

    // The receiver only disappears when the flow was abandoned
    let _ = tx.send(outcome);
    Html(html)
}

fn evaluate(params: CallbackParams, expected_state: Option<&str>) -> CallbackOutcome {
    if let Some(error) = params.error {
        return Err(AuthError::AuthorizationDenied {
            error,
            description: params.error_description,
        });
    }

    if let Some(expected) = expected_state {
        if params.state.as_deref() != Some(expected) {
            return Err(AuthError::StateMismatch);
        }
    }

    params
        .code
        .filter(|code| !code.is_empty())
        .map(AuthorizationCode::new)
        .ok_or(AuthError::MissingCode)
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<html><body><h1>{}</h1><p>{}</p></body></html>",
        title, message
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
