//! Authentication state machine.
//!
//! A cached token is refreshed once per run. Without one, the user is sent
//! through the consent page and the returned code is exchanged. Either way
//! the resulting token is stored before it is handed out. Failures are never
//! retried: a refresh failure does not fall back to the consent flow.
//!
//! Ctrl-C is left to the caller. Dropping the `authenticate` future at any
//! point stops the callback server and writes nothing.

use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, info};

use crate::callback::{CallbackConfig, CallbackHandle, CallbackReceiver};
use crate::error::{AuthError, AuthResult, describe};
use crate::exchange::TokenExchanger;
use crate::store::CredentialStore;
use crate::{AuthorizationCode, Credential, OAUTH_SCOPE, TWITCH_AUTH_URL};

/// Progress of an `Authenticator` run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    NoCredential,
    AwaitingConsent,
    Exchanging,
    Refreshing,
    Ready,
}

/// Shows the authorization URL to the user
pub trait ConsentPrompt {
    /// Called once per consent flow, after the callback server is listening
    fn present(&self, authorization_url: &str);
}

/// Prints the authorization URL on stderr for the user to open
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl ConsentPrompt for TerminalPrompt {
    fn present(&self, authorization_url: &str) {
        eprintln!("\n=================================================");
        eprintln!("OAuth 2.0 Authorization Required");
        eprintln!("=================================================");
        eprintln!("\nOpen your browser to:\n");
        eprintln!("{}\n", authorization_url);
        eprintln!("Waiting for authorization...");
        eprintln!("=================================================\n");
    }
}

/// Drives one authentication run: refresh a cached token or ask for consent
pub struct Authenticator<P = TerminalPrompt> {
    store: CredentialStore,
    exchanger: TokenExchanger,
    callback: CallbackConfig,
    authorize_url: String,
    consent_timeout: Option<Duration>,
    prompt: P,
    state: AuthState,
}

impl Authenticator<TerminalPrompt> {
    /// Create new authenticator with the default callback and authorize URL
    pub fn new(store: CredentialStore, exchanger: TokenExchanger) -> Self {
        Self {
            store,
            exchanger,
            callback: CallbackConfig::default(),
            authorize_url: TWITCH_AUTH_URL.to_string(),
            consent_timeout: None,
            prompt: TerminalPrompt,
            state: AuthState::NoCredential,
        }
    }
}

impl<P: ConsentPrompt> Authenticator<P> {
    /// Replace how the authorization URL is shown to the user
    pub fn with_prompt<Q: ConsentPrompt>(self, prompt: Q) -> Authenticator<Q> {
        Authenticator {
            store: self.store,
            exchanger: self.exchanger,
            callback: self.callback,
            authorize_url: self.authorize_url,
            consent_timeout: self.consent_timeout,
            prompt,
            state: self.state,
        }
    }

    /// Listen for the redirect on another port or path
    pub fn with_callback(mut self, callback: CallbackConfig) -> Self {
        self.callback = callback;
        self
    }

    /// Use another authorization endpoint
    pub fn with_authorize_url(mut self, authorize_url: impl Into<String>) -> Self {
        self.authorize_url = authorize_url.into();
        self
    }

    /// Bound the wait for the user's consent; `None` waits indefinitely
    pub fn with_consent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.consent_timeout = timeout;
        self
    }

    /// Current state of the run
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Storage the credential is loaded from and saved to
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Produce a fresh credential and persist it.
    pub async fn authenticate(&mut self) -> AuthResult<Credential> {
        let credential = match self.store.load_credential()? {
            Some(cached) => {
                self.transition(AuthState::Refreshing);
                self.exchanger.refresh(&cached).await?
            }
            None => {
                self.transition(AuthState::AwaitingConsent);
                self.authorize().await?
            }
        };

        self.store.save_credential(&credential)?;
        self.transition(AuthState::Ready);
        info!(
            token_file = %self.store.credential_path().display(),
            "Authenticated"
        );
        Ok(credential)
    }

    /// Interactive consent followed by the code exchange
    async fn authorize(&mut self) -> AuthResult<Credential> {
        let state = generate_state();
        let receiver = CallbackReceiver::start(&self.callback, Some(state.clone())).await?;
        let redirect_uri = receiver.redirect_uri();

        let url = authorization_url(
            &self.authorize_url,
            &self.exchanger.identity().id,
            &redirect_uri,
            &state,
        );
        self.prompt.present(&url);

        let code = wait_for_code(receiver, self.consent_timeout)
            .await
            .map_err(|e| match e {
                AuthError::AuthorizationDenied { error, description } => {
                    AuthError::UserDeniedConsent {
                        reason: describe(&error, &description),
                    }
                }
                other => other,
            })?;

        self.transition(AuthState::Exchanging);
        self.exchanger.exchange_code(code, &redirect_uri).await
    }

    fn transition(&mut self, next: AuthState) {
        debug!(from = ?self.state, to = ?next, "Authentication state changed");
        self.state = next;
    }
}

/// Wait for the callback, giving up after `timeout` if one is set.
///
/// On timeout the handle is dropped, which stops the server.
async fn wait_for_code(
    receiver: CallbackHandle,
    timeout: Option<Duration>,
) -> AuthResult<AuthorizationCode> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, receiver.await_code()).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::ConsentTimeout(limit)),
        },
        None => receiver.await_code().await,
    }
}

/// Run `task` unless Ctrl-C arrives first, in which case `task` is dropped.
///
/// Meant to wrap a binary's whole run: once installed, the Ctrl-C handler
/// replaces the default terminate action for the rest of the process.
pub async fn until_interrupted<T, E>(task: impl Future<Output = Result<T, E>>) -> Result<T, E>
where
    E: From<AuthError>,
{
    tokio::select! {
        biased;
        _ = interrupted() => Err(AuthError::Interrupted.into()),
        result = task => result,
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Random anti-forgery value echoed back by the provider
fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Generate authorization URL
pub fn authorization_url(
    authorize_url: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
) -> String {
    format!(
        "{}?\
        client_id={}&\
        redirect_uri={}&\
        response_type=code&\
        scope={}&\
        state={}",
        authorize_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(OAUTH_SCOPE),
        urlencoding::encode(state),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url() {
        let url = authorization_url(
            TWITCH_AUTH_URL,
            "my client",
            "http://localhost:9001/callback",
            "abc",
        );
        assert_eq!(
            url,
            "https://id.twitch.tv/oauth2/authorize?client_id=my%20client&\
            redirect_uri=http%3A%2F%2Flocalhost%3A9001%2Fcallback&response_type=code&\
            scope=user%3Aread%3Afollows&state=abc"
        );
    }

    #[test]
    fn test_state_is_random() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
