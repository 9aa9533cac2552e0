//! OAuth 2.0 authorization code flow for the Twitch API.
//!
//! Loads the application's client identity, reuses and refreshes a cached
//! user token, or runs the interactive consent flow through a local callback
//! server when no token is cached yet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod exchange;
pub mod flow;
pub mod logging;
pub mod store;

pub use callback::{CallbackConfig, CallbackHandle, CallbackReceiver};
pub use client::authenticated_client;
pub use config::OAuthEndpoints;
pub use error::{AuthError, AuthResult};
pub use exchange::TokenExchanger;
pub use flow::{AuthState, Authenticator, ConsentPrompt, TerminalPrompt, until_interrupted};
pub use store::CredentialStore;

/// Default OAuth callback port, registered with the application's redirect URL
pub const OAUTH_CALLBACK_PORT: u16 = 9001;

/// Path of the OAuth callback endpoint
pub const OAUTH_CALLBACK_PATH: &str = "callback";

/// Scope requested from the user
pub const OAUTH_SCOPE: &str = "user:read:follows";

/// Twitch authorization endpoint
pub const TWITCH_AUTH_URL: &str = "https://id.twitch.tv/oauth2/authorize";

/// Twitch token endpoint
pub const TWITCH_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Application identity registered with the provider
#[derive(Clone, Deserialize)]
pub struct ClientIdentity {
    /// OAuth client ID
    pub id: String,
    /// OAuth client secret
    pub secret: String,
}

impl fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// OAuth 2.0 token information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token for API requests
    pub access_token: String,
    /// Refresh token for getting new access tokens
    pub refresh_token: String,
    /// Token type as reported by the provider (usually "bearer")
    pub token_type: String,
    /// Expiry time as Unix timestamp (seconds since epoch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl Credential {
    /// Check if the token is expired or will expire soon (within 60 seconds).
    ///
    /// A token without a known expiry is never considered expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => unix_now() + 60 >= expires_at,
            None => false,
        }
    }

    /// Authorization scheme to present with the access token
    pub fn scheme(&self) -> &str {
        if self.token_type.is_empty() || self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            &self.token_type
        }
    }

    /// Value of the `Authorization` header for this credential
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.scheme(), self.access_token)
    }
}

/// One-time authorization code delivered to the callback.
///
/// Deliberately not `Clone`: the exchange call consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    /// Wrap a code received on the callback
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Raw code as sent to the token endpoint
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Seconds since the Unix epoch; clocks before 1970 read as zero.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
