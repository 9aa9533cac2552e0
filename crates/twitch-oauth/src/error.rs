use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Everything that can stop the authentication flow.
///
/// None of these are recovered from locally; callers report them and exit.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("client credentials file '{}' does not exist", .path.display())]
    ConfigMissing { path: PathBuf },

    #[error("failed to read client credentials file '{}'", .path.display())]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse client credentials file '{}'", .path.display())]
    ConfigMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot determine the user's home directory")]
    HomeDirUnavailable,

    #[error("stored token file '{}' is unusable: {reason}", .path.display())]
    StorageCorrupt { path: PathBuf, reason: String },

    #[error("failed to store token file '{}'", .path.display())]
    StorageWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot bind OAuth callback server to {addr}")]
    PortUnavailable {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("authorization denied by provider: {}", describe(.error, .description))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("OAuth callback carried neither a code nor an error")]
    MissingCode,

    #[error("OAuth callback state does not match the pending authorization")]
    StateMismatch,

    #[error("OAuth callback server stopped before delivering a result")]
    CallbackClosed,

    #[error("no authorization received within {} seconds", .0.as_secs())]
    ConsentTimeout(Duration),

    #[error("interrupted")]
    Interrupted,

    #[error("user did not grant consent: {reason}")]
    UserDeniedConsent { reason: String },

    #[error("exchanging authorization code for token failed: {0}")]
    ExchangeFailed(String),

    #[error(
        "refreshing token failed: {0} (delete the stored token file and run again to re-authorize)"
    )]
    RefreshFailed(String),

    #[error("credential cannot be sent as a request header: {0}")]
    InvalidCredential(String),

    #[error("failed to build HTTP client")]
    HttpClient(#[from] reqwest::Error),
}

pub(crate) fn describe(error: &str, description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!("{} ({})", error, d),
        _ => error.to_string(),
    }
}
