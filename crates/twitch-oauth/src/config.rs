//! Endpoint overrides read from the environment

use crate::{TWITCH_AUTH_URL, TWITCH_TOKEN_URL};

/// Provider endpoints used by the authentication flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for OAuthEndpoints {
    fn default() -> Self {
        Self {
            auth_url: TWITCH_AUTH_URL.to_string(),
            token_url: TWITCH_TOKEN_URL.to_string(),
        }
    }
}

impl OAuthEndpoints {
    /// Read `TWITCH_AUTH_URL` and `TWITCH_TOKEN_URL`, defaulting to Twitch
    pub fn from_env() -> Self {
        Self {
            auth_url: env_or("TWITCH_AUTH_URL", TWITCH_AUTH_URL),
            token_url: env_or("TWITCH_TOKEN_URL", TWITCH_TOKEN_URL),
        }
    }
}

/// Value of the environment variable `name`, or `default` when unset
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
