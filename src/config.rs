use twitch_oauth::OAuthEndpoints;
use twitch_oauth::config::env_or;

use crate::helix::HELIX_BASE;

/// Remote endpoints, overridable through the environment
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub oauth: OAuthEndpoints,
    pub api_base: String,
}

impl Endpoints {
    /// Read `TWITCH_AUTH_URL`, `TWITCH_TOKEN_URL` and `TWITCH_API_BASE`,
    /// defaulting to the public Twitch endpoints
    pub fn from_env() -> Self {
        Self {
            oauth: OAuthEndpoints::from_env(),
            api_base: api_base(&env_or("TWITCH_API_BASE", HELIX_BASE)),
        }
    }
}

fn api_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
