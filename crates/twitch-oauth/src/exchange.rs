//! Calls to the provider's token endpoint.

use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::error::{AuthError, AuthResult};
use crate::{AuthorizationCode, ClientIdentity, Credential, TWITCH_TOKEN_URL, unix_now};

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Error payload; Twitch sends `message`, RFC 6749 providers `error`
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Exchanges authorization codes and refresh tokens for access tokens
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    identity: ClientIdentity,
    token_url: String,
    http: reqwest::Client,
}

impl TokenExchanger {
    /// Exchanger talking to the Twitch token endpoint
    pub fn new(identity: ClientIdentity) -> Self {
        Self::with_token_url(identity, TWITCH_TOKEN_URL)
    }

    /// Exchanger talking to another token endpoint
    pub fn with_token_url(identity: ClientIdentity, token_url: impl Into<String>) -> Self {
        Self {
            identity,
            token_url: token_url.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Client identity sent with every token request
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Exchange authorization code for tokens.
    ///
    /// The code is consumed; a failed exchange has to restart the whole
    /// authorization.
    #[instrument(skip_all)]
    pub async fn exchange_code(
        &self,
        code: AuthorizationCode,
        redirect_uri: &str,
    ) -> AuthResult<Credential> {
        debug!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.identity.id.as_str()),
            ("client_secret", self.identity.secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self
            .request(&params)
            .await
            .map_err(AuthError::ExchangeFailed)?;

        let refresh_token = response.refresh_token.clone().ok_or_else(|| {
            AuthError::ExchangeFailed("missing refresh_token in token response".to_string())
        })?;
        let credential = credential_from(response, refresh_token);

        info!("Obtained OAuth tokens");
        Ok(credential)
    }

    /// Obtain a fresh access token without user interaction.
    ///
    /// The previous refresh token is kept when the provider does not rotate it.
    #[instrument(skip_all)]
    pub async fn refresh(&self, credential: &Credential) -> AuthResult<Credential> {
        debug!("Refreshing OAuth token");

        let params = [
            ("client_id", self.identity.id.as_str()),
            ("client_secret", self.identity.secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", credential.refresh_token.as_str()),
        ];

        let response = self
            .request(&params)
            .await
            .map_err(AuthError::RefreshFailed)?;

        let refresh_token = response
            .refresh_token
            .clone()
            .unwrap_or_else(|| credential.refresh_token.clone());
        let refreshed = credential_from(response, refresh_token);

        info!("OAuth token refreshed");
        Ok(refreshed)
    }

    /// POST a form to the token endpoint; errors are rendered for the caller
    /// to wrap in the variant describing the step.
    async fn request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| format!("request to {} failed: {}", self.token_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read token response: {}", e))?;

        if !status.is_success() {
            return Err(format!("status {}: {}", status, provider_message(&body)));
        }

        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {}", e))
    }
}

fn credential_from(response: TokenResponse, refresh_token: String) -> Credential {
    Credential {
        access_token: response.access_token,
        refresh_token,
        token_type: response.token_type.unwrap_or_else(|| "bearer".to_string()),
        expires_at: response.expires_in.map(|secs| unix_now() + secs),
    }
}

/// Best human-readable message in an error body
fn provider_message(body: &str) -> String {
    match serde_json::from_str::<TokenErrorResponse>(body) {
        Ok(TokenErrorResponse {
            message: Some(message),
            ..
        }) => message,
        Ok(TokenErrorResponse {
            error_description: Some(description),
            ..
        }) => description,
        Ok(TokenErrorResponse {
            error: Some(error), ..
        }) => error,
        _ => body.trim().to_string(),
    }
}
