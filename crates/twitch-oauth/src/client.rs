//! HTTP client for API calls made with a stored credential

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};

use crate::error::{AuthError, AuthResult};
use crate::{ClientIdentity, Credential};

/// Header identifying the application on every API request
pub const CLIENT_ID_HEADER: &str = "client-id";

/// HTTP client sending the bearer credential and client id with every request.
///
/// The credential is not refreshed during the client's lifetime.
pub fn authenticated_client(
    identity: &ClientIdentity,
    credential: &Credential,
) -> AuthResult<reqwest::Client> {
    let mut authorization = HeaderValue::from_str(&credential.authorization_header())
        .map_err(|e| AuthError::InvalidCredential(format!("access token: {}", e)))?;
    authorization.set_sensitive(true);

    let client_id = HeaderValue::from_str(&identity.id)
        .map_err(|e| AuthError::InvalidCredential(format!("client id: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, authorization);
    headers.insert(HeaderName::from_static(CLIENT_ID_HEADER), client_id);

    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}
