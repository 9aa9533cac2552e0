//! End-to-end runs of the authentication flow against a mock token endpoint

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use twitch_oauth::{
    AuthError, AuthState, Authenticator, CallbackConfig, ClientIdentity, ConsentPrompt,
    Credential, CredentialStore, TokenExchanger,
};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the simulated browser sends back to the callback
#[derive(Clone, Copy)]
enum Reply {
    Code(&'static str),
    Denied,
    Nothing,
}

/// Stands in for the user: records the URL and drives the redirect
#[derive(Clone)]
struct Browser {
    reply: Reply,
    presented: Arc<Mutex<Vec<String>>>,
}

impl Browser {
    fn new(reply: Reply) -> Self {
        Self {
            reply,
            presented: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

impl ConsentPrompt for Browser {
    fn present(&self, authorization_url: &str) {
        self.presented
            .lock()
            .unwrap()
            .push(authorization_url.to_string());

        let url = reqwest::Url::parse(authorization_url).unwrap();
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let redirect = params["redirect_uri"].clone();
        let state = params["state"].clone();

        let query = match self.reply {
            Reply::Code(code) => format!("code={code}&state={state}"),
            Reply::Denied => format!(
                "error=access_denied&error_description=The+user+denied+you+access&state={state}"
            ),
            Reply::Nothing => return,
        };

        tokio::spawn(async move {
            let _ = reqwest::get(format!("{redirect}?{query}")).await;
        });
    }
}

struct Fixture {
    server: MockServer,
    dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            dir: TempDir::new().unwrap(),
        }
    }

    fn store(&self) -> CredentialStore {
        CredentialStore::new(
            self.dir.path().join("client.json"),
            self.dir.path().join("token.json"),
        )
    }

    fn token_path(&self) -> std::path::PathBuf {
        self.dir.path().join("token.json")
    }

    fn authenticator(&self, browser: &Browser) -> Authenticator<Browser> {
        let identity = ClientIdentity {
            id: "client-id".to_string(),
            secret: "client-secret".to_string(),
        };
        let exchanger = TokenExchanger::with_token_url(
            identity,
            format!("{}/oauth2/token", self.server.uri()),
        );
        Authenticator::new(self.store(), exchanger)
            .with_callback(CallbackConfig::new(0, "callback"))
            .with_prompt(browser.clone())
    }

    async fn expect_grant(&self, grant_type: &str, times: u64, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(response)
            .expect(times)
            .mount(&self.server)
            .await;
    }
}

fn token_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 14400,
        "scope": ["user:read:follows"],
        "token_type": "bearer"
    }))
}

fn write_cached(path: &Path) -> String {
    let content = serde_json::to_string_pretty(&Credential {
        access_token: "cached-access".to_string(),
        refresh_token: "cached-refresh".to_string(),
        token_type: "bearer".to_string(),
        expires_at: Some(4_102_444_800),
    })
    .unwrap();
    std::fs::write(path, &content).unwrap();
    content
}

#[tokio::test]
async fn test_cached_credential_is_refreshed_once() {
    let fixture = Fixture::new().await;
    let before = write_cached(&fixture.token_path());
    fixture
        .expect_grant("refresh_token", 1, token_response("fresh-access", "fresh-refresh"))
        .await;
    fixture
        .expect_grant("authorization_code", 0, token_response("x", "y"))
        .await;

    let browser = Browser::new(Reply::Nothing);
    let mut auth = fixture.authenticator(&browser);
    let credential = auth.authenticate().await.unwrap();

    assert_eq!(credential.access_token, "fresh-access");
    assert_eq!(auth.state(), AuthState::Ready);
    assert!(browser.presented().is_empty());

    let after = std::fs::read_to_string(fixture.token_path()).unwrap();
    assert_ne!(before, after);
    assert!(after.contains("fresh-access"));
    assert_eq!(fixture.store().load_credential().unwrap(), Some(credential));
}

#[tokio::test]
async fn test_missing_credential_runs_consent_flow() {
    let fixture = Fixture::new().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=granted-code"))
        .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A"))
        .respond_with(token_response("new-access", "new-refresh"))
        .expect(1)
        .mount(&fixture.server)
        .await;
    fixture
        .expect_grant("refresh_token", 0, token_response("x", "y"))
        .await;

    let browser = Browser::new(Reply::Code("granted-code"));
    let mut auth = fixture.authenticator(&browser);
    let credential = auth.authenticate().await.unwrap();

    assert_eq!(credential.access_token, "new-access");
    assert_eq!(credential.refresh_token, "new-refresh");
    assert_eq!(auth.state(), AuthState::Ready);

    let presented = browser.presented();
    assert_eq!(presented.len(), 1);
    assert!(presented[0].starts_with("https://id.twitch.tv/oauth2/authorize?"));
    assert!(presented[0].contains("client_id=client-id"));
    assert!(presented[0].contains("response_type=code"));
    assert!(presented[0].contains("scope=user%3Aread%3Afollows"));

    assert_eq!(fixture.store().load_credential().unwrap(), Some(credential));
}

#[tokio::test]
async fn test_denied_consent_writes_nothing() {
    let fixture = Fixture::new().await;
    fixture
        .expect_grant("authorization_code", 0, token_response("x", "y"))
        .await;

    let browser = Browser::new(Reply::Denied);
    let mut auth = fixture.authenticator(&browser);
    let err = auth.authenticate().await.unwrap_err();

    match err {
        AuthError::UserDeniedConsent { reason } => assert!(reason.contains("access_denied")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(auth.state(), AuthState::AwaitingConsent);
    assert!(!fixture.token_path().exists());
}

#[tokio::test]
async fn test_rejected_code_is_not_retried() {
    let fixture = Fixture::new().await;
    fixture
        .expect_grant(
            "authorization_code",
            1,
            ResponseTemplate::new(400).set_body_json(json!({
                "status": 400,
                "message": "Invalid authorization code"
            })),
        )
        .await;

    let browser = Browser::new(Reply::Code("stale-code"));
    let mut auth = fixture.authenticator(&browser);
    let err = auth.authenticate().await.unwrap_err();

    match err {
        AuthError::ExchangeFailed(message) => {
            assert!(message.contains("Invalid authorization code"), "{message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(auth.state(), AuthState::Exchanging);
    assert!(!fixture.token_path().exists());
}

#[tokio::test]
async fn test_failed_refresh_aborts_without_consent() {
    let fixture = Fixture::new().await;
    let before = write_cached(&fixture.token_path());
    fixture
        .expect_grant(
            "refresh_token",
            1,
            ResponseTemplate::new(400).set_body_json(json!({
                "status": 400,
                "message": "Invalid refresh token"
            })),
        )
        .await;

    let browser = Browser::new(Reply::Code("unused"));
    let mut auth = fixture.authenticator(&browser);
    let err = auth.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::RefreshFailed(_)));
    assert!(browser.presented().is_empty());
    assert_eq!(std::fs::read_to_string(fixture.token_path()).unwrap(), before);
}

#[tokio::test]
async fn test_consent_timeout() {
    let fixture = Fixture::new().await;

    let browser = Browser::new(Reply::Nothing);
    let mut auth = fixture
        .authenticator(&browser)
        .with_consent_timeout(Some(Duration::from_millis(200)));
    let err = auth.authenticate().await.unwrap_err();

    assert!(matches!(err, AuthError::ConsentTimeout(_)));
    assert_eq!(browser.presented().len(), 1);
    assert!(!fixture.token_path().exists());
}

#[tokio::test]
async fn test_corrupt_cache_is_fatal() {
    let fixture = Fixture::new().await;
    std::fs::write(fixture.token_path(), "garbage").unwrap();

    let browser = Browser::new(Reply::Code("unused"));
    let mut auth = fixture.authenticator(&browser);

    assert!(matches!(
        auth.authenticate().await,
        Err(AuthError::StorageCorrupt { .. })
    ));
    assert!(browser.presented().is_empty());
}

#[tokio::test]
async fn test_abandoned_consent_releases_callback_port() {
    let fixture = Fixture::new().await;
    fixture
        .expect_grant("authorization_code", 0, token_response("x", "y"))
        .await;

    let browser = Browser::new(Reply::Nothing);
    let mut auth = fixture.authenticator(&browser);

    // Stand-in for Ctrl-C: the caller stops polling and drops the flow
    tokio::select! {
        result = auth.authenticate() => panic!("flow finished without consent: {result:?}"),
        _ = tokio::time::sleep(Duration::from_millis(200)) => {}
    }
    assert_eq!(auth.state(), AuthState::AwaitingConsent);

    let presented = browser.presented();
    let url = reqwest::Url::parse(&presented[0]).unwrap();
    let redirect = url
        .query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    let port = reqwest::Url::parse(&redirect).unwrap().port().unwrap();

    let mut rebound = false;
    for _ in 0..50 {
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
            rebound = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(rebound, "callback port should be released once the flow is dropped");
    assert!(!fixture.token_path().exists());
}
