//! Read-only Helix API queries

use anyhow::{Context, anyhow, bail};
use clap::ValueEnum;
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Default Helix API base URL
pub const HELIX_BASE: &str = "https://api.twitch.tv/helix";

/// Kind of VoDs to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VideoKind {
    All,
    Upload,
    Archive,
    Highlight,
}

impl VideoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VideoKind::All => "all",
            VideoKind::Upload => "upload",
            VideoKind::Archive => "archive",
            VideoKind::Highlight => "highlight",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
    broadcaster_login: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct User {
    id: String,
}

/// A live stream of a followed channel
#[derive(Debug, Deserialize)]
pub struct Stream {
    pub user_login: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct Video {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Stream {
    /// `<login> <title>`
    pub fn line(&self) -> String {
        format!("{} {}", self.user_login, single_line(&self.title))
    }
}

impl Video {
    /// `<url> <YYYY-MM-DD> <title>`
    pub fn line(&self) -> String {
        let date = self
            .created_at
            .as_deref()
            .and_then(|t| t.get(..10))
            .unwrap_or("");
        format!(
            "{} {} {}",
            self.url.as_deref().unwrap_or(""),
            date,
            single_line(&self.title)
        )
    }
}

fn single_line(title: &str) -> String {
    title.replace('\n', " ")
}

/// Helix client over an already authenticated HTTP client
pub struct HelixClient {
    http: reqwest::Client,
    base_url: String,
}

impl HelixClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path_and_query: &str) -> anyhow::Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("making request to {}", url))?;

        let status = response.status();
        let body = response.text().await.context("reading reply")?;
        if !status.is_success() {
            bail!("request to {} failed (status {}): {}", url, status, body.trim());
        }

        let page: Page<T> = serde_json::from_str(&body).context("parsing JSON")?;
        Ok(page.data)
    }

    /// ID of the channel whose login or display name equals `name`
    pub async fn search_channel(&self, name: &str) -> anyhow::Result<String> {
        let channels: Vec<Channel> = self
            .get(&format!(
                "/search/channels?first=100&query={}",
                urlencoding::encode(name)
            ))
            .await?;

        let wanted = name.to_lowercase();
        channels
            .into_iter()
            .find(|c| {
                c.display_name.to_lowercase() == wanted
                    || c.broadcaster_login.to_lowercase() == wanted
            })
            .map(|c| c.id)
            .ok_or_else(|| anyhow!("no channel named '{}'", name))
    }

    /// ID of the user the token belongs to
    pub async fn logged_user_id(&self) -> anyhow::Result<String> {
        let users: Vec<User> = self.get("/users").await?;
        users
            .into_iter()
            .next()
            .map(|u| u.id)
            .ok_or_else(|| anyhow!("no user returned for the current token"))
    }

    pub async fn followed_streams(&self, user_id: &str) -> anyhow::Result<Vec<Stream>> {
        self.get(&format!(
            "/streams/followed?user_id={}",
            urlencoding::encode(user_id)
        ))
        .await
    }

    pub async fn videos(&self, user_id: &str, kind: VideoKind) -> anyhow::Result<Vec<Video>> {
        self.get(&format!(
            "/videos?first=100&type={}&user_id={}",
            kind.as_str(),
            urlencoding::encode(user_id)
        ))
        .await
    }
}
