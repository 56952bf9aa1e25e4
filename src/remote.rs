/// Remote services: the Discord user directory and the attachment fetcher
///
/// Both are traits so the hydration pipeline and the add flow can run
/// against in-process fakes. `HttpClient` is the reqwest-backed
/// implementation of both.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::error::{LockerError, LockerResult};

const CDN_BASE: &str = "https://cdn.discordapp.com";
const AVATAR_SIZE: u32 = 128;

/// A Discord account as returned by the users endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
    /// Avatar hash, `None` for the default avatar
    pub avatar: Option<String>,
}

impl DiscordUser {
    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!(
                "{}/avatars/{}/{}.png?size={}",
                CDN_BASE, self.id, hash, AVATAR_SIZE
            ),
            None => default_avatar_url(&self.id),
        }
    }
}

/// Default avatar for accounts without a custom one
pub fn default_avatar_url(user_id: &str) -> String {
    let index = user_id
        .parse::<u64>()
        .map(|id| (id >> 22) % 6)
        .unwrap_or(0);
    format!("{}/embed/avatars/{}.png", CDN_BASE, index)
}

/// What a HEAD probe learned about a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContent {
    pub content_type: String,
    /// Size in bytes, 0 when the server did not say
    pub size: i64,
}

impl RemoteContent {
    pub fn is_picture(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Resolves Discord user ids
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// `Ok(None)` when the account does not exist
    async fn fetch_user(&self, user_id: &str) -> LockerResult<Option<DiscordUser>>;
}

/// Downloads attachment and avatar content
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// `Ok(None)` when the URL does not answer successfully
    async fn probe(&self, url: &str) -> LockerResult<Option<RemoteContent>>;

    async fn download(&self, url: &str) -> LockerResult<Vec<u8>>;
}

/// Parse a user supplied URL, accepting only http(s)
pub fn parse_attachment_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

/// reqwest-backed implementation of both remote services
pub struct HttpClient {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl HttpClient {
    pub fn new(config: &AppConfig) -> LockerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("dirt-locker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: config.discord_api_base.trim_end_matches('/').to_string(),
            token: config.discord_token.clone(),
        })
    }
}

#[async_trait]
impl UserDirectory for HttpClient {
    async fn fetch_user(&self, user_id: &str) -> LockerResult<Option<DiscordUser>> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| LockerError::Config("discord_token is not set".to_string()))?;

        let url = format!("{}/users/{}", self.api_base, user_id);
        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bot {}", token))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(LockerError::RemoteStatus {
                url,
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl ContentFetcher for HttpClient {
    async fn probe(&self, url: &str) -> LockerResult<Option<RemoteContent>> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            debug!(url, status = %response.status(), "Probe rejected");
            return Ok(None);
        }

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(0);

        Ok(Some(RemoteContent { content_type, size }))
    }

    async fn download(&self, url: &str) -> LockerResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LockerError::RemoteStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}
