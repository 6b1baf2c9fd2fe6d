//! HTTP clients for the platform services the coordinator depends on:
//! authentication, the games catalog and push notifications.
//!
//! Each is a trait so tests and local runs can substitute fakes.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::errors::ApiError;

/// Account details as exposed by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub photo_uuid: Option<String>,
    pub active: bool,
}

/// Resolved session cookie.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: i64,
}

/// Game catalog entry; `slug` is the canonical casing, `bot_code` the
/// built-in opponent used for verify jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub slug: String,
    pub bot_code: String,
}

/// Push notification payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub kind: String,
    pub user_id: i64,
    pub game_slug: String,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Resolve a session token to its user. `Unauthorized` when rejected.
    async fn session(&self, token: &str) -> Result<SessionPayload, ApiError>;

    async fn user_by_id(&self, id: i64) -> Result<UserInfo, ApiError>;

    async fn user_by_username(&self, username: &str) -> Result<UserInfo, ApiError>;

    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserInfo>, ApiError>;
}

#[async_trait]
pub trait GamesClient: Send + Sync {
    /// Look a game up by slug, case-insensitively. `NotFound` for unknown
    /// slugs.
    async fn game_by_slug(&self, slug: &str) -> Result<GameInfo, ApiError>;
}

#[async_trait]
pub trait NotifyClient: Send + Sync {
    async fn send(&self, note: Notification) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct HttpAuthClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpAuthClient {
    pub fn new(base_url: &str) -> Self {
        HttpAuthClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn session(&self, token: &str) -> Result<SessionPayload, ApiError> {
        let resp = self
            .http
            .get(format!("{}/sessions/{token}", self.base_url))
            .send()
            .await
            .map_err(|e| ApiError::internal(e, "querying session"))?;
        match resp.status() {
            StatusCode::OK => resp
                .json()
                .await
                .map_err(|e| ApiError::internal(e, "decoding session payload")),
            StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
            status => Err(ApiError::Internal(anyhow::anyhow!(
                "auth service returned {status} for session lookup"
            ))),
        }
    }

    async fn user_by_id(&self, id: i64) -> Result<UserInfo, ApiError> {
        fetch_json(
            &self.http,
            format!("{}/users/{id}", self.base_url),
            "querying user by id",
        )
        .await
    }

    async fn user_by_username(&self, username: &str) -> Result<UserInfo, ApiError> {
        fetch_json(
            &self.http,
            format!("{}/users?username={username}", self.base_url),
            "querying user by username",
        )
        .await
    }

    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserInfo>, ApiError> {
        let resp = self
            .http
            .post(format!("{}/users/search", self.base_url))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .map_err(|e| ApiError::internal(e, "querying users by ids"))?
            .error_for_status()
            .map_err(|e| ApiError::internal(e, "querying users by ids"))?;
        resp.json()
            .await
            .map_err(|e| ApiError::internal(e, "decoding users payload"))
    }
}

async fn fetch_json<T: serde::de::DeserializeOwned>(
    http: &reqwest::Client,
    url: String,
    op: &'static str,
) -> Result<T, ApiError> {
    let resp = http
        .get(url)
        .send()
        .await
        .map_err(|e| ApiError::internal(e, op))?;
    match resp.status() {
        StatusCode::OK => resp.json().await.map_err(|e| ApiError::internal(e, op)),
        StatusCode::NOT_FOUND => Err(ApiError::NotFound),
        status => Err(ApiError::Internal(anyhow::anyhow!(
            "service returned {status} while {op}"
        ))),
    }
}

#[derive(Clone)]
pub struct HttpGamesClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpGamesClient {
    pub fn new(base_url: &str) -> Self {
        HttpGamesClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GamesClient for HttpGamesClient {
    async fn game_by_slug(&self, slug: &str) -> Result<GameInfo, ApiError> {
        fetch_json(
            &self.http,
            format!("{}/games/{}", self.base_url, slug.to_lowercase()),
            "querying game by slug",
        )
        .await
    }
}

#[derive(Clone)]
pub struct HttpNotifyClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpNotifyClient {
    pub fn new(base_url: &str) -> Self {
        HttpNotifyClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotifyClient for HttpNotifyClient {
    async fn send(&self, note: Notification) -> Result<(), ApiError> {
        self.http
            .post(format!("{}/notifications", self.base_url))
            .json(&note)
            .send()
            .await
            .map_err(|e| ApiError::internal(e, "sending notification"))?
            .error_for_status()
            .map_err(|e| ApiError::internal(e, "sending notification"))?;
        Ok(())
    }
}
