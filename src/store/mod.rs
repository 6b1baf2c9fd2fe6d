//! Persistence gateway for bots and match outcomes.
//!
//! The `Store` trait is the only surface the rest of the coordinator sees;
//! `PgStore` backs it onto PostgreSQL and `MemStore` keeps everything in
//! memory for tests and storage-less development runs.

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ApiError;
use crate::types::Lang;

/// Match result codes shared with the tester wire protocol.
pub const RESULT_DRAW: i32 = 0;
pub const RESULT_BOT1: i32 = 1;
pub const RESULT_BOT2: i32 = 2;
pub const RESULT_ERROR: i32 = 3;

/// Score granted when a bot passes verification.
pub const INITIAL_SCORE: i64 = 400;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,
    #[error("uniqueness violated")]
    Taken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            StoreError::Taken => ApiError::Taken,
            StoreError::Internal(cause) => ApiError::Internal(cause),
        }
    }
}

/// A stored submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    pub id: i64,
    pub code: String,
    pub language: Lang,
    pub is_active: bool,
    pub is_verified: bool,
    pub author_id: i64,
    pub game_slug: String,
    pub score: i64,
    pub games_played: i64,
}

/// Fields supplied on submission; everything else starts at its default.
#[derive(Debug, Clone)]
pub struct NewBot {
    pub code: String,
    pub language: Lang,
    pub author_id: i64,
    pub game_slug: String,
}

/// A recorded game outcome. Side-2 fields are absent for verify matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: i64,
    pub game_slug: String,
    pub result: i32,
    pub timestamp: DateTime<Utc>,
    pub info: serde_json::Value,
    pub states: serde_json::Value,
    pub error: Option<String>,
    pub bot1: i64,
    pub author1: i64,
    pub diff1: i64,
    pub error1: Option<String>,
    pub bot2: Option<i64>,
    pub author2: Option<i64>,
    pub diff2: Option<i64>,
    pub error2: Option<String>,
}

/// Match fields known at insert time; id and timestamp are stamped by the
/// gateway.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub game_slug: String,
    pub result: i32,
    pub info: serde_json::Value,
    pub states: serde_json::Value,
    pub error: Option<String>,
    pub bot1: i64,
    pub author1: i64,
    pub diff1: i64,
    pub error1: Option<String>,
    pub bot2: Option<i64>,
    pub author2: Option<i64>,
    pub diff2: Option<i64>,
    pub error2: Option<String>,
}

/// Listing filter for bots; `None` filters are wildcards.
#[derive(Debug, Clone)]
pub struct BotFilter {
    pub author_id: Option<i64>,
    pub game_slug: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Listing filter for matches; `since` is an exclusive upper-bound id.
#[derive(Debug, Clone)]
pub struct MatchFilter {
    pub author_id: Option<i64>,
    pub game_slug: Option<String>,
    pub limit: i64,
    pub since: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a submission. `Taken` when a bot with the same
    /// (code, author, game) already exists.
    async fn create_bot(&self, new: NewBot) -> Result<Bot, StoreError>;

    async fn set_bot_verified(&self, bot_id: i64, verified: bool) -> Result<(), StoreError>;

    async fn set_bot_score(&self, bot_id: i64, score: i64) -> Result<(), StoreError>;

    /// Bump the bot's games-played counter after a scored match.
    async fn add_game_played(&self, bot_id: i64) -> Result<(), StoreError>;

    async fn bot_by_id(&self, bot_id: i64) -> Result<Bot, StoreError>;

    /// Bots ordered by score descending.
    async fn list_bots(&self, filter: &BotFilter) -> Result<Vec<Bot>, StoreError>;

    /// Matchmaking candidates: up to `n` random verified veterans of the
    /// game, unioned with every verified bot that has not played yet.
    async fn bots_for_testing(&self, n: i64, game_slug: &str) -> Result<Vec<Bot>, StoreError>;

    /// Insert a match row, stamping the timestamp, and return it.
    async fn create_match(&self, new: NewMatch) -> Result<Match, StoreError>;

    async fn match_by_id(&self, match_id: i64) -> Result<Match, StoreError>;

    /// Matches ordered by id descending, paged by the `since` cursor.
    async fn list_matches(&self, filter: &MatchFilter) -> Result<Vec<Match>, StoreError>;
}
