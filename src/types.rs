//! Public API payloads and fan-out message bodies.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clients::UserInfo;
use crate::errors::{ApiError, ValidationErrors, REASON_INVALID};
use crate::store::Match;

/// Language a bot is written in. The tester pool currently only runs
/// JavaScript; new languages extend this enum and `parse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lang {
    #[serde(rename = "JS")]
    Js,
}

impl Lang {
    pub fn parse(s: &str) -> Option<Lang> {
        match s {
            "JS" => Some(Lang::Js),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Js => "JS",
        }
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /v1/bots`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotUpload {
    pub code: String,
    pub game_slug: String,
    pub lang: String,
}

impl BotUpload {
    /// Check the declared language against the supported set.
    pub fn validate(&self) -> Result<Lang, ApiError> {
        Lang::parse(&self.lang)
            .ok_or_else(|| ApiError::Invalid(ValidationErrors::single("lang", REASON_INVALID)))
    }
}

/// Author details embedded in bot and match responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub id: i64,
    pub username: String,
    pub photo_uuid: Option<String>,
    pub active: bool,
}

impl From<UserInfo> for AuthorInfo {
    fn from(user: UserInfo) -> Self {
        AuthorInfo {
            id: user.id,
            username: user.username,
            photo_uuid: user.photo_uuid,
            active: user.active,
        }
    }
}

/// Bot as listed over HTTP; source code is never included here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotPublic {
    pub author: Option<AuthorInfo>,
    pub id: i64,
    pub game_slug: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub score: i64,
    pub games_played: i64,
}

impl BotPublic {
    pub fn new(bot: &crate::store::Bot, author: Option<AuthorInfo>) -> Self {
        BotPublic {
            author,
            id: bot.id,
            game_slug: bot.game_slug.clone(),
            is_active: bot.is_active,
            is_verified: bot.is_verified,
            score: bot.score,
            games_played: bot.games_played,
        }
    }
}

/// Bot including source, returned to its submitter on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotFull {
    #[serde(flatten)]
    pub bot: BotPublic,
    pub code: String,
    pub lang: Lang,
}

/// Fan-out body for `verify` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotStatus {
    pub bot_id: i64,
    pub new_status: String,
}

/// Fan-out body for `match_status` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStatus {
    pub bot1: i64,
    pub bot2: i64,
    pub author1: i64,
    pub author2: i64,
    pub new_status: String,
}

/// Fan-out body for `match_error` messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchErrorInfo {
    pub bot1: i64,
    pub bot2: i64,
    pub author1: i64,
    pub author2: i64,
    pub error: String,
}

/// Fan-out body for `match` messages: the recorded outcome, ids only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchInfo {
    pub id: i64,
    pub game_slug: String,
    pub result: i32,
    pub time: DateTime<Utc>,
    pub bot1: i64,
    pub author1: i64,
    pub diff1: i64,
    pub bot2: Option<i64>,
    pub author2: Option<i64>,
    pub diff2: Option<i64>,
}

impl From<&Match> for MatchInfo {
    fn from(m: &Match) -> Self {
        MatchInfo {
            id: m.id,
            game_slug: m.game_slug.clone(),
            result: m.result,
            time: m.timestamp,
            bot1: m.bot1,
            author1: m.author1,
            diff1: m.diff1,
            bot2: m.bot2,
            author2: m.author2,
            diff2: m.diff2,
        }
    }
}

/// Match as listed over HTTP, with resolved author details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOverview {
    pub id: i64,
    pub game_slug: String,
    pub result: i32,
    pub time: DateTime<Utc>,
    pub author1: Option<AuthorInfo>,
    pub author2: Option<AuthorInfo>,
}

/// Full match detail for `GET /v1/matches/{id}`.
///
/// `code1`/`code2` are only present when the caller is the corresponding
/// author.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDetail {
    pub id: i64,
    pub game_slug: String,
    pub result: i32,
    pub time: DateTime<Utc>,
    pub info: serde_json::Value,
    pub states: serde_json::Value,
    pub error: Option<String>,
    pub error_1: Option<String>,
    pub error_2: Option<String>,
    pub bot1: i64,
    pub author1: Option<AuthorInfo>,
    pub diff1: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code1: Option<String>,
    pub bot2: Option<i64>,
    pub author2: Option<AuthorInfo>,
    pub diff2: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code2: Option<String>,
}
