// HTTP entry points under /v1: bot submission, listings and match lookup.

use std::collections::{HashMap, HashSet};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use serde::Deserialize;

use crate::clients::{SessionPayload, UserInfo};
use crate::errors::{ApiError, ValidationErrors, REASON_NOT_EXISTS, REASON_TAKEN};
use crate::jobs::verify::run_verify;
use crate::server::AppState;
use crate::store::{BotFilter, MatchFilter, NewBot, StoreError};
use crate::types::{AuthorInfo, BotFull, BotPublic, MatchDetail, MatchOverview};

const DEFAULT_LIMIT: i64 = 10;
const SESSION_COOKIE: &str = "session_id";

fn session_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in raw.split(';') {
        if let Some(value) = part.trim().strip_prefix(SESSION_COOKIE) {
            if let Some(token) = value.strip_prefix('=') {
                return Some(token.to_string());
            }
        }
    }
    None
}

/// Resolve the caller through the auth service; `Unauthorized` when the
/// cookie is missing or rejected.
pub(crate) async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<SessionPayload, ApiError> {
    match session_token(headers) {
        Some(token) => state.auth.session(&token).await,
        None => Err(ApiError::Unauthorized),
    }
}

/// Like `authenticate`, but an absent or stale cookie is just anonymous
/// access.
async fn maybe_authenticate(state: &AppState, headers: &HeaderMap) -> Option<SessionPayload> {
    match session_token(headers) {
        Some(token) => state.auth.session(&token).await.ok(),
        None => None,
    }
}

/// Shared query shape of the two listings; `since` is an offset for bots
/// and an id cursor for matches.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub author: Option<String>,
    pub game_slug: Option<String>,
    pub limit: Option<i64>,
    pub since: Option<i64>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// `POST /v1/bots`: store the submission and kick off its verify job.
pub async fn create_bot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<crate::types::BotUpload>,
) -> Result<Json<BotFull>, ApiError> {
    let session = authenticate(&state, &headers).await?;
    let lang = form.validate()?;

    // resolve the canonical slug and the built-in opponent in one go
    let game = state
        .games
        .game_by_slug(&form.game_slug)
        .await
        .map_err(|err| match err {
            ApiError::NotFound => {
                ApiError::Invalid(ValidationErrors::single("game_slug", REASON_NOT_EXISTS))
            }
            other => other,
        })?;

    let user = state
        .auth
        .user_by_id(session.id)
        .await
        .map_err(|err| match err {
            ApiError::NotFound => {
                ApiError::Internal(anyhow::anyhow!("session user {} has no account", session.id))
            }
            other => other,
        })?;

    let bot = state
        .store
        .create_bot(NewBot {
            code: form.code.clone(),
            language: lang,
            author_id: user.id,
            game_slug: game.slug.clone(),
        })
        .await
        .map_err(|err| match err {
            StoreError::Taken => {
                ApiError::Invalid(ValidationErrors::single("code", REASON_TAKEN))
            }
            other => other.into(),
        })?;

    let events = state
        .tester
        .dispatch(&crate::broker::TestTask {
            code1: bot.code.clone(),
            code2: game.bot_code,
            game_slug: game.slug,
            lang,
        })
        .await?;
    tokio::spawn(run_verify(state.clone(), bot.clone(), events));

    let full = BotFull {
        bot: BotPublic::new(&bot, Some(user.into())),
        code: bot.code,
        lang,
    };
    Ok(Json(full))
}

/// `GET /v1/bots`: leaderboard-ordered listing with optional author and
/// game filters.
pub async fn list_bots(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<BotPublic>>, ApiError> {
    let author = match non_empty(query.author) {
        Some(username) => match state.auth.user_by_username(&username).await {
            Ok(user) => Some(user),
            // unknown author filters everything out
            Err(ApiError::NotFound) => return Ok(Json(Vec::new())),
            Err(other) => return Err(other),
        },
        None => None,
    };

    let filter = BotFilter {
        author_id: author.as_ref().map(|u| u.id),
        game_slug: non_empty(query.game_slug),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        offset: query.since.unwrap_or(0),
    };
    let bots = state.store.list_bots(&filter).await?;

    let authors = match author {
        Some(user) => HashMap::from([(user.id, user)]),
        None => {
            fetch_authors(&state, bots.iter().map(|b| b.author_id)).await?
        }
    };

    let listing = bots
        .iter()
        .map(|bot| {
            let info = authors.get(&bot.author_id).cloned().map(AuthorInfo::from);
            BotPublic::new(bot, info)
        })
        .collect();
    Ok(Json(listing))
}

/// Batch author lookup; one round-trip for the whole listing.
async fn fetch_authors(
    state: &AppState,
    ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, UserInfo>, ApiError> {
    let distinct: HashSet<i64> = ids.collect();
    if distinct.is_empty() {
        return Ok(HashMap::new());
    }
    let ids: Vec<i64> = distinct.into_iter().collect();
    let users = state.auth.users_by_ids(&ids).await?;
    Ok(users.into_iter().map(|u| (u.id, u)).collect())
}

/// `GET /v1/matches`: id-descending listing paged by an exclusive upper
/// bound cursor.
pub async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MatchOverview>>, ApiError> {
    let author = match non_empty(query.author) {
        Some(username) => match state.auth.user_by_username(&username).await {
            Ok(user) => Some(user),
            Err(ApiError::NotFound) => return Ok(Json(Vec::new())),
            Err(other) => return Err(other),
        },
        None => None,
    };

    let filter = MatchFilter {
        author_id: author.map(|u| u.id),
        game_slug: non_empty(query.game_slug),
        limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        since: query.since.unwrap_or(i64::MAX),
    };
    let matches = state.store.list_matches(&filter).await?;

    let authors = fetch_authors(
        &state,
        matches
            .iter()
            .flat_map(|m| std::iter::once(m.author1).chain(m.author2)),
    )
    .await?;

    let listing = matches
        .iter()
        .map(|m| MatchOverview {
            id: m.id,
            game_slug: m.game_slug.clone(),
            result: m.result,
            time: m.timestamp,
            author1: authors.get(&m.author1).cloned().map(AuthorInfo::from),
            author2: m
                .author2
                .and_then(|id| authors.get(&id).cloned())
                .map(AuthorInfo::from),
        })
        .collect();
    Ok(Json(listing))
}

/// `GET /v1/matches/{match_id}`: full record, with the caller's own bot
/// code disclosed when they played in it.
pub async fn get_match(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(match_id): Path<i64>,
) -> Result<Json<MatchDetail>, ApiError> {
    let m = state.store.match_by_id(match_id).await?;
    let session = maybe_authenticate(&state, &headers).await;

    let authors = fetch_authors(
        &state,
        std::iter::once(m.author1).chain(m.author2),
    )
    .await?;

    let caller = session.map(|s| s.id);
    let code1 = match caller {
        Some(id) if id == m.author1 => bot_code(&state, m.bot1).await,
        _ => None,
    };
    let code2 = match (caller, m.author2, m.bot2) {
        (Some(id), Some(author2), Some(bot2)) if id == author2 => bot_code(&state, bot2).await,
        _ => None,
    };

    Ok(Json(MatchDetail {
        id: m.id,
        game_slug: m.game_slug.clone(),
        result: m.result,
        time: m.timestamp,
        info: m.info.clone(),
        states: m.states.clone(),
        error: m.error.clone(),
        error_1: m.error1.clone(),
        error_2: m.error2.clone(),
        bot1: m.bot1,
        author1: authors.get(&m.author1).cloned().map(AuthorInfo::from),
        diff1: m.diff1,
        code1,
        bot2: m.bot2,
        author2: m
            .author2
            .and_then(|id| authors.get(&id).cloned())
            .map(AuthorInfo::from),
        diff2: m.diff2,
        code2,
    }))
}

/// Best-effort code lookup for the disclosure branch; a missing bot row
/// just omits the code.
async fn bot_code(state: &AppState, bot_id: i64) -> Option<String> {
    match state.store.bot_by_id(bot_id).await {
        Ok(bot) => Some(bot.code),
        Err(error) => {
            tracing::error!(bot_id, %error, "loading bot for code disclosure");
            None
        }
    }
}
