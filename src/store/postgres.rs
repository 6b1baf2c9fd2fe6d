//! PostgreSQL-backed store gateway.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, QueryBuilder};

use super::{Bot, BotFilter, Match, MatchFilter, NewBot, NewMatch, Store, StoreError};
use crate::types::Lang;

const BOT_COLUMNS: &str =
    "id, code, language, is_active, is_verified, author_id, game_slug, score, games_played";

const MATCH_COLUMNS: &str = "id, game_slug, result, time, info, states, error, \
     error_1, error_2, bot_1, author_1, diff_1, bot_2, author_2, diff_2";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and bring the schema up to date.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .context("connecting to postgres")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("running database migrations")?;
        Ok(PgStore { pool })
    }
}

/// Row shape of the `bots` table; `language` stays textual until the
/// gateway boundary.
#[derive(sqlx::FromRow)]
struct BotRow {
    id: i64,
    code: String,
    language: String,
    is_active: bool,
    is_verified: bool,
    author_id: i64,
    game_slug: String,
    score: i64,
    games_played: i64,
}

impl TryFrom<BotRow> for Bot {
    type Error = StoreError;

    fn try_from(row: BotRow) -> Result<Bot, StoreError> {
        let language = Lang::parse(&row.language).ok_or_else(|| {
            StoreError::Internal(anyhow::anyhow!(
                "bot {} has unknown language '{}'",
                row.id,
                row.language
            ))
        })?;
        Ok(Bot {
            id: row.id,
            code: row.code,
            language,
            is_active: row.is_active,
            is_verified: row.is_verified,
            author_id: row.author_id,
            game_slug: row.game_slug,
            score: row.score,
            games_played: row.games_played,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MatchRow {
    id: i64,
    game_slug: String,
    result: i32,
    time: DateTime<Utc>,
    info: serde_json::Value,
    states: serde_json::Value,
    error: Option<String>,
    error_1: Option<String>,
    error_2: Option<String>,
    bot_1: i64,
    author_1: i64,
    diff_1: i64,
    bot_2: Option<i64>,
    author_2: Option<i64>,
    diff_2: Option<i64>,
}

impl From<MatchRow> for Match {
    fn from(row: MatchRow) -> Match {
        Match {
            id: row.id,
            game_slug: row.game_slug,
            result: row.result,
            timestamp: row.time,
            info: row.info,
            states: row.states,
            error: row.error,
            bot1: row.bot_1,
            author1: row.author_1,
            diff1: row.diff_1,
            error1: row.error_1,
            bot2: row.bot_2,
            author2: row.author_2,
            diff2: row.diff_2,
            error2: row.error_2,
        }
    }
}

fn map_sqlx(err: sqlx::Error, op: &'static str) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Taken,
        other => StoreError::Internal(anyhow::Error::new(other).context(op)),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_bot(&self, new: NewBot) -> Result<Bot, StoreError> {
        let row = sqlx::query_as::<_, BotRow>(
            "INSERT INTO bots (code, language, author_id, game_slug) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, code, language, is_active, is_verified, author_id, \
                       game_slug, score, games_played",
        )
        .bind(&new.code)
        .bind(new.language.as_str())
        .bind(new.author_id)
        .bind(&new.game_slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, "inserting bot row"))?;
        row.try_into()
    }

    async fn set_bot_verified(&self, bot_id: i64, verified: bool) -> Result<(), StoreError> {
        let updated: Option<(i64,)> =
            sqlx::query_as("UPDATE bots SET is_verified = $1 WHERE id = $2 RETURNING id")
                .bind(verified)
                .bind(bot_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx(e, "updating bot verified flag"))?;
        match updated {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn set_bot_score(&self, bot_id: i64, score: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE bots SET score = $1 WHERE id = $2")
            .bind(score)
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, "updating bot score"))?;
        Ok(())
    }

    async fn add_game_played(&self, bot_id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE bots SET games_played = games_played + 1 WHERE id = $1")
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, "incrementing games played"))?;
        Ok(())
    }

    async fn bot_by_id(&self, bot_id: i64) -> Result<Bot, StoreError> {
        let row = sqlx::query_as::<_, BotRow>(&format!(
            "SELECT {BOT_COLUMNS} FROM bots WHERE id = $1"
        ))
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, "selecting bot by id"))?;
        match row {
            Some(row) => row.try_into(),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_bots(&self, filter: &BotFilter) -> Result<Vec<Bot>, StoreError> {
        let mut qb = QueryBuilder::new(format!("SELECT {BOT_COLUMNS} FROM bots"));
        let mut prefix = " WHERE ";
        if let Some(author_id) = filter.author_id {
            qb.push(prefix).push("author_id = ").push_bind(author_id);
            prefix = " AND ";
        }
        if let Some(game_slug) = &filter.game_slug {
            qb.push(prefix)
                .push("game_slug = ")
                .push_bind(game_slug.clone());
        }
        qb.push(" ORDER BY score DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = qb
            .build_query_as::<BotRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, "listing bots"))?;
        rows.into_iter().map(Bot::try_from).collect()
    }

    async fn bots_for_testing(&self, n: i64, game_slug: &str) -> Result<Vec<Bot>, StoreError> {
        // random sample of veterans, plus every verified bot that has not
        // played yet (the new-bot boost)
        let rows = sqlx::query_as::<_, BotRow>(&format!(
            "(SELECT {BOT_COLUMNS} FROM \
                (SELECT {BOT_COLUMNS} FROM bots \
                 WHERE is_verified = TRUE AND game_slug = $1 AND games_played > 0 \
                 ORDER BY random() LIMIT $2) veterans) \
             UNION \
             (SELECT {BOT_COLUMNS} FROM bots \
              WHERE is_verified = TRUE AND game_slug = $1 AND games_played = 0)"
        ))
        .bind(game_slug)
        .bind(n)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, "selecting bots for testing"))?;
        rows.into_iter().map(Bot::try_from).collect()
    }

    async fn create_match(&self, new: NewMatch) -> Result<Match, StoreError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "INSERT INTO matches (game_slug, result, info, states, error, error_1, \
                                  error_2, bot_1, author_1, diff_1, bot_2, author_2, diff_2) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {MATCH_COLUMNS}"
        ))
        .bind(&new.game_slug)
        .bind(new.result)
        .bind(&new.info)
        .bind(&new.states)
        .bind(&new.error)
        .bind(&new.error1)
        .bind(&new.error2)
        .bind(new.bot1)
        .bind(new.author1)
        .bind(new.diff1)
        .bind(new.bot2)
        .bind(new.author2)
        .bind(new.diff2)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, "inserting match row"))?;
        Ok(row.into())
    }

    async fn match_by_id(&self, match_id: i64) -> Result<Match, StoreError> {
        let row = sqlx::query_as::<_, MatchRow>(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx(e, "selecting match by id"))?;
        match row {
            Some(row) => Ok(row.into()),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list_matches(&self, filter: &MatchFilter) -> Result<Vec<Match>, StoreError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE id < "
        ));
        qb.push_bind(filter.since);
        if let Some(author_id) = filter.author_id {
            qb.push(" AND (author_1 = ")
                .push_bind(author_id)
                .push(" OR author_2 = ")
                .push_bind(author_id)
                .push(")");
        }
        if let Some(game_slug) = &filter.game_slug {
            qb.push(" AND game_slug = ").push_bind(game_slug.clone());
        }
        qb.push(" ORDER BY id DESC LIMIT ").push_bind(filter.limit);

        let rows = qb
            .build_query_as::<MatchRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx(e, "listing matches"))?;
        Ok(rows.into_iter().map(Match::from).collect())
    }
}
