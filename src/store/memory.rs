//! In-memory store with the same observable semantics as `PgStore`,
//! used by the integration suite in place of a live database.

use async_trait::async_trait;
use chrono::Utc;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use super::{Bot, BotFilter, Match, MatchFilter, NewBot, NewMatch, Store, StoreError};

#[derive(Default)]
struct Inner {
    bots: Vec<Bot>,
    matches: Vec<Match>,
    next_bot_id: i64,
    next_match_id: i64,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_bot(&self, new: NewBot) -> Result<Bot, StoreError> {
        let mut inner = self.inner.write().await;
        let duplicate = inner.bots.iter().any(|b| {
            b.code == new.code && b.author_id == new.author_id && b.game_slug == new.game_slug
        });
        if duplicate {
            return Err(StoreError::Taken);
        }
        inner.next_bot_id += 1;
        let bot = Bot {
            id: inner.next_bot_id,
            code: new.code,
            language: new.language,
            is_active: true,
            is_verified: false,
            author_id: new.author_id,
            game_slug: new.game_slug,
            score: 0,
            games_played: 0,
        };
        inner.bots.push(bot.clone());
        Ok(bot)
    }

    async fn set_bot_verified(&self, bot_id: i64, verified: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        match inner.bots.iter_mut().find(|b| b.id == bot_id) {
            Some(bot) => {
                bot.is_verified = verified;
                Ok(())
            }
            None => Err(StoreError::NotFound),
        }
    }

    async fn set_bot_score(&self, bot_id: i64, score: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(bot) = inner.bots.iter_mut().find(|b| b.id == bot_id) {
            bot.score = score;
        }
        Ok(())
    }

    async fn add_game_played(&self, bot_id: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(bot) = inner.bots.iter_mut().find(|b| b.id == bot_id) {
            bot.games_played += 1;
        }
        Ok(())
    }

    async fn bot_by_id(&self, bot_id: i64) -> Result<Bot, StoreError> {
        let inner = self.inner.read().await;
        inner
            .bots
            .iter()
            .find(|b| b.id == bot_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_bots(&self, filter: &BotFilter) -> Result<Vec<Bot>, StoreError> {
        let inner = self.inner.read().await;
        let mut bots: Vec<Bot> = inner
            .bots
            .iter()
            .filter(|b| filter.author_id.map_or(true, |a| b.author_id == a))
            .filter(|b| {
                filter
                    .game_slug
                    .as_deref()
                    .map_or(true, |g| b.game_slug == g)
            })
            .cloned()
            .collect();
        bots.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(bots
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn bots_for_testing(&self, n: i64, game_slug: &str) -> Result<Vec<Bot>, StoreError> {
        let inner = self.inner.read().await;
        let mut veterans: Vec<Bot> = inner
            .bots
            .iter()
            .filter(|b| b.is_verified && b.game_slug == game_slug && b.games_played > 0)
            .cloned()
            .collect();
        veterans.shuffle(&mut rand::rng());
        veterans.truncate(n.max(0) as usize);

        let newcomers = inner
            .bots
            .iter()
            .filter(|b| b.is_verified && b.game_slug == game_slug && b.games_played == 0)
            .cloned();
        for bot in newcomers {
            if !veterans.iter().any(|b| b.id == bot.id) {
                veterans.push(bot);
            }
        }
        Ok(veterans)
    }

    async fn create_match(&self, new: NewMatch) -> Result<Match, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_match_id += 1;
        let m = Match {
            id: inner.next_match_id,
            game_slug: new.game_slug,
            result: new.result,
            timestamp: Utc::now(),
            info: new.info,
            states: new.states,
            error: new.error,
            bot1: new.bot1,
            author1: new.author1,
            diff1: new.diff1,
            error1: new.error1,
            bot2: new.bot2,
            author2: new.author2,
            diff2: new.diff2,
            error2: new.error2,
        };
        inner.matches.push(m.clone());
        Ok(m)
    }

    async fn match_by_id(&self, match_id: i64) -> Result<Match, StoreError> {
        let inner = self.inner.read().await;
        inner
            .matches
            .iter()
            .find(|m| m.id == match_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_matches(&self, filter: &MatchFilter) -> Result<Vec<Match>, StoreError> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Match> = inner
            .matches
            .iter()
            .filter(|m| m.id < filter.since)
            .filter(|m| {
                filter
                    .author_id
                    .map_or(true, |a| m.author1 == a || m.author2 == Some(a))
            })
            .filter(|m| {
                filter
                    .game_slug
                    .as_deref()
                    .map_or(true, |g| m.game_slug == g)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.id.cmp(&a.id));
        matches.truncate(filter.limit.max(0) as usize);
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lang;

    fn upload(code: &str, author_id: i64, game_slug: &str) -> NewBot {
        NewBot {
            code: code.to_string(),
            language: Lang::Js,
            author_id,
            game_slug: game_slug.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_submission_is_taken() {
        let store = MemStore::new();
        store.create_bot(upload("a=1", 7, "pong")).await.unwrap();
        let err = store.create_bot(upload("a=1", 7, "pong")).await.unwrap_err();
        assert!(matches!(err, StoreError::Taken));

        // same code under a different author or game is fine
        store.create_bot(upload("a=1", 8, "pong")).await.unwrap();
        store.create_bot(upload("a=1", 7, "tron")).await.unwrap();
    }

    #[tokio::test]
    async fn testing_pool_boosts_new_bots() {
        let store = MemStore::new();
        for i in 0..5 {
            let bot = store
                .create_bot(upload(&format!("v{i}"), i, "pong"))
                .await
                .unwrap();
            store.set_bot_verified(bot.id, true).await.unwrap();
            store.add_game_played(bot.id).await.unwrap();
        }
        let fresh = store.create_bot(upload("fresh", 99, "pong")).await.unwrap();
        store.set_bot_verified(fresh.id, true).await.unwrap();
        let unverified = store.create_bot(upload("nope", 98, "pong")).await.unwrap();

        let pool = store.bots_for_testing(2, "pong").await.unwrap();
        // two random veterans plus the fresh bot, never the unverified one
        assert_eq!(pool.len(), 3);
        assert!(pool.iter().any(|b| b.id == fresh.id));
        assert!(pool.iter().all(|b| b.id != unverified.id));

        let ids: Vec<i64> = pool.iter().map(|b| b.id).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
    }

    #[tokio::test]
    async fn match_listing_pages_by_id_cursor() {
        let store = MemStore::new();
        let bot = store.create_bot(upload("a=1", 7, "pong")).await.unwrap();
        for _ in 0..3 {
            store
                .create_match(NewMatch {
                    game_slug: "pong".to_string(),
                    result: 1,
                    info: serde_json::Value::Null,
                    states: serde_json::Value::Null,
                    error: None,
                    bot1: bot.id,
                    author1: 7,
                    diff1: 0,
                    error1: None,
                    bot2: None,
                    author2: None,
                    diff2: None,
                    error2: None,
                })
                .await
                .unwrap();
        }

        let filter = MatchFilter {
            author_id: None,
            game_slug: None,
            limit: 10,
            since: 3,
        };
        let page = store.list_matches(&filter).await.unwrap();
        let ids: Vec<i64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }
}
