//! Periodic matchmaking over the verified bot pool.

use std::time::Duration;

use tokio::task::JoinSet;

use crate::broker::TestTask;
use crate::jobs::matches::run_match;
use crate::server::AppState;
use crate::store::Bot;

/// Drive matchmaking ticks forever. Ticks are strictly serial: every match
/// spawned by one tick finishes before the next tick starts, so at most one
/// cohort is in flight.
pub async fn run_scheduler(state: AppState) {
    let mut interval =
        tokio::time::interval(Duration::from_secs(state.config.matchmaking_interval_secs));
    loop {
        interval.tick().await;
        run_tick(&state).await;
    }
}

/// One matchmaking pass over every configured game.
pub async fn run_tick(state: &AppState) {
    let mut cohort = JoinSet::new();

    for game_slug in &state.config.game_slugs {
        let bots = match state
            .store
            .bots_for_testing(state.config.matchmaking_pool_size, game_slug)
            .await
        {
            Ok(bots) => bots,
            Err(error) => {
                tracing::error!(game_slug, %error, "selecting bots for testing");
                continue;
            }
        };
        if bots.is_empty() {
            continue;
        }

        for (left, right) in ring_pairings(&bots) {
            let bot1 = bots[left].clone();
            let bot2 = bots[right].clone();
            let task = TestTask {
                code1: bot1.code.clone(),
                code2: bot2.code.clone(),
                game_slug: game_slug.clone(),
                lang: bot1.language,
            };
            match state.tester.dispatch(&task).await {
                Ok(events) => {
                    cohort.spawn(run_match(state.clone(), bot1, bot2, events));
                }
                Err(error) => {
                    tracing::error!(
                        bot_id1 = bot1.id,
                        bot_id2 = bot2.id,
                        %error,
                        "dispatching match to tester"
                    );
                }
            }
        }
    }

    while cohort.join_next().await.is_some() {}
}

/// Pair every bot with its right-hand neighbour on the ring, keeping only
/// pairings with matching language and distinct authors. Each bot shows up
/// in at most two pairings per tick.
fn ring_pairings(bots: &[Bot]) -> Vec<(usize, usize)> {
    (0..bots.len())
        .map(|i| (i, (i + 1) % bots.len()))
        .filter(|&(i, j)| {
            bots[i].language == bots[j].language && bots[i].author_id != bots[j].author_id
        })
        .collect()
}
