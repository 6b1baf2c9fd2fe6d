//! Scored match job between two verified bots.

use serde_json::Value;
use tokio::sync::mpsc::Receiver;

use crate::broker::{ResultBody, TesterEvent};
use crate::clients::Notification;
use crate::hub::StatusMessage;
use crate::jobs::verify::body_json;
use crate::rating;
use crate::server::AppState;
use crate::store::{Bot, Match, NewMatch, RESULT_ERROR};
use crate::types::{MatchErrorInfo, MatchInfo, MatchStatus};

/// Consume the reply stream of a scheduled match between `bot1` and `bot2`.
///
/// Scores are taken from the bots as selected at dispatch time; concurrent
/// matches of the same bot race on the final score the same way the stored
/// diffs do.
pub async fn run_match(state: AppState, bot1: Bot, bot2: Bot, mut events: Receiver<TesterEvent>) {
    while let Some(event) = events.recv().await {
        tracing::info!(
            bot_id1 = bot1.id,
            bot_id2 = bot2.id,
            event = ?kind(&event),
            "processing match event"
        );
        match event {
            TesterEvent::Status(body) => {
                broadcast_to_both(
                    &state,
                    &bot1,
                    &bot2,
                    "match_status",
                    body_json(&MatchStatus {
                        bot1: bot1.id,
                        bot2: bot2.id,
                        author1: bot1.author_id,
                        author2: bot2.author_id,
                        new_status: body.new_status,
                    }),
                )
                .await;
            }
            TesterEvent::Result(body) => handle_result(&state, &bot1, &bot2, body).await,
            TesterEvent::Error(body) => handle_error(&state, &bot1, &bot2, &body.error).await,
        }
    }
}

fn kind(event: &TesterEvent) -> &'static str {
    match event {
        TesterEvent::Status(_) => "status",
        TesterEvent::Result(_) => "result",
        TesterEvent::Error(_) => "error",
    }
}

async fn handle_result(state: &AppState, bot1: &Bot, bot2: &Bot, body: ResultBody) {
    let (new_score1, new_score2) = rating::new_scores(bot1.score, bot2.score, body.result);

    for (bot, new_score) in [(bot1, new_score1), (bot2, new_score2)] {
        if let Err(error) = state.store.set_bot_score(bot.id, new_score).await {
            tracing::error!(bot_id = bot.id, %error, "updating score after match");
        }
        if let Err(error) = state.store.add_game_played(bot.id).await {
            tracing::error!(bot_id = bot.id, %error, "counting played game");
        }
    }

    let recorded = state
        .store
        .create_match(NewMatch {
            game_slug: bot1.game_slug.clone(),
            result: body.result,
            info: body.info,
            states: body.states,
            error: None,
            bot1: bot1.id,
            author1: bot1.author_id,
            diff1: new_score1 - bot1.score,
            error1: body.error_1,
            bot2: Some(bot2.id),
            author2: Some(bot2.author_id),
            diff2: Some(new_score2 - bot2.score),
            error2: body.error_2,
        })
        .await;

    match recorded {
        Ok(m) => broadcast_outcome(state, bot1, bot2, &m).await,
        Err(error) => {
            tracing::error!(bot_id1 = bot1.id, bot_id2 = bot2.id, %error, "recording match");
        }
    }

    for bot in [bot1, bot2] {
        let note = Notification {
            kind: "match".to_string(),
            user_id: bot.author_id,
            game_slug: bot.game_slug.clone(),
            body: serde_json::json!({ "bot_id": bot.id, "result": body.result }),
        };
        if let Err(error) = state.notify.send(note).await {
            tracing::error!(bot_id = bot.id, %error, "sending match notification");
        }
    }
}

/// One `match` message per author; the second goes out private so anonymous
/// streams count the match once.
async fn broadcast_outcome(state: &AppState, bot1: &Bot, bot2: &Bot, m: &Match) {
    let info = body_json(&MatchInfo::from(m));
    state
        .hub
        .publish(StatusMessage::new(
            bot1.author_id,
            &bot1.game_slug,
            "match",
            info.clone(),
        ))
        .await;
    state
        .hub
        .publish(StatusMessage::new(bot2.author_id, &bot2.game_slug, "match", info).private())
        .await;
}

async fn handle_error(state: &AppState, bot1: &Bot, bot2: &Bot, error_text: &str) {
    tracing::info!(
        bot_id1 = bot1.id,
        bot_id2 = bot2.id,
        error = error_text,
        "match failed in tester"
    );

    if let Err(error) = state
        .store
        .create_match(NewMatch {
            game_slug: bot1.game_slug.clone(),
            result: RESULT_ERROR,
            info: Value::Null,
            states: Value::Null,
            error: Some(error_text.to_string()),
            bot1: bot1.id,
            author1: bot1.author_id,
            diff1: 0,
            error1: None,
            bot2: Some(bot2.id),
            author2: Some(bot2.author_id),
            diff2: Some(0),
            error2: None,
        })
        .await
    {
        tracing::error!(bot_id1 = bot1.id, bot_id2 = bot2.id, %error, "recording failed match");
    }

    broadcast_to_both(
        state,
        bot1,
        bot2,
        "match_error",
        body_json(&MatchErrorInfo {
            bot1: bot1.id,
            bot2: bot2.id,
            author1: bot1.author_id,
            author2: bot2.author_id,
            error: error_text.to_string(),
        }),
    )
    .await;
}

async fn broadcast_to_both(state: &AppState, bot1: &Bot, bot2: &Bot, kind: &str, body: Value) {
    state
        .hub
        .publish(StatusMessage::new(
            bot1.author_id,
            &bot1.game_slug,
            kind,
            body.clone(),
        ))
        .await;
    state
        .hub
        .publish(StatusMessage::new(bot2.author_id, &bot2.game_slug, kind, body))
        .await;
}
