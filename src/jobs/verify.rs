//! Verification job: a fresh submission plays the game's built-in opponent.

use serde_json::Value;
use tokio::sync::mpsc::Receiver;

use crate::broker::{ResultBody, TesterEvent};
use crate::clients::Notification;
use crate::hub::StatusMessage;
use crate::server::AppState;
use crate::store::{Bot, NewMatch, INITIAL_SCORE, RESULT_BOT1, RESULT_DRAW, RESULT_ERROR};
use crate::types::{BotStatus, MatchInfo};

// Historical status strings; clients match on them verbatim.
const STATUS_VERIFIED: &str = "Verifyed\n";
const STATUS_NOT_VERIFIED: &str = "Not Verifyed\n";
const STATUS_ERROR: &str = "Not Verifyed. Error!\n";

/// Consume the reply stream of a verify job.
pub async fn run_verify(state: AppState, bot: Bot, mut events: Receiver<TesterEvent>) {
    while let Some(event) = events.recv().await {
        tracing::info!(bot_id = bot.id, event = ?event_kind(&event), "processing verify event");
        match event {
            TesterEvent::Status(_) => {}
            TesterEvent::Result(body) => handle_result(&state, &bot, body).await,
            TesterEvent::Error(body) => handle_error(&state, &bot, &body.error).await,
        }
    }
}

fn event_kind(event: &TesterEvent) -> &'static str {
    match event {
        TesterEvent::Status(_) => "status",
        TesterEvent::Result(_) => "result",
        TesterEvent::Error(_) => "error",
    }
}

async fn handle_result(state: &AppState, bot: &Bot, body: ResultBody) {
    let verified = matches!(body.result, RESULT_DRAW | RESULT_BOT1);
    let diff = if verified { INITIAL_SCORE } else { 0 };

    // a failed verify leaves the bot exactly as submitted
    if verified {
        if let Err(error) = state.store.set_bot_verified(bot.id, true).await {
            tracing::error!(bot_id = bot.id, %error, "marking bot verified");
        }
        if let Err(error) = state.store.set_bot_score(bot.id, INITIAL_SCORE).await {
            tracing::error!(bot_id = bot.id, %error, "setting initial score");
        }
    }

    let recorded = state
        .store
        .create_match(NewMatch {
            game_slug: bot.game_slug.clone(),
            result: body.result,
            info: body.info,
            states: body.states,
            error: None,
            bot1: bot.id,
            author1: bot.author_id,
            diff1: diff,
            error1: body.error_1,
            bot2: None,
            author2: None,
            diff2: None,
            error2: None,
        })
        .await;

    let status = if verified {
        STATUS_VERIFIED
    } else {
        STATUS_NOT_VERIFIED
    };
    publish_status(state, bot, status).await;

    match recorded {
        Ok(m) => {
            state
                .hub
                .publish(StatusMessage::new(
                    bot.author_id,
                    &bot.game_slug,
                    "match",
                    body_json(&MatchInfo::from(&m)),
                ))
                .await;
        }
        Err(error) => {
            tracing::error!(bot_id = bot.id, %error, "recording verify match");
        }
    }

    notify_verify(state, bot, verified).await;
}

async fn handle_error(state: &AppState, bot: &Bot, error_text: &str) {
    tracing::info!(bot_id = bot.id, error = error_text, "verify failed in tester");

    if let Err(error) = state.store.set_bot_verified(bot.id, false).await {
        tracing::error!(bot_id = bot.id, %error, "marking bot unverified");
    }

    if let Err(error) = state
        .store
        .create_match(NewMatch {
            game_slug: bot.game_slug.clone(),
            result: RESULT_ERROR,
            info: Value::Null,
            states: Value::Null,
            error: Some(error_text.to_string()),
            bot1: bot.id,
            author1: bot.author_id,
            diff1: 0,
            error1: None,
            bot2: None,
            author2: None,
            diff2: None,
            error2: None,
        })
        .await
    {
        tracing::error!(bot_id = bot.id, %error, "recording failed verify match");
    }

    publish_status(state, bot, STATUS_ERROR).await;
    notify_verify(state, bot, false).await;
}

async fn publish_status(state: &AppState, bot: &Bot, new_status: &str) {
    let body = body_json(&BotStatus {
        bot_id: bot.id,
        new_status: new_status.to_string(),
    });
    state
        .hub
        .publish(StatusMessage::new(
            bot.author_id,
            &bot.game_slug,
            "verify",
            body,
        ))
        .await;
}

async fn notify_verify(state: &AppState, bot: &Bot, verified: bool) {
    let note = Notification {
        kind: "verify".to_string(),
        user_id: bot.author_id,
        game_slug: bot.game_slug.clone(),
        body: serde_json::json!({ "bot_id": bot.id, "verified": verified }),
    };
    if let Err(error) = state.notify.send(note).await {
        tracing::error!(bot_id = bot.id, %error, "sending verify notification");
    }
}

pub(crate) fn body_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
