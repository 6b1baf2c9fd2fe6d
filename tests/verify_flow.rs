//! Submission-to-verification flow against a live server with a scripted
//! tester.

mod common;

use std::time::Duration;

use botarena::broker::{ErrorBody, ResultBody, StatusBody, TesterEvent};
use botarena::hub::Subscription;
use botarena::store::{Bot, MatchFilter};

use common::{test_env, user};

fn upload_body(code: &str) -> serde_json::Value {
    serde_json::json!({ "code": code, "game_slug": "pong", "lang": "JS" })
}

async fn wait_for_bot<F>(env: &common::TestEnv, bot_id: i64, pred: F) -> Bot
where
    F: Fn(&Bot) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let bot = env.state.store.bot_by_id(bot_id).await.unwrap();
        if pred(&bot) {
            return bot;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "bot {bot_id} never reached the expected state: {bot:?}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn verify_pass_scores_and_notifies() -> anyhow::Result<()> {
    let env = test_env(vec![user(7, "alice")]);
    env.tester
        .script(vec![
            TesterEvent::Status(StatusBody {
                new_status: "compiling".to_string(),
            }),
            TesterEvent::Result(ResultBody {
                result: 1,
                info: serde_json::json!({}),
                states: serde_json::json!([]),
                error_1: None,
                error_2: None,
            }),
        ])
        .await;

    let mut updates = env
        .state
        .hub
        .register(Subscription {
            user_id: 7,
            game_slug: "pong".to_string(),
            session_id: "watch".to_string(),
        })
        .await;

    let base = common::spawn_server(env.state.clone()).await?;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/bots"))
        .header("Cookie", "session_id=tok7")
        .json(&upload_body("a=1"))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let full: serde_json::Value = resp.json().await?;
    assert_eq!(full["author"]["username"], "alice");
    assert_eq!(full["code"], "a=1");
    assert_eq!(full["is_verified"], false);

    let bot_id = full["id"].as_i64().unwrap();
    let bot = wait_for_bot(&env, bot_id, |b| b.is_verified && b.score == 400).await;
    assert_eq!(bot.games_played, 0);

    // status fan-out: the verify status first, then the recorded match
    let verify = updates.recv().await?;
    assert_eq!(verify.kind, "verify");
    assert_eq!(verify.body["bot_id"].as_i64(), Some(bot_id));
    assert_eq!(verify.body["new_status"], "Verifyed\n");
    let outcome = updates.recv().await?;
    assert_eq!(outcome.kind, "match");

    // the match fan-out only goes out after the row is stored
    let matches = env
        .state
        .store
        .list_matches(&MatchFilter {
            author_id: None,
            game_slug: None,
            limit: 10,
            since: i64::MAX,
        })
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    let m = &matches[0];
    assert_eq!(m.result, 1);
    assert_eq!(m.bot1, bot_id);
    assert_eq!(m.author1, 7);
    assert_eq!(m.diff1, 400);
    assert_eq!(m.bot2, None);
    assert_eq!(m.author2, None);
    assert_eq!(outcome.body["id"].as_i64(), Some(m.id));

    // the notification is the machine's last step
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while env.notify.sent.lock().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "verify notification never sent"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = env.notify.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, "verify");
    assert_eq!(sent[0].user_id, 7);
    assert_eq!(sent[0].game_slug, "pong");
    assert_eq!(sent[0].body["verified"], true);
    Ok(())
}

#[tokio::test]
async fn verify_error_leaves_bot_unverified() -> anyhow::Result<()> {
    let env = test_env(vec![user(7, "alice")]);
    env.tester
        .script(vec![TesterEvent::Error(ErrorBody {
            error: "syntax".to_string(),
        })])
        .await;

    let base = common::spawn_server(env.state.clone()).await?;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/v1/bots"))
        .header("Cookie", "session_id=tok7")
        .json(&upload_body("a=("))
        .send()
        .await?;
    assert_eq!(resp.status(), 200);
    let full: serde_json::Value = resp.json().await?;
    let bot_id = full["id"].as_i64().unwrap();

    // wait for the failed verify to be recorded
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let m = loop {
        let matches = env
            .state
            .store
            .list_matches(&MatchFilter {
                author_id: None,
                game_slug: None,
                limit: 10,
                since: i64::MAX,
            })
            .await
            .unwrap();
        if let Some(m) = matches.first() {
            break m.clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "failed verify was never recorded"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    assert_eq!(m.result, 3);
    assert_eq!(m.error.as_deref(), Some("syntax"));
    assert_eq!(m.diff1, 0);

    let bot = env.state.store.bot_by_id(bot_id).await.unwrap();
    assert!(!bot.is_verified);
    assert_eq!(bot.score, 0);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while env.notify.sent.lock().await.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "verify notification never sent"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = env.notify.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, "verify");
    assert_eq!(sent[0].body["verified"], false);
    Ok(())
}

#[tokio::test]
async fn verify_dispatch_carries_builtin_opponent() -> anyhow::Result<()> {
    let env = test_env(vec![user(7, "alice")]);
    env.tester.script(vec![]).await;

    let base = common::spawn_server(env.state.clone()).await?;
    let client = reqwest::Client::new();
    client
        .post(format!("{base}/v1/bots"))
        .header("Cookie", "session_id=tok7")
        .json(&upload_body("a=1"))
        .send()
        .await?
        .error_for_status()?;

    let dispatched = env.tester.dispatched.lock().await;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].code1, "a=1");
    assert_eq!(dispatched[0].code2, "builtin=1");
    assert_eq!(dispatched[0].game_slug, "pong");
    Ok(())
}
