//! Hub routing: wildcard buckets and the private flag.

use std::time::Duration;

use botarena::hub::{Hub, StatusMessage, Subscription};

fn sub(user_id: i64, game_slug: &str, session_id: &str) -> Subscription {
    Subscription {
        user_id,
        game_slug: game_slug.to_string(),
        session_id: session_id.to_string(),
    }
}

#[tokio::test]
async fn public_messages_reach_all_wildcard_buckets() -> anyhow::Result<()> {
    let hub = Hub::spawn();
    let mut author_game = hub.register(sub(7, "pong", "s1")).await;
    let mut author_all = hub.register(sub(7, "", "s2")).await;
    let mut game_watchers = hub.register(sub(0, "pong", "s3")).await;
    let mut firehose = hub.register(sub(0, "", "s4")).await;
    let mut other_author = hub.register(sub(8, "pong", "s5")).await;
    let mut other_game = hub.register(sub(0, "tron", "s6")).await;

    hub.publish(StatusMessage::new(
        7,
        "pong",
        "verify",
        serde_json::json!({"round": 1}),
    ))
    .await;

    for rx in [
        &mut author_game,
        &mut author_all,
        &mut game_watchers,
        &mut firehose,
    ] {
        let envelope = rx.recv().await?;
        assert_eq!(envelope.kind, "verify");
        assert_eq!(envelope.body["round"].as_i64(), Some(1));
    }

    hub.publish(
        StatusMessage::new(7, "pong", "match", serde_json::json!({"round": 2})).private(),
    )
    .await;

    assert_eq!(author_game.recv().await?.body["round"].as_i64(), Some(2));
    assert_eq!(author_all.recv().await?.body["round"].as_i64(), Some(2));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(game_watchers.try_recv().is_err(), "private leaked to (0, game)");
    assert!(firehose.try_recv().is_err(), "private leaked to (0, all)");
    assert!(other_author.try_recv().is_err());
    assert!(other_game.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn routing_fields_never_reach_the_wire() -> anyhow::Result<()> {
    let hub = Hub::spawn();
    let mut rx = hub.register(sub(7, "pong", "s1")).await;
    hub.publish(StatusMessage::new(
        7,
        "pong",
        "verify",
        serde_json::json!({"bot_id": 3}),
    ))
    .await;

    let envelope = rx.recv().await?;
    let wire = serde_json::to_value(&envelope)?;
    assert_eq!(
        wire,
        serde_json::json!({ "type": "verify", "body": { "bot_id": 3 } })
    );
    Ok(())
}
