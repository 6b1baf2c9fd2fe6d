//! Fan-out of live status updates to WebSocket subscribers.
//!
//! A single coordinator task owns the routing table and is its only
//! mutator; registration, removal and publishing all flow through channels,
//! so the table needs no locks. Routing is keyed by author id, then game
//! slug, then session id, with `WILDCARD_AUTHOR`/`ALL_GAMES` naming the
//! catch-all buckets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

/// Author id subscribers use to watch every author.
pub const WILDCARD_AUTHOR: i64 = 0;
/// Game slug subscribers use to watch every game.
pub const ALL_GAMES: &str = "";

/// Per-session buffer. Overflow drops the oldest updates: a slow client
/// misses intermediate states rather than stalling the coordinator.
const SESSION_BUFFER: usize = 256;

/// One live WebSocket, keyed into the routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub user_id: i64,
    pub game_slug: String,
    pub session_id: String,
}

/// A routed status update. Only `kind` and `body` ever reach clients.
#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub author_id: i64,
    pub game_slug: String,
    pub private: bool,
    pub kind: String,
    pub body: serde_json::Value,
}

impl StatusMessage {
    pub fn new(author_id: i64, game_slug: &str, kind: &str, body: serde_json::Value) -> Self {
        StatusMessage {
            author_id,
            game_slug: game_slug.to_string(),
            private: false,
            kind: kind.to_string(),
            body,
        }
    }

    /// Exclude the anonymous wildcard buckets from delivery.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    fn envelope(&self) -> WsEnvelope {
        WsEnvelope {
            kind: self.kind.clone(),
            body: self.body.clone(),
        }
    }
}

/// Wire form of a status update, routing fields stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub body: serde_json::Value,
}

struct Registration {
    sub: Subscription,
    sender: broadcast::Sender<WsEnvelope>,
}

/// Handle for talking to the coordinator task.
#[derive(Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<Registration>,
    unregister_tx: mpsc::Sender<Subscription>,
    broadcast_tx: mpsc::Sender<StatusMessage>,
}

impl Hub {
    /// Start the coordinator task and return its handle.
    pub fn spawn() -> Hub {
        let (register_tx, register_rx) = mpsc::channel(64);
        let (unregister_tx, unregister_rx) = mpsc::channel(64);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(64);
        tokio::spawn(run_coordinator(register_rx, unregister_rx, broadcast_rx));
        Hub {
            register_tx,
            unregister_tx,
            broadcast_tx,
        }
    }

    /// Add a session to the routing table; the returned receiver feeds the
    /// session's writer task and closes when the session is unregistered.
    pub async fn register(&self, sub: Subscription) -> broadcast::Receiver<WsEnvelope> {
        let (sender, receiver) = broadcast::channel(SESSION_BUFFER);
        let _ = self.register_tx.send(Registration { sub, sender }).await;
        receiver
    }

    pub async fn unregister(&self, sub: Subscription) {
        let _ = self.unregister_tx.send(sub).await;
    }

    /// Queue a message for delivery to every matching session.
    pub async fn publish(&self, message: StatusMessage) {
        let _ = self.broadcast_tx.send(message).await;
    }
}

/// author id -> game slug -> session id -> session channel
type RoutingTable = HashMap<i64, HashMap<String, HashMap<String, broadcast::Sender<WsEnvelope>>>>;

async fn run_coordinator(
    mut register_rx: mpsc::Receiver<Registration>,
    mut unregister_rx: mpsc::Receiver<Subscription>,
    mut broadcast_rx: mpsc::Receiver<StatusMessage>,
) {
    let mut sessions: RoutingTable = HashMap::new();
    loop {
        tokio::select! {
            // registrations and removals win over pending broadcasts so a
            // session never receives messages across its own unregister
            biased;

            registration = register_rx.recv() => match registration {
                Some(registration) => register(&mut sessions, registration),
                None => break,
            },
            sub = unregister_rx.recv() => match sub {
                Some(sub) => unregister(&mut sessions, &sub),
                None => break,
            },
            message = broadcast_rx.recv() => match message {
                Some(message) => deliver(&sessions, &message),
                None => break,
            },
        }
    }
}

fn register(sessions: &mut RoutingTable, registration: Registration) {
    let Registration { sub, sender } = registration;
    sessions
        .entry(sub.user_id)
        .or_default()
        .entry(sub.game_slug)
        .or_default()
        .insert(sub.session_id, sender);
}

/// Remove the session and prune now-empty sub-maps. Dropping the sender
/// closes the session's channel, which ends its writer task.
fn unregister(sessions: &mut RoutingTable, sub: &Subscription) {
    if let Some(games) = sessions.get_mut(&sub.user_id) {
        if let Some(ids) = games.get_mut(&sub.game_slug) {
            ids.remove(&sub.session_id);
            if ids.is_empty() {
                games.remove(&sub.game_slug);
            }
        }
        if games.is_empty() {
            sessions.remove(&sub.user_id);
        }
    }
}

fn deliver(sessions: &RoutingTable, message: &StatusMessage) {
    let envelope = message.envelope();

    if let Some(games) = sessions.get(&message.author_id) {
        // watchers of this author + game, then of the author's whole profile
        send_all(games.get(&message.game_slug), &envelope);
        send_all(games.get(ALL_GAMES), &envelope);
    }

    if !message.private {
        if let Some(games) = sessions.get(&WILDCARD_AUTHOR) {
            // anonymous watchers of the game, then of everything
            send_all(games.get(&message.game_slug), &envelope);
            send_all(games.get(ALL_GAMES), &envelope);
        }
    }
}

fn send_all(
    ids: Option<&HashMap<String, broadcast::Sender<WsEnvelope>>>,
    envelope: &WsEnvelope,
) {
    if let Some(ids) = ids {
        for sender in ids.values() {
            // a send only fails when the writer is already gone; the
            // pending unregister will prune the entry
            let _ = sender.send(envelope.clone());
        }
    }
}
