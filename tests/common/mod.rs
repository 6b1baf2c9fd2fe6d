//! Shared fakes and state builders for the integration suite.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use botarena::broker::{TestTask, TesterEvent, TesterRpc};
use botarena::clients::{
    AuthClient, GameInfo, GamesClient, Notification, NotifyClient, SessionPayload, UserInfo,
};
use botarena::config::Config;
use botarena::errors::ApiError;
use botarena::hub::Hub;
use botarena::server::AppState;
use botarena::store::MemStore;

/// Tester fake that answers each dispatch with the next scripted event list.
#[derive(Default)]
pub struct ScriptedTester {
    scripts: Mutex<VecDeque<Vec<TesterEvent>>>,
    pub dispatched: Mutex<Vec<TestTask>>,
}

impl ScriptedTester {
    pub fn new() -> Self {
        ScriptedTester::default()
    }

    pub async fn script(&self, events: Vec<TesterEvent>) {
        self.scripts.lock().await.push_back(events);
    }
}

#[async_trait]
impl TesterRpc for ScriptedTester {
    async fn dispatch(&self, task: &TestTask) -> Result<mpsc::Receiver<TesterEvent>, ApiError> {
        self.dispatched.lock().await.push(task.clone());
        let events = self.scripts.lock().await.pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for event in events {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

/// Auth fake over a fixed user set; tokens are `tok<user id>`.
pub struct FakeAuth {
    users: Vec<UserInfo>,
}

impl FakeAuth {
    pub fn with_users(users: Vec<UserInfo>) -> Self {
        FakeAuth { users }
    }
}

pub fn user(id: i64, username: &str) -> UserInfo {
    UserInfo {
        id,
        username: username.to_string(),
        photo_uuid: None,
        active: true,
    }
}

#[async_trait]
impl AuthClient for FakeAuth {
    async fn session(&self, token: &str) -> Result<SessionPayload, ApiError> {
        let id: i64 = token
            .strip_prefix("tok")
            .and_then(|rest| rest.parse().ok())
            .ok_or(ApiError::Unauthorized)?;
        if self.users.iter().any(|u| u.id == id) {
            Ok(SessionPayload { id })
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn user_by_id(&self, id: i64) -> Result<UserInfo, ApiError> {
        self.users
            .iter()
            .find(|u| u.id == id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn user_by_username(&self, username: &str) -> Result<UserInfo, ApiError> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserInfo>, ApiError> {
        Ok(self
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }
}

pub struct FakeGames {
    games: HashMap<String, GameInfo>,
}

impl FakeGames {
    pub fn with_game(slug: &str, bot_code: &str) -> Self {
        let mut games = HashMap::new();
        games.insert(
            slug.to_lowercase(),
            GameInfo {
                slug: slug.to_string(),
                bot_code: bot_code.to_string(),
            },
        );
        FakeGames { games }
    }
}

#[async_trait]
impl GamesClient for FakeGames {
    async fn game_by_slug(&self, slug: &str) -> Result<GameInfo, ApiError> {
        self.games
            .get(&slug.to_lowercase())
            .cloned()
            .ok_or(ApiError::NotFound)
    }
}

#[derive(Default)]
pub struct RecordingNotify {
    pub sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotifyClient for RecordingNotify {
    async fn send(&self, note: Notification) -> Result<(), ApiError> {
        self.sent.lock().await.push(note);
        Ok(())
    }
}

/// Everything the tests need a handle on after building an `AppState`.
pub struct TestEnv {
    pub state: AppState,
    pub tester: Arc<ScriptedTester>,
    pub notify: Arc<RecordingNotify>,
}

pub fn test_env(users: Vec<UserInfo>) -> TestEnv {
    let tester = Arc::new(ScriptedTester::new());
    let notify = Arc::new(RecordingNotify::default());
    let state = AppState {
        store: Arc::new(MemStore::new()),
        tester: tester.clone(),
        auth: Arc::new(FakeAuth::with_users(users)),
        games: Arc::new(FakeGames::with_game("pong", "builtin=1")),
        notify: notify.clone(),
        hub: Hub::spawn(),
        config: Arc::new(Config::default()),
    };
    TestEnv {
        state,
        tester,
        notify,
    }
}

/// Serve the API on an OS-assigned port and return its base URL.
pub async fn spawn_server(state: AppState) -> anyhow::Result<String> {
    let app = botarena::server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("test server error: {e}");
        }
    });
    Ok(format!("http://{addr}"))
}
