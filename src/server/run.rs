// Router assembly and server startup.

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::jobs::scheduler::run_scheduler;
use crate::server::{http, ws, AppState};

pub fn build_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/bots", post(http::create_bot).get(http::list_bots))
        .route("/bots/verification", get(ws::verify_ws))
        .route("/matches", get(http::list_matches))
        .route("/matches/:match_id", get(http::get_match));

    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "ok": true })) }),
        )
        .nest("/v1", v1)
        .with_state(state)
}

/// Serve the HTTP API and run the matchmaking scheduler alongside it.
pub async fn run_server(state: AppState) -> Result<()> {
    let app = build_router(state.clone());

    {
        let state = state.clone();
        tokio::spawn(async move {
            run_scheduler(state).await;
        });
    }

    let addr = state.config.http_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(%addr, "bot coordinator listening");
    axum::serve(listener, app)
        .await
        .context("serving HTTP API")?;
    Ok(())
}
