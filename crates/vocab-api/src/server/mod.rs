use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, Request, State};
use axum::http::header::{HeaderName, HeaderValue};
use axum::http::Method;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use contracts::{
    ApiError, CatalogueEntry, ErrorCode, LobbyEvent, LobbyStatus, PlayerId, SessionSettings,
    SettingsUpdate, SCHEMA_VERSION_V1,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use vocab_core::SettingsError;

use crate::{LobbyApi, LobbyError};

/// Real-time step of the lobby clock while serving.
const CLOCK_TICK_MS: u64 = 100;
const MAX_EVENT_PAGE: usize = 1000;

include!("error.rs");
include!("state.rs");
include!("routes/lobby.rs");
include!("routes/input.rs");
include!("routes/stream.rs");
include!("util.rs");

pub async fn serve(addr: SocketAddr, lobby: LobbyApi) -> Result<(), ServerError> {
    let state = AppState::new(lobby);
    let ticker = tokio::spawn(run_clock(state.clone()));
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "lobby api listening");
    let served = axum::serve(listener, app).await;
    ticker.abort();
    served?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/lobby/status", get(get_status))
        .route("/api/v1/lobby/players", post(join_player))
        .route("/api/v1/lobby/players/{player_id}", delete(leave_player))
        .route("/api/v1/lobby/round/start", post(start_round))
        .route("/api/v1/lobby/round/end", post(end_round))
        .route("/api/v1/lobby/players/{player_id}/chat", post(submit_chat))
        .route(
            "/api/v1/lobby/players/{player_id}/terminal",
            post(submit_terminal),
        )
        .route(
            "/api/v1/lobby/players/{player_id}/speech",
            post(submit_speech),
        )
        .route(
            "/api/v1/lobby/settings",
            get(get_settings).post(update_settings),
        )
        .route("/api/v1/lobby/settings/forced", post(set_forced_categories))
        .route("/api/v1/lobby/catalogue", get(get_catalogue))
        .route("/api/v1/lobby/clock/advance", post(advance_clock))
        .route("/api/v1/lobby/events", get(get_events))
        .route("/api/v1/lobby/stream", get(stream_lobby))
        .layer(middleware::from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        let mut response = Response::new(axum::body::Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut());
    response
}

/// Drives timed punishments in real time.
async fn run_clock(state: AppState) {
    let mut interval = tokio::time::interval(Duration::from_millis(CLOCK_TICK_MS));
    loop {
        interval.tick().await;
        let messages = {
            let mut inner = state.inner.lock().await;
            inner.lobby.advance_clock(CLOCK_TICK_MS);
            collect_new_events(&mut inner)
        };
        broadcast_messages(&state, messages);
    }
}
