//! HTTP surface: dashboard, JSON endpoints, SSE stream and the WebSocket
//! route.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::dashboard::render_dashboard;
use crate::sampler::current_snapshot;
use crate::state::AppState;
use crate::ws::ws_handler;

/// Reconnect delay suggested to EventSource clients.
pub const SSE_RETRY: Duration = Duration::from_millis(4000);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/api/stats", get(stats))
        .route("/api/stream", get(stream_snapshots))
        .route("/api/config", get(config))
        .route("/api/alerts", post(set_alerts))
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(middleware::map_response(security_headers))
        .with_state(state)
}

async fn security_headers(mut res: Response) -> Response {
    let headers = res.headers_mut();
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    res
}

async fn healthz() -> &'static str {
    "ok"
}

async fn dashboard(State(state): State<AppState>) -> Html<String> {
    let snapshot = current_snapshot(&state).await;
    let config = state.config.read().await.clone();
    Html(render_dashboard(&snapshot, &config, &state.hostname))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = current_snapshot(&state).await;
    Json((*snapshot).clone())
}

async fn config(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.read().await.clone())
}

async fn stream_snapshots(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // subscribe before reading the cache so no tick falls in between
    let sub = state.broadcaster.subscribe_channel();
    let mut greeting = vec![Event::default().retry(SSE_RETRY)];
    if let Some(latest) = state.latest.read().await.clone() {
        if let Ok(json) = serde_json::to_string(&*latest) {
            greeting.push(Event::default().data(json));
        }
    }

    let live = stream::unfold(sub, |mut sub| async move {
        let json = sub.recv().await?;
        Some((Event::default().data(&*json), sub))
    });

    Sse::new(stream::iter(greeting).chain(live).map(Ok)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
struct AlertsToggle {
    enabled: String,
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

async fn set_alerts(
    State(state): State<AppState>,
    Query(q): Query<AlertsToggle>,
) -> Result<Json<Config>, (StatusCode, String)> {
    let enabled = parse_flag(&q.enabled)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("enabled must be 0 or 1, got {:?}", q.enabled)))?;

    let updated = {
        let mut cfg = state.config.write().await;
        cfg.alerts_enabled = enabled;
        cfg.clone()
    };
    info!(enabled, "alerts toggled");

    // the in-memory switch holds even when the file cannot be written
    let store = state.config_store.clone();
    let to_save = updated.clone();
    match tokio::task::spawn_blocking(move || store.save(&to_save)).await {
        Ok(Ok(path)) => info!(path = %path.display(), "config saved"),
        Ok(Err(e)) => warn!("config not persisted: {e}"),
        Err(e) => warn!("config save task failed: {e}"),
    }
    Ok(Json(updated))
}
