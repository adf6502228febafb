//! Axum route handlers for the emotion fusion HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`          Returns `{"status": "ok", "service": "emotion-fusion", "version": ...}`
//! - `GET  /status`          Current fused state, directive and sessions
//! - `POST /update_emotion`  Accepts `{"user_emotion_data": {...}}`
//! - `POST /join_session`    `?user_id=...&device_info=...`
//! - `POST /leave_session`   `?user_id=...`
//! - `GET  /directives`      Server-sent events, one `directive` event per published version

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::FusionError;
use crate::prompt::PromptState;
use crate::publisher::BroadcastPublisher;
use crate::service::{FusionService, ServiceStatus};

type ApiError = (StatusCode, Json<Value>);

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FusionService>,
    /// Source of the `/directives` event stream.
    pub directives: BroadcastPublisher,
    /// Flips to `true` on shutdown; open event streams end with it.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        service: Arc<FusionService>,
        directives: BroadcastPublisher,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            directives,
            shutdown,
        }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/update_emotion", post(update_emotion_handler))
        .route("/join_session", post(join_session_handler))
        .route("/leave_session", post(leave_session_handler))
        .route("/directives", get(directives_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body of `POST /update_emotion`.
#[derive(Debug, Deserialize)]
pub struct UpdateEmotionRequest {
    pub user_emotion_data: UserEmotionData,
}

#[derive(Debug, Deserialize)]
pub struct UserEmotionData {
    pub user_id: String,
    /// Catalog label, e.g. `"Happy"` or `"Happy (开心)"`.
    pub emotion: String,
    pub intensity: f64,
    /// Unix seconds as reported by the client. Defaults to receive time.
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub device_info: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: String,
    #[serde(default)]
    pub device_info: Option<String>,
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "emotion-fusion",
        "version": crate::VERSION,
    }))
}

async fn status_handler(State(state): State<AppState>) -> Json<ServiceStatus> {
    Json(state.service.current_status())
}

/// POST /update_emotion
///
/// Unknown emotions and out-of-range intensities are answered with
/// `422 Unprocessable Entity` and leave the session untouched.
async fn update_emotion_handler(
    State(state): State<AppState>,
    Json(request): Json<UpdateEmotionRequest>,
) -> Result<Json<Value>, ApiError> {
    let data = request.user_emotion_data;
    let user_id = require_user_id(&data.user_id)?;
    let received = Utc::now();
    let at = data
        .timestamp
        .and_then(epoch_secs)
        .map_or(received, |at| at.min(received));

    if data.device_info.is_some() && !state.service.has_session(user_id) {
        state
            .service
            .user_joined(user_id, data.device_info.clone(), at);
    }

    let emotion = state
        .service
        .submit_emotion(user_id, &data.emotion, data.intensity, at)
        .map_err(rejection)?;

    Ok(Json(json!({
        "status": "ok",
        "user_id": user_id,
        "emotion": emotion.label(),
        "intensity": data.intensity,
    })))
}

async fn join_session_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_user_id(&query.user_id)?;
    state
        .service
        .user_joined(user_id, query.device_info.clone(), Utc::now());
    Ok(Json(json!({
        "status": "joined",
        "user_id": user_id,
        "device_info": query.device_info,
    })))
}

async fn leave_session_handler(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Json<Value>, ApiError> {
    let user_id = require_user_id(&query.user_id)?;
    let removed = state.service.user_left(user_id);
    Ok(Json(json!({
        "status": "left",
        "user_id": user_id,
        "removed": removed,
    })))
}

/// GET /directives
///
/// Lagging subscribers skip the versions they missed; the next event is
/// always the newest directive they can still receive.
async fn directives_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static> {
    let rx = state.directives.subscribe();
    let mut shutdown = state.shutdown.clone();
    let stopped = async move {
        let _ = shutdown.wait_for(|stop| *stop).await;
    };

    let stream = futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(directive) => return Some((Ok(directive_event(&directive)), rx)),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::warn!("Directive subscriber lagged by {} versions", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .take_until(stopped);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn directive_event(directive: &PromptState) -> Event {
    Event::default()
        .event("directive")
        .id(directive.version.to_string())
        .json_data(directive)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

fn require_user_id(user_id: &str) -> Result<&str, ApiError> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id must not be empty" })),
        ));
    }
    Ok(user_id)
}

fn rejection(err: FusionError) -> ApiError {
    let status = if err.is_rejection() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(json!({ "error": err.to_string() })))
}

fn epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((secs * 1000.0) as i64)
}
