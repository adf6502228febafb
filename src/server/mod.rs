//! HTTP surface of the fusion service.
//!
//! # Endpoints
//!
//! - `GET  /health`          Liveness check
//! - `GET  /status`          Diagnostics snapshot
//! - `POST /update_emotion`  Submit one user's emotion
//! - `POST /join_session`    Register a user
//! - `POST /leave_session`   Remove a user
//! - `GET  /directives`      Live stream of published directives (SSE)

pub mod routes;

pub use routes::{app_router, AppState};
