//! # Emotion Fusion
//!
//! Fuses the emotional states reported by many simultaneous users into one
//! shared affect point, and turns that point into a stable, versioned music
//! directive for a weighted-prompt generator.
//!
//! The pipeline is pure and deterministic:
//!
//! ```text
//! events → UserAffectStore → FusionEngine::fuse → prompt::synthesize → PromptState
//! ```
//!
//! [`service::FusionService`] wraps it with locking, a decay tick and a
//! non-blocking publish queue; [`server`] exposes it over HTTP.

pub mod catalog;
pub mod config;
pub mod error;
pub mod fusion;
pub mod prompt;
pub mod publisher;
pub mod server;
pub mod service;
pub mod store;

pub use catalog::{AffectPoint, AxisWeights, Emotion, StyleDescriptor};
pub use config::EngineConfig;
pub use error::{FusionError, Result};
pub use fusion::{FusedState, FusionEngine};
pub use prompt::{synthesize, Directive, PromptState, SessionPhase};
pub use publisher::{DirectivePublisher, PublishError, PublishHandle, PublishQueue};
pub use service::{FusionService, ServiceStatus};
pub use store::{UserAffectStore, UserObservation};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
