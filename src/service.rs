//! Fusion service: the concurrent shell around the pure pipeline.
//!
//! Inbound events validate first and only then take the store lock, so a
//! rejected event never leaves a trace. Accepted events mark the state dirty
//! through a [`Notify`]; a single worker coalesces bursts into one recompute.
//! The recompute itself is serialized by its own lock, so at most one is ever
//! in flight and versions are published in order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::catalog::Emotion;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::fusion::{FusedState, FusionEngine};
use crate::prompt::{synthesize, PromptState, WeightedPrompt};
use crate::publisher::PublishHandle;
use crate::store::{validate_intensity, UserAffectStore, UserSession};

/// A connected user as reported by diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub session: UserSession,
    /// Whether the user currently has a non-stale observation.
    pub is_active: bool,
}

/// Read-only snapshot of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub fused: FusedState,
    pub prompt: PromptState,
    /// What a weighted-prompt generator would currently receive.
    pub prompts: Vec<WeightedPrompt>,
    pub sessions: Vec<SessionStatus>,
    pub active_user_count: usize,
}

#[derive(Debug, Clone)]
struct Current {
    fused: FusedState,
    prompt: PromptState,
}

pub struct FusionService {
    config: EngineConfig,
    engine: FusionEngine,
    store: Mutex<UserAffectStore>,
    current: RwLock<Current>,
    recompute: Mutex<()>,
    dirty: Notify,
    publisher: PublishHandle,
}

impl FusionService {
    pub fn new(config: EngineConfig, publisher: PublishHandle) -> Self {
        let engine = FusionEngine::new(config.fusion.clone());
        let fused = FusedState::baseline(config.fusion.baseline, Utc::now());
        let prompt = PromptState::resting(&fused, &config.synthesis);
        Self {
            config,
            engine,
            store: Mutex::new(UserAffectStore::new()),
            current: RwLock::new(Current { fused, prompt }),
            recompute: Mutex::new(()),
            dirty: Notify::new(),
            publisher,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record a user's emotion. Unknown labels and out-of-range intensities
    /// are rejected before any state is touched.
    ///
    /// `at` is capped at the receive time so a skewed client clock cannot
    /// keep an observation fresh forever.
    pub fn submit_emotion(
        &self,
        user_id: &str,
        label: &str,
        intensity: f64,
        at: DateTime<Utc>,
    ) -> Result<Emotion> {
        let emotion: Emotion = label.parse()?;
        let intensity = validate_intensity(intensity)?;
        let received = Utc::now();
        let at = if at > received {
            log::warn!(
                "User {} sent a timestamp {} ms ahead, using receive time",
                user_id,
                (at - received).num_milliseconds()
            );
            received
        } else {
            at
        };

        self.store.lock().upsert(user_id, emotion, intensity, at)?;
        log::debug!(
            "User {} reported {} ({:.2})",
            user_id,
            emotion.label(),
            intensity
        );
        self.dirty.notify_one();
        Ok(emotion)
    }

    /// Register a session for `user_id`.
    pub fn user_joined(&self, user_id: &str, device_info: Option<String>, at: DateTime<Utc>) {
        self.store.lock().join(user_id, device_info, at);
        log::info!("User {} joined the session", user_id);
        self.dirty.notify_one();
    }

    pub fn has_session(&self, user_id: &str) -> bool {
        self.store.lock().session(user_id).is_some()
    }

    /// Drop a user's session and observation. Returns whether the user
    /// had a live observation.
    pub fn user_left(&self, user_id: &str) -> bool {
        let removed = self.store.lock().remove(user_id).is_some();
        log::info!("User {} left the session", user_id);
        self.dirty.notify_one();
        removed
    }

    /// Run one fuse-and-synthesize step. Returns whether a new directive
    /// version was published.
    pub fn recompute_at(&self, now: DateTime<Utc>) -> bool {
        let _serialized = self.recompute.lock();

        let snapshot = self.store.lock().snapshot();
        let fused = self.engine.fuse(&snapshot, now);
        let previous = self.current.read().prompt.clone();
        let synthesis = synthesize(&fused, &previous, &self.config.synthesis);

        {
            let mut current = self.current.write();
            current.fused = fused;
            current.prompt = synthesis.state.clone();
        }

        if synthesis.published {
            self.publisher.offer(synthesis.state);
        }
        synthesis.published
    }

    /// Decay tick: evict stale observations, then recompute.
    pub fn tick_at(&self, now: DateTime<Utc>) -> bool {
        let evicted = self
            .store
            .lock()
            .evict_stale(now, self.config.fusion.stale_ttl());
        if !evicted.is_empty() {
            log::info!("Evicted stale observations: {}", evicted.join(", "));
        }
        self.recompute_at(now)
    }

    /// Spawn the worker that recomputes on every dirty signal and decay tick
    /// until `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn_worker(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            log::info!(
                "Fusion worker started (tick every {} ms)",
                self.config.tick_interval_ms
            );

            loop {
                tokio::select! {
                    _ = self.dirty.notified() => {
                        self.recompute_at(Utc::now());
                    }
                    _ = ticker.tick() => {
                        self.tick_at(Utc::now());
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            log::info!("Fusion worker stopped");
        })
    }

    /// Latest computed state. Never triggers a recompute.
    pub fn current_status(&self) -> ServiceStatus {
        self.current_status_at(Utc::now())
    }

    pub fn current_status_at(&self, now: DateTime<Utc>) -> ServiceStatus {
        let ttl = self.config.fusion.stale_ttl();
        let sessions: Vec<SessionStatus> = {
            let store = self.store.lock();
            store
                .sessions()
                .into_iter()
                .map(|session| {
                    let is_active = store.is_active(&session.user_id, now, ttl);
                    SessionStatus { session, is_active }
                })
                .collect()
        };
        let current = self.current.read().clone();
        let prompts = current
            .prompt
            .weighted_prompts(&self.config.synthesis.baseline.prompt);

        ServiceStatus {
            active_user_count: current.fused.user_count,
            fused: current.fused,
            prompt: current.prompt,
            prompts,
            sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FusionError;
    use crate::prompt::SessionPhase;
    use chrono::{Duration, TimeZone};
    use tokio::sync::mpsc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn service() -> (FusionService, mpsc::Receiver<PromptState>) {
        let (handle, rx) = PublishHandle::channel(64);
        (FusionService::new(EngineConfig::default(), handle), rx)
    }

    #[test]
    fn test_unknown_emotion_is_rejected_before_mutation() {
        let (svc, mut rx) = service();
        let before = svc.current_status_at(t0());

        let err = svc.submit_emotion("alice", "Ecstatic", 0.9, t0()).unwrap_err();
        assert!(matches!(err, FusionError::UnknownEmotion(ref l) if l == "Ecstatic"));

        assert!(!svc.recompute_at(t0()));
        let after = svc.current_status_at(t0());
        assert_eq!(after.prompt, before.prompt);
        assert_eq!(after.active_user_count, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_intensity_is_rejected() {
        let (svc, _rx) = service();
        let err = svc.submit_emotion("alice", "Happy", 1.5, t0()).unwrap_err();
        assert!(matches!(err, FusionError::InvalidIntensity(_)));
        assert!(svc.store.lock().is_empty());
    }

    #[test]
    fn test_submission_publishes_first_version() {
        let (svc, mut rx) = service();
        let emotion = svc
            .submit_emotion("alice", "Happy (开心)", 0.9, t0())
            .unwrap();
        assert_eq!(emotion, Emotion::Happy);

        assert!(svc.recompute_at(t0()));
        let published = rx.try_recv().unwrap();
        assert_eq!(published.version, 1);
        assert_eq!(published.directive.emotion, Emotion::Happy);

        let status = svc.current_status_at(t0());
        assert_eq!(status.active_user_count, 1);
        assert_eq!(status.prompt, published);
        assert_eq!(status.prompts[0].text, "quiet dreamcore");
    }

    #[test]
    fn test_leaving_drains_toward_baseline() {
        let (svc, _rx) = service();
        svc.submit_emotion("alice", "Angry", 1.0, t0()).unwrap();
        for _ in 0..10 {
            svc.recompute_at(t0());
        }
        assert_eq!(svc.current_status_at(t0()).prompt.phase, SessionPhase::Active);

        assert!(svc.user_left("alice"));
        assert!(svc.recompute_at(t0()));
        let status = svc.current_status_at(t0());
        assert_eq!(status.prompt.phase, SessionPhase::Draining);
        assert!(status.fused.is_baseline());

        for _ in 0..30 {
            svc.recompute_at(t0());
        }
        assert_eq!(svc.current_status_at(t0()).prompt.phase, SessionPhase::Empty);
    }

    #[test]
    fn test_tick_evicts_stale_but_keeps_sessions() {
        let (svc, _rx) = service();
        svc.user_joined("alice", Some("ios".into()), t0());
        svc.submit_emotion("alice", "Sad", 0.7, t0()).unwrap();
        svc.recompute_at(t0());

        let status = svc.current_status_at(t0() + Duration::seconds(5));
        assert!(status.sessions[0].is_active);

        let later = t0() + Duration::seconds(31);
        svc.tick_at(later);
        let status = svc.current_status_at(later);
        assert!(svc.store.lock().is_empty());
        assert_eq!(status.active_user_count, 0);
        assert_eq!(status.sessions.len(), 1);
        assert_eq!(status.sessions[0].session.device_info.as_deref(), Some("ios"));
        assert!(!status.sessions[0].is_active);
    }

    #[test]
    fn test_future_timestamp_still_goes_stale() {
        let (svc, _rx) = service();
        let now = Utc::now();
        svc.submit_emotion("skewed", "Angry", 1.0, now + Duration::hours(1))
            .unwrap();
        let observed_at = svc.store.lock().get("skewed").unwrap().observed_at;
        assert!(observed_at <= Utc::now());

        let later = Utc::now() + Duration::seconds(31);
        svc.tick_at(later);
        let status = svc.current_status_at(later);
        assert_eq!(status.active_user_count, 0);
        assert_eq!(status.fused.engagement, 0.0);
        assert!(svc.store.lock().is_empty());
    }

    #[test]
    fn test_concurrent_recomputes_publish_consecutive_versions() {
        let (svc, mut rx) = service();
        let svc = Arc::new(svc);
        std::thread::scope(|scope| {
            for i in 0..8 {
                let svc = svc.clone();
                scope.spawn(move || {
                    let user = format!("user-{}", i);
                    let label = if i % 2 == 0 { "Excited" } else { "Depressed" };
                    svc.submit_emotion(&user, label, 0.9, t0()).unwrap();
                    svc.recompute_at(t0() + Duration::milliseconds(i));
                });
            }
        });

        let mut versions = Vec::new();
        while let Ok(state) = rx.try_recv() {
            versions.push(state.version);
        }
        assert!(!versions.is_empty());
        let expected: Vec<u64> = (1..=versions.len() as u64).collect();
        assert_eq!(versions, expected);
    }

    #[tokio::test]
    async fn test_worker_recomputes_on_signal_and_stops() {
        let (handle, mut rx) = PublishHandle::channel(16);
        let config = EngineConfig {
            tick_interval_ms: 50,
            ..EngineConfig::default()
        };
        let svc = Arc::new(FusionService::new(config, handle));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = svc.clone().spawn_worker(shutdown_rx);

        svc.submit_emotion("alice", "Excited", 1.0, Utc::now()).unwrap();
        let published = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.version, 1);
        assert_eq!(published.directive.emotion, Emotion::Excited);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(2), worker)
            .await
            .unwrap()
            .unwrap();
    }
}
