//! User affect store: the latest emotion observation per user.
//!
//! Each user holds at most one live [`UserObservation`]; a new event replaces
//! the previous one wholesale. The store also keeps the session roster
//! (who joined, from which device) so diagnostics can report every connected
//! user, including those whose observation has gone stale.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Emotion;
use crate::error::{FusionError, Result};

/// The latest emotion reported by one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserObservation {
    pub user_id: String,
    pub emotion: Emotion,
    /// Intensity in `[0, 1]`.
    pub intensity: f64,
    pub observed_at: DateTime<Utc>,
}

impl UserObservation {
    /// Age of the observation relative to `now` (never negative).
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let age = now - self.observed_at;
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }
}

/// A connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub device_info: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_emotion: Option<Emotion>,
    pub last_intensity: Option<f64>,
    pub last_update: Option<DateTime<Utc>>,
}

/// Check an intensity value without touching any state.
pub fn validate_intensity(intensity: f64) -> Result<f64> {
    if intensity.is_finite() && (0.0..=1.0).contains(&intensity) {
        Ok(intensity)
    } else {
        Err(FusionError::InvalidIntensity(intensity))
    }
}

/// Per-user observations plus the session roster.
#[derive(Debug, Default)]
pub struct UserAffectStore {
    observations: HashMap<String, UserObservation>,
    sessions: HashMap<String, UserSession>,
}

impl UserAffectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `user_id`'s latest emotion, replacing any prior observation.
    ///
    /// Returns the replaced observation, if any. Nothing is mutated when the
    /// intensity is rejected.
    pub fn upsert(
        &mut self,
        user_id: &str,
        emotion: Emotion,
        intensity: f64,
        observed_at: DateTime<Utc>,
    ) -> Result<Option<UserObservation>> {
        let intensity = validate_intensity(intensity)?;

        if let Some(session) = self.sessions.get_mut(user_id) {
            session.last_emotion = Some(emotion);
            session.last_intensity = Some(intensity);
            session.last_update = Some(observed_at);
        }

        let observation = UserObservation {
            user_id: user_id.to_string(),
            emotion,
            intensity,
            observed_at,
        };
        Ok(self.observations.insert(user_id.to_string(), observation))
    }

    /// Drop a user's observation and session. No-op for unknown users.
    pub fn remove(&mut self, user_id: &str) -> Option<UserObservation> {
        self.sessions.remove(user_id);
        self.observations.remove(user_id)
    }

    /// Drop every observation older than `ttl`. Sessions are kept.
    ///
    /// Returns the evicted user ids, sorted.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<String> {
        let mut evicted: Vec<String> = self
            .observations
            .values()
            .filter(|o| o.age(now) > ttl)
            .map(|o| o.user_id.clone())
            .collect();
        evicted.sort();

        for user_id in &evicted {
            self.observations.remove(user_id);
        }
        evicted
    }

    /// Point-in-time copy of every observation, sorted by user id.
    pub fn snapshot(&self) -> Vec<UserObservation> {
        let mut snapshot: Vec<UserObservation> = self.observations.values().cloned().collect();
        snapshot.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        snapshot
    }

    pub fn get(&self, user_id: &str) -> Option<&UserObservation> {
        self.observations.get(user_id)
    }

    /// Register (or refresh) a session.
    pub fn join(
        &mut self,
        user_id: &str,
        device_info: Option<String>,
        connected_at: DateTime<Utc>,
    ) -> &UserSession {
        let previous = self.observations.get(user_id);
        let session = UserSession {
            user_id: user_id.to_string(),
            device_info,
            connected_at,
            last_emotion: previous.map(|o| o.emotion),
            last_intensity: previous.map(|o| o.intensity),
            last_update: previous.map(|o| o.observed_at),
        };
        self.sessions.insert(user_id.to_string(), session);
        &self.sessions[user_id]
    }

    pub fn session(&self, user_id: &str) -> Option<&UserSession> {
        self.sessions.get(user_id)
    }

    /// Sessions sorted by user id.
    pub fn sessions(&self) -> Vec<UserSession> {
        let mut sessions: Vec<UserSession> = self.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        sessions
    }

    /// Whether the user has an observation no older than `ttl`.
    pub fn is_active(&self, user_id: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.observations
            .get(user_id)
            .map(|o| o.age(now) <= ttl)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
