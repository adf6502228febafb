//! Fusion engine: many users' observations → one shared affect point.
//!
//! The pipeline, recomputed from scratch on every trigger:
//!
//! ```text
//! snapshot ─┬─ w_i = intensity_i × recency(age_i)        (0 past the TTL)
//!           ├─ blend = Σ (w_i / Σw) · affect_i            (normalized mix)
//!           ├─ engagement = Σ w_i² / Σ w_i                (how loud the crowd is)
//!           └─ aggregate = baseline + axis ⊙ engagement ⊙ (blend − baseline)
//! ```
//!
//! Normalization makes the mix independent of head count; engagement lets
//! the aggregate relax toward the baseline as observations age. Both are in
//! range by construction, and the result is clamped anyway to absorb
//! floating-point overshoot.

pub mod decay;
pub mod method;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{AffectPoint, Emotion};
use crate::config::FusionConfig;
use crate::store::UserObservation;

pub use decay::RecencyDecay;
pub use method::FusionMethod;

/// One user's share of the fused state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub user_id: String,
    pub emotion: Emotion,
    pub intensity: f64,
    /// Normalized weight; all contributions of a state sum to at most 1.
    pub weight: f64,
}

/// The shared emotional state derived from every present user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedState {
    /// Point handed to the synthesizer.
    pub aggregate: AffectPoint,
    /// Weight-normalized mean of the contributing points.
    pub blend: AffectPoint,
    /// Weight-averaged effective weight in `[0, 1]`.
    pub engagement: f64,
    /// Strongest contributions, descending by weight.
    pub contributing: Vec<Contribution>,
    /// Users carrying non-zero weight (may exceed `contributing.len()`).
    pub user_count: usize,
    pub method: FusionMethod,
    /// Emotion named by the fusion method; `None` leaves the choice to the
    /// synthesizer's nearest-style match.
    pub primary: Option<Emotion>,
    pub secondary: Option<Emotion>,
    pub computed_at: DateTime<Utc>,
}

impl FusedState {
    /// The state reported when nobody contributes.
    pub fn baseline(point: AffectPoint, computed_at: DateTime<Utc>) -> Self {
        Self {
            aggregate: point,
            blend: point,
            engagement: 0.0,
            contributing: Vec::new(),
            user_count: 0,
            method: FusionMethod::default(),
            primary: None,
            secondary: None,
            computed_at,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.user_count == 0
    }

    /// Distinct contributing emotions, each with its strongest intensity,
    /// in first-seen (descending weight) order.
    pub fn emotion_peaks(&self) -> Vec<(Emotion, f64)> {
        let mut peaks: Vec<(Emotion, f64)> = Vec::new();
        for c in &self.contributing {
            match peaks.iter_mut().find(|(e, _)| *e == c.emotion) {
                Some((_, peak)) => *peak = peak.max(c.intensity),
                None => peaks.push((c.emotion, c.intensity)),
            }
        }
        peaks
    }
}

/// Computes [`FusedState`]s from store snapshots.
#[derive(Debug, Clone)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Raw (un-normalized) weight of one observation at `now`.
    pub fn user_weight(&self, observation: &UserObservation, now: DateTime<Utc>) -> f64 {
        let age = observation.age(now);
        if age > self.config.stale_ttl() {
            return 0.0;
        }
        observation.intensity * self.config.decay.factor(age)
    }

    /// Fuse a snapshot into a single state.
    pub fn fuse(&self, snapshot: &[UserObservation], now: DateTime<Utc>) -> FusedState {
        let baseline = self.config.baseline;
        let resting = || FusedState {
            method: self.config.method,
            ..FusedState::baseline(baseline, now)
        };
        if snapshot.is_empty() {
            return resting();
        }

        let weighted: Vec<(&UserObservation, f64)> = snapshot
            .iter()
            .map(|o| (o, self.user_weight(o, now)))
            .filter(|(_, w)| *w > 0.0)
            .collect();

        let total: f64 = weighted.iter().map(|(_, w)| w).sum();
        if !(total.is_finite() && total > 0.0) {
            return resting();
        }

        let mut blend = AffectPoint {
            valence: 0.0,
            arousal: 0.0,
            dominance: 0.0,
        };
        let mut squared = 0.0;
        for (observation, w) in &weighted {
            let share = w / total;
            let point = observation.emotion.affect();
            blend.valence += share * point.valence;
            blend.arousal += share * point.arousal;
            blend.dominance += share * point.dominance;
            squared += w * w;
        }
        let blend = blend.clamped();
        let picks = self.config.method.pick(&weighted);
        let engagement = (squared / total * picks.damping).clamp(0.0, 1.0);

        let axis = &self.config.axis_weights;
        let aggregate = AffectPoint {
            valence: baseline.valence
                + axis.valence * engagement * (blend.valence - baseline.valence),
            arousal: baseline.arousal
                + axis.arousal * engagement * (blend.arousal - baseline.arousal),
            dominance: baseline.dominance
                + axis.dominance * engagement * (blend.dominance - baseline.dominance),
        }
        .clamped();

        let mut contributing: Vec<Contribution> = weighted
            .iter()
            .map(|(o, w)| Contribution {
                user_id: o.user_id.clone(),
                emotion: o.emotion,
                intensity: o.intensity,
                weight: w / total,
            })
            .collect();
        contributing.sort_by(|a, b| {
            b.weight
                .total_cmp(&a.weight)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        contributing.truncate(self.config.top_n);

        log::debug!(
            "Fused {} users: v={:.3} a={:.3} d={:.3} engagement={:.3}",
            weighted.len(),
            aggregate.valence,
            aggregate.arousal,
            aggregate.dominance,
            engagement
        );

        FusedState {
            aggregate,
            blend,
            engagement,
            contributing,
            user_count: weighted.len(),
            method: self.config.method,
            primary: picks.primary,
            secondary: picks.secondary,
            computed_at: now,
        }
    }
}
