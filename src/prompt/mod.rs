//! Prompt synthesizer: fused affect → versioned music directive.
//!
//! [`synthesize`] is a pure function of `(FusedState, previous PromptState,
//! config)`. It never reads clocks or globals, so smoothing and hysteresis
//! can be exercised step by step.
//!
//! ```text
//! aggregate ── nearest catalog style (or the fusion method's primary pick)
//!          ├── sticky switch of style and secondary: a candidate must win
//!          │   `switch_after` times in a row
//!          ├── targets: texture, intensity, base weight
//!          ├── EMA toward targets (`smoothing`)
//!          └── publish iff discrete change or Δ > `publish_threshold`
//! ```
//!
//! Session phases: `Empty → Warming → Active → Draining → Empty`, driven
//! only by whether anyone contributes and by how far the blend has settled.
//! An active session drops back to `Warming` once the base prompt outweighs
//! the emotion prompt by more than `publish_threshold`.

pub mod directive;

use serde::{Deserialize, Serialize};

use crate::catalog::{AffectPoint, AxisWeights, Emotion};
use crate::config::SynthesisConfig;
use crate::fusion::FusedState;

pub use directive::{Directive, WeightedPrompt};

/// Lifecycle of the shared session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nobody contributes; the directive rests on the baseline.
    Empty,
    /// Contributors present but the baseline prompt still dominates.
    Warming,
    /// The crowd's style dominates.
    Active,
    /// Everyone left or went silent; relaxing back to the baseline.
    Draining,
}

/// A style switch waiting to clear hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingSwitch {
    pub emotion: Emotion,
    pub streak: u32,
}

/// A change of the blended-in secondary emotion waiting to clear hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingSecondary {
    pub secondary: Option<Emotion>,
    pub streak: u32,
}

/// The current directive, versioned for subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptState {
    pub directive: Directive,
    /// Weight of the configured base prompt.
    pub base_weight: f64,
    /// Bumped by exactly one on every publish.
    pub version: u64,
    pub phase: SessionPhase,
    pub pending: Option<PendingSwitch>,
    #[serde(default)]
    pub pending_secondary: Option<PendingSecondary>,
}

impl PromptState {
    /// Resting state for an idle session (version 0).
    pub fn resting(fused: &FusedState, config: &SynthesisConfig) -> Self {
        let emotion = config.baseline.emotion;
        let targets = Targets::compute(emotion, fused, config);
        Self {
            directive: Directive::voicing(emotion, None, targets.texture, targets.intensity),
            base_weight: targets.base_weight,
            version: 0,
            phase: SessionPhase::Empty,
            pending: None,
            pending_secondary: None,
        }
    }

    /// Prompts for a weighted-prompt generator.
    pub fn weighted_prompts(&self, base_prompt: &str) -> Vec<WeightedPrompt> {
        self.directive.weighted_prompts(base_prompt, self.base_weight)
    }
}

/// Result of one synthesis step.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub state: PromptState,
    /// Whether `state` is a new version that should be published.
    pub published: bool,
}

/// Catalog emotion nearest to `point`. Equal distances resolve to the
/// emotion declared first in [`Emotion::ALL`].
pub fn nearest_emotion(point: &AffectPoint, weights: &AxisWeights) -> Emotion {
    let mut best = Emotion::ALL[0];
    let mut best_distance = f64::INFINITY;
    for emotion in Emotion::ALL {
        let distance = point.weighted_distance(&emotion.affect(), weights);
        if distance < best_distance {
            best = emotion;
            best_distance = distance;
        }
    }
    best
}

/// Continuous targets the directive is smoothed toward.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Targets {
    texture: f64,
    intensity: f64,
    base_weight: f64,
}

impl Targets {
    fn compute(emotion: Emotion, fused: &FusedState, config: &SynthesisConfig) -> Self {
        let style = emotion.style();
        let texture = (0.5 * style.texture_complexity
            + 0.3 * fused.aggregate.arousal
            + 0.2 * crowd_diversity(fused))
        .clamp(0.0, 1.0);
        let intensity = (style.weight * fused.engagement).clamp(0.0, 1.0);
        let baseline = &config.baseline;
        let base_weight =
            baseline.weight - (baseline.weight - baseline.floor) * fused.engagement;
        Self {
            texture,
            intensity,
            base_weight: base_weight.clamp(0.0, 1.0),
        }
    }
}

/// `0` for a single voice, rising toward `1` as more distinct strong
/// emotions sound at once.
fn crowd_diversity(fused: &FusedState) -> f64 {
    let peaks = fused.emotion_peaks();
    let strongest = peaks.iter().map(|(_, p)| *p).fold(0.0, f64::max);
    let crowd: f64 = peaks.iter().map(|(_, p)| p).sum();
    1.0 - (-(crowd - strongest).max(0.0)).exp()
}

/// Advance the directive by one step.
pub fn synthesize(
    fused: &FusedState,
    previous: &PromptState,
    config: &SynthesisConfig,
) -> Synthesis {
    let present = !fused.is_baseline();
    let candidate = if present {
        fused
            .primary
            .unwrap_or_else(|| nearest_emotion(&fused.aggregate, &config.distance_weights))
    } else {
        config.baseline.emotion
    };
    let (emotion, pending) = choose_style(candidate, previous, config.switch_after);

    let secondary_candidate = if fused.user_count >= 2 {
        fused.secondary.filter(|s| *s != emotion).or_else(|| {
            fused
                .contributing
                .iter()
                .map(|c| c.emotion)
                .find(|e| *e != emotion)
        })
    } else {
        None
    };
    let (secondary, pending_secondary) =
        choose_secondary(secondary_candidate, emotion, previous, config.switch_after);

    let targets = Targets::compute(emotion, fused, config);
    let alpha = config.smoothing;
    let ema = |from: f64, to: f64| from + alpha * (to - from);
    let prev = &previous.directive;

    let mut texture = ema(prev.texture_complexity, targets.texture);
    let mut intensity = ema(prev.intensity, targets.intensity);
    let mut base_weight = ema(previous.base_weight, targets.base_weight);
    let delta = (texture - prev.texture_complexity)
        .abs()
        .max((intensity - prev.intensity).abs())
        .max((base_weight - previous.base_weight).abs());

    let mut phase = next_phase(
        previous.phase,
        present,
        intensity,
        base_weight,
        config.publish_threshold,
    );
    if phase == SessionPhase::Draining
        && emotion == config.baseline.emotion
        && delta <= config.publish_threshold
    {
        texture = targets.texture;
        intensity = targets.intensity;
        base_weight = targets.base_weight;
        phase = SessionPhase::Empty;
    }

    let discrete_changed =
        emotion != prev.emotion || secondary != prev.secondary || phase != previous.phase;
    if !discrete_changed && delta <= config.publish_threshold {
        let mut state = previous.clone();
        state.pending = pending;
        state.pending_secondary = pending_secondary;
        return Synthesis {
            state,
            published: false,
        };
    }

    let state = PromptState {
        directive: Directive::voicing(emotion, secondary, texture, intensity),
        base_weight,
        version: previous.version + 1,
        phase,
        pending,
        pending_secondary,
    };
    log::debug!(
        "Directive v{} ({:?}): {} @ {:.2}, base {:.2}",
        state.version,
        state.phase,
        state.directive.emotion,
        state.directive.intensity,
        state.base_weight
    );
    Synthesis {
        state,
        published: true,
    }
}

/// Sticky discrete choice: a new candidate must win `switch_after` steps in
/// a row. Returns the value to voice and the candidate still pending.
fn sticky<T: Copy + PartialEq>(
    candidate: T,
    current: T,
    pending: Option<(T, u32)>,
    adopt_now: bool,
    switch_after: u32,
) -> (T, Option<(T, u32)>) {
    if candidate == current {
        return (current, None);
    }
    if adopt_now {
        return (candidate, None);
    }
    let streak = match pending {
        Some((p, streak)) if p == candidate => streak + 1,
        _ => 1,
    };
    if streak >= switch_after {
        (candidate, None)
    } else {
        (current, Some((candidate, streak)))
    }
}

/// Leaving `Empty` adopts the candidate at once.
fn choose_style(
    candidate: Emotion,
    previous: &PromptState,
    switch_after: u32,
) -> (Emotion, Option<PendingSwitch>) {
    let (emotion, pending) = sticky(
        candidate,
        previous.directive.emotion,
        previous.pending.map(|p| (p.emotion, p.streak)),
        previous.phase == SessionPhase::Empty,
        switch_after,
    );
    (
        emotion,
        pending.map(|(emotion, streak)| PendingSwitch { emotion, streak }),
    )
}

/// A new primary style re-voices the directive anyway, so its secondary
/// is adopted along with it.
fn choose_secondary(
    candidate: Option<Emotion>,
    emotion: Emotion,
    previous: &PromptState,
    switch_after: u32,
) -> (Option<Emotion>, Option<PendingSecondary>) {
    let adopt_now =
        previous.phase == SessionPhase::Empty || emotion != previous.directive.emotion;
    let (secondary, pending) = sticky(
        candidate,
        previous.directive.secondary,
        previous.pending_secondary.map(|p| (p.secondary, p.streak)),
        adopt_now,
        switch_after,
    );
    (
        secondary,
        pending.map(|(secondary, streak)| PendingSecondary { secondary, streak }),
    )
}

/// `band` keeps an active session from dropping back to `Warming` until
/// the base prompt clearly dominates again.
fn next_phase(
    previous: SessionPhase,
    present: bool,
    intensity: f64,
    base_weight: f64,
    band: f64,
) -> SessionPhase {
    match (present, previous) {
        (true, SessionPhase::Active) if base_weight > intensity + band => SessionPhase::Warming,
        (true, SessionPhase::Active) => SessionPhase::Active,
        (true, _) if base_weight >= intensity => SessionPhase::Warming,
        (true, _) => SessionPhase::Active,
        (false, SessionPhase::Empty) => SessionPhase::Empty,
        (false, _) => SessionPhase::Draining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FusionConfig;
    use crate::fusion::{Contribution, FusionEngine, FusionMethod};
    use crate::store::UserObservation;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn fuse(users: &[(&str, Emotion, f64)]) -> FusedState {
        let snapshot: Vec<UserObservation> = users
            .iter()
            .map(|(u, e, i)| UserObservation {
                user_id: u.to_string(),
                emotion: *e,
                intensity: *i,
                observed_at: t(0),
            })
            .collect();
        FusionEngine::new(FusionConfig::default()).fuse(&snapshot, t(0))
    }

    fn fuse_with(method: FusionMethod, users: &[(&str, Emotion, f64)]) -> FusedState {
        let snapshot: Vec<UserObservation> = users
            .iter()
            .map(|(u, e, i)| UserObservation {
                user_id: u.to_string(),
                emotion: *e,
                intensity: *i,
                observed_at: t(0),
            })
            .collect();
        let config = FusionConfig {
            method,
            ..FusionConfig::default()
        };
        FusionEngine::new(config).fuse(&snapshot, t(0))
    }

    /// A Happy crowd with two minor voices of the given weights.
    fn happy_with_minor_voices(sad: f64, fear: f64) -> FusedState {
        let voice = |user: &str, emotion, intensity, weight| Contribution {
            user_id: user.to_string(),
            emotion,
            intensity,
            weight,
        };
        let mut contributing = vec![
            voice("a", Emotion::Happy, 0.9, 0.5),
            voice("b", Emotion::Sad, 0.6, sad),
            voice("c", Emotion::Fear, 0.6, fear),
        ];
        contributing.sort_by(|x, y| y.weight.total_cmp(&x.weight));
        FusedState {
            aggregate: Emotion::Happy.affect(),
            blend: Emotion::Happy.affect(),
            engagement: 0.8,
            contributing,
            user_count: 3,
            method: FusionMethod::WeightedAverage,
            primary: None,
            secondary: None,
            computed_at: t(0),
        }
    }

    fn empty() -> FusedState {
        FusedState::baseline(AffectPoint::NEUTRAL, t(0))
    }

    fn resting(config: &SynthesisConfig) -> PromptState {
        PromptState::resting(&empty(), config)
    }

    /// Run synthesis until nothing new is published.
    fn settle(fused: &FusedState, mut state: PromptState, config: &SynthesisConfig) -> PromptState {
        for _ in 0..100 {
            let step = synthesize(fused, &state, config);
            if !step.published
                && step.state.pending.is_none()
                && step.state.pending_secondary.is_none()
            {
                return step.state;
            }
            state = step.state;
        }
        panic!("directive never settled");
    }

    #[test]
    fn test_nearest_emotion_exact_points() {
        let weights = AxisWeights::new(0.4, 0.4, 0.2);
        for emotion in Emotion::ALL {
            assert_eq!(nearest_emotion(&emotion.affect(), &weights), emotion);
        }
    }

    #[test]
    fn test_nearest_emotion_ties_follow_declaration_order() {
        // Relaxed and Disgust share dominance 0.65; with a dominance-only
        // metric they are equidistant from any point on that plane.
        let dominance_only = AxisWeights::new(0.0, 0.0, 1.0);
        let point = AffectPoint::new(0.0, 0.5, 0.65);
        assert_eq!(nearest_emotion(&point, &dominance_only), Emotion::Relaxed);

        // Happy and Contempt share dominance 0.8.
        let point = AffectPoint::new(-0.5, 0.4, 0.8);
        assert_eq!(nearest_emotion(&point, &dominance_only), Emotion::Happy);
    }

    #[test]
    fn test_empty_session_is_stable() {
        let config = SynthesisConfig::default();
        let state = resting(&config);
        let step = synthesize(&empty(), &state, &config);
        assert!(!step.published);
        assert_eq!(step.state, state);
        assert_eq!(step.state.version, 0);
        assert_eq!(step.state.phase, SessionPhase::Empty);
        assert_eq!(step.state.base_weight, 0.8);
        assert_eq!(step.state.directive.intensity, 0.0);
    }

    #[test]
    fn test_first_observation_adopts_style_and_warms() {
        let config = SynthesisConfig::default();
        let fused = fuse(&[("a", Emotion::Happy, 0.9)]);
        let step = synthesize(&fused, &resting(&config), &config);

        assert!(step.published);
        assert_eq!(step.state.version, 1);
        assert_eq!(step.state.directive.emotion, Emotion::Happy);
        assert_eq!(step.state.phase, SessionPhase::Warming);
        assert!(step.state.directive.intensity > 0.0);
        assert!(step.state.base_weight < 0.8);
    }

    #[test]
    fn test_warming_becomes_active_as_blend_converges() {
        let config = SynthesisConfig::default();
        let fused = fuse(&[("a", Emotion::Excited, 1.0)]);
        let settled = settle(&fused, resting(&config), &config);
        assert_eq!(settled.phase, SessionPhase::Active);
        assert!(settled.directive.intensity > settled.base_weight);
    }

    #[test]
    fn test_version_bumps_by_one_and_holds_for_near_duplicates() {
        let config = SynthesisConfig::default();
        let mut state = resting(&config);
        let fused = fuse(&[("a", Emotion::Happy, 0.8)]);

        let mut versions = Vec::new();
        for _ in 0..20 {
            let step = synthesize(&fused, &state, &config);
            if step.published {
                assert_eq!(step.state.version, state.version + 1);
                versions.push(step.state.version);
            } else {
                assert_eq!(step.state.version, state.version);
            }
            state = step.state;
        }
        assert!(!versions.is_empty());
        let converged = state.version;

        for intensity in [0.79, 0.8, 0.805, 0.8, 0.795] {
            let nearly = fuse(&[("a", Emotion::Happy, intensity)]);
            let step = synthesize(&nearly, &state, &config);
            assert!(!step.published, "published at intensity {}", intensity);
            state = step.state;
        }
        assert_eq!(state.version, converged);
    }

    #[test]
    fn test_style_switch_is_sticky() {
        let config = SynthesisConfig::default();
        let happy = settle(&fuse(&[("a", Emotion::Happy, 1.0)]), resting(&config), &config);
        assert_eq!(happy.directive.emotion, Emotion::Happy);

        let angry = fuse(&[("a", Emotion::Angry, 1.0)]);
        let first = synthesize(&angry, &happy, &config);
        assert_eq!(first.state.directive.emotion, Emotion::Happy);
        assert_eq!(
            first.state.pending,
            Some(PendingSwitch {
                emotion: Emotion::Angry,
                streak: 1
            })
        );

        // A single flap back resets the streak.
        let back = synthesize(&fuse(&[("a", Emotion::Happy, 1.0)]), &first.state, &config);
        assert_eq!(back.state.pending, None);

        let first = synthesize(&angry, &back.state, &config);
        let second = synthesize(&angry, &first.state, &config);
        assert!(second.published);
        assert_eq!(second.state.directive.emotion, Emotion::Angry);
        assert_eq!(second.state.pending, None);
    }

    #[test]
    fn test_alternating_minor_voices_do_not_republish() {
        let config = SynthesisConfig::default();
        let sad_leads = happy_with_minor_voices(0.251, 0.249);
        let fear_leads = happy_with_minor_voices(0.249, 0.251);

        let settled = settle(&sad_leads, resting(&config), &config);
        assert_eq!(settled.directive.emotion, Emotion::Happy);
        assert_eq!(settled.directive.secondary, Some(Emotion::Sad));

        let mut state = settled.clone();
        for i in 0..10 {
            let fused = if i % 2 == 0 { &fear_leads } else { &sad_leads };
            let step = synthesize(fused, &state, &config);
            assert!(!step.published, "republished on step {}", i);
            state = step.state;
            assert_eq!(state.directive.secondary, Some(Emotion::Sad));
            assert_eq!(state.directive.tempo_class, settled.directive.tempo_class);
            assert_eq!(state.directive.dynamics, settled.directive.dynamics);
            assert_eq!(state.directive.harmony, settled.directive.harmony);
        }
        assert_eq!(state.version, settled.version);

        // A lasting change still comes through after the streak.
        let first = synthesize(&fear_leads, &state, &config);
        assert!(!first.published);
        assert_eq!(
            first.state.pending_secondary,
            Some(PendingSecondary {
                secondary: Some(Emotion::Fear),
                streak: 1
            })
        );
        let second = synthesize(&fear_leads, &first.state, &config);
        assert!(second.published);
        assert_eq!(second.state.version, settled.version + 1);
        assert_eq!(second.state.directive.secondary, Some(Emotion::Fear));
        assert_eq!(second.state.pending_secondary, None);
    }

    #[test]
    fn test_dominant_method_overrides_nearest_style() {
        let config = SynthesisConfig::default();
        let fused = fuse_with(
            FusionMethod::DominantEmotion,
            &[("a", Emotion::Happy, 0.8), ("b", Emotion::Sad, 0.6)],
        );
        let step = synthesize(&fused, &resting(&config), &config);
        assert_eq!(step.state.directive.emotion, Emotion::Happy);
        assert_eq!(step.state.directive.secondary, Some(Emotion::Sad));
    }

    #[test]
    fn test_harmonic_method_names_both_emotions() {
        let config = SynthesisConfig::default();
        let fused = fuse_with(
            FusionMethod::HarmonicBlend,
            &[
                ("a", Emotion::Relaxed, 0.5),
                ("b", Emotion::Relaxed, 0.5),
                ("c", Emotion::Excited, 0.8),
            ],
        );
        let step = synthesize(&fused, &resting(&config), &config);
        assert_eq!(step.state.directive.emotion, Emotion::Relaxed);
        assert_eq!(step.state.directive.secondary, Some(Emotion::Excited));
    }

    #[test]
    fn test_active_session_falls_back_to_warming_when_baseline_dominates() {
        let config = SynthesisConfig::default();
        let strong = fuse_with(FusionMethod::DominantEmotion, &[("a", Emotion::Excited, 1.0)]);
        let active = settle(&strong, resting(&config), &config);
        assert_eq!(active.phase, SessionPhase::Active);

        // Near the crossing the band keeps the session active.
        let middling = fuse_with(FusionMethod::DominantEmotion, &[("a", Emotion::Excited, 0.5)]);
        let held = settle(&middling, active.clone(), &config);
        assert_eq!(held.phase, SessionPhase::Active);

        let faint = fuse_with(FusionMethod::DominantEmotion, &[("a", Emotion::Excited, 0.1)]);
        let warmed = settle(&faint, held, &config);
        assert_eq!(warmed.phase, SessionPhase::Warming);
        assert_eq!(warmed.directive.emotion, Emotion::Excited);
    }

    #[test]
    fn test_happy_and_sad_pick_nearest_style_with_secondary() {
        let config = SynthesisConfig::default();
        let fused = fuse(&[("a", Emotion::Happy, 0.8), ("b", Emotion::Sad, 0.8)]);
        assert!(fused.aggregate.valence.abs() < 1e-9);

        let expected = nearest_emotion(&fused.aggregate, &config.distance_weights);
        assert_eq!(expected, Emotion::Sleepy);

        let step = synthesize(&fused, &resting(&config), &config);
        assert_eq!(step.state.directive.emotion, Emotion::Sleepy);
        // Equal weights tie on user id: "a" (Happy) ranks first.
        assert_eq!(step.state.directive.secondary, Some(Emotion::Happy));
        assert!(step.state.directive.prompt.contains("blended with upbeat pop"));
    }

    #[test]
    fn test_diverse_crowd_raises_texture() {
        let config = SynthesisConfig {
            smoothing: 1.0,
            ..SynthesisConfig::default()
        };
        let uniform = fuse(&[("a", Emotion::Sad, 0.9), ("b", Emotion::Sad, 0.9)]);
        let mixed = fuse(&[
            ("a", Emotion::Sad, 0.9),
            ("b", Emotion::Depressed, 0.9),
        ]);
        assert_eq!(crowd_diversity(&uniform), 0.0);
        assert!(crowd_diversity(&mixed) > 0.5);

        let u = Targets::compute(Emotion::Sad, &uniform, &config);
        let m = Targets::compute(Emotion::Sad, &mixed, &config);
        assert!(m.texture > u.texture);
    }

    #[test]
    fn test_draining_relaxes_back_to_empty_without_overshoot() {
        let config = SynthesisConfig::default();
        let active = settle(&fuse(&[("a", Emotion::Angry, 1.0)]), resting(&config), &config);
        assert_eq!(active.phase, SessionPhase::Active);

        let mut state = active;
        let mut last_intensity = state.directive.intensity;
        let mut saw_draining = false;
        for _ in 0..50 {
            let step = synthesize(&empty(), &state, &config);
            state = step.state;
            let i = state.directive.intensity;
            assert!(i <= last_intensity + 1e-12);
            assert!(i >= 0.0);
            assert!(state.base_weight <= 0.8 + 1e-12);
            last_intensity = i;
            if state.phase == SessionPhase::Draining {
                saw_draining = true;
            }
            if state.phase == SessionPhase::Empty {
                break;
            }
        }
        assert!(saw_draining);
        assert_eq!(state.phase, SessionPhase::Empty);
        assert_eq!(state.directive.emotion, Emotion::Neutral);
        assert_eq!(state.directive.intensity, 0.0);
        assert_eq!(state.base_weight, 0.8);
    }

    #[test]
    fn test_prompt_state_json_round_trip() {
        let config = SynthesisConfig::default();
        let fused = fuse(&[("a", Emotion::Surprised, 0.7), ("b", Emotion::Fear, 0.4)]);
        let state = synthesize(&fused, &resting(&config), &config).state;

        let json = serde_json::to_string(&state).unwrap();
        let back: PromptState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        let json = serde_json::to_string(&fused).unwrap();
        let back: FusedState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fused);
    }
}
