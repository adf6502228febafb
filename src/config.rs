//! Engine configuration.
//!
//! Loaded once at startup (YAML file or defaults), validated, then frozen.
//! Nothing re-validates configuration per request, so every invariant the
//! fusion and synthesis steps rely on is checked here.
//!
//! # Example
//!
//! ```yaml
//! tick_interval_ms: 1000
//! fusion:
//!   method: weighted_average   # or dominant_emotion, harmonic_blend
//!   axis_weights: { valence: 1.0, arousal: 1.0, dominance: 1.0 }
//!   decay: { kind: exponential, half_life_secs: 10.0 }
//!   stale_ttl_secs: 30.0
//! synthesis:
//!   smoothing: 0.5
//!   publish_threshold: 0.05
//!   baseline: { prompt: "quiet dreamcore", weight: 0.8, floor: 0.2 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::catalog::{AffectPoint, AxisWeights, Emotion};
use crate::error::{FusionError, Result};
use crate::fusion::{FusionMethod, RecencyDecay};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "EMOTION_FUSION_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionConfig,
    pub synthesis: SynthesisConfig,
    pub publisher: PublisherConfig,
    /// Decay tick period.
    pub tick_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            synthesis: SynthesisConfig::default(),
            publisher: PublisherConfig::default(),
            tick_interval_ms: 1000,
        }
    }
}

/// Fusion engine knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub method: FusionMethod,
    /// How strongly each axis of individual affect carries into the
    /// aggregate. Independent knobs in `[0, 1]`.
    pub axis_weights: AxisWeights,
    pub decay: RecencyDecay,
    /// Observations older than this carry no weight and are evicted on tick.
    pub stale_ttl_secs: f64,
    /// Number of contributions kept on the fused state.
    pub top_n: usize,
    /// Aggregate reported when nobody contributes.
    pub baseline: AffectPoint,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::WeightedAverage,
            axis_weights: AxisWeights::UNIFORM,
            decay: RecencyDecay::default(),
            stale_ttl_secs: 30.0,
            top_n: 5,
            baseline: AffectPoint::NEUTRAL,
        }
    }
}

impl FusionConfig {
    pub fn stale_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds((self.stale_ttl_secs * 1000.0) as i64)
    }
}

/// Prompt synthesizer knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// EMA factor on continuous fields; `1.0` disables smoothing.
    pub smoothing: f64,
    /// Minimum continuous-field change that warrants a publish.
    pub publish_threshold: f64,
    /// Consecutive wins a new style needs before it replaces the current one.
    pub switch_after: u32,
    /// Per-axis weights of the style-matching distance.
    pub distance_weights: AxisWeights,
    pub baseline: BaselineStyle,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.5,
            publish_threshold: 0.05,
            switch_after: 2,
            distance_weights: AxisWeights::new(0.4, 0.4, 0.2),
            baseline: BaselineStyle::default(),
        }
    }
}

/// The resting style the directive is always blended against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineStyle {
    /// Base prompt always sent alongside the emotion prompt.
    pub prompt: String,
    /// Style voiced while nobody contributes.
    pub emotion: Emotion,
    /// Base prompt weight with no engagement.
    pub weight: f64,
    /// Base prompt weight at full engagement.
    pub floor: f64,
}

impl Default for BaselineStyle {
    fn default() -> Self {
        Self {
            prompt: "quiet dreamcore".to_string(),
            emotion: Emotion::Neutral,
            weight: 0.8,
            floor: 0.2,
        }
    }
}

/// Directive publication knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Bounded handoff queue between the engine and publishers.
    pub queue_capacity: usize,
    /// Buffer of the live status broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            broadcast_capacity: 64,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Load the file named by [`CONFIG_ENV_VAR`], or validated defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                log::info!("Loading configuration from {}", path);
                Self::from_file(path.trim())
            }
            _ => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms)
    }

    /// Check every invariant. Any failure is fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let fusion = &self.fusion;
        for (axis, w) in axis_entries(&fusion.axis_weights) {
            if !w.is_finite() || !(0.0..=1.0).contains(&w) {
                return Err(invalid(format!(
                    "fusion.axis_weights.{} must be within [0, 1], got {}",
                    axis, w
                )));
            }
        }
        if !(fusion.decay.scale_secs().is_finite() && fusion.decay.scale_secs() > 0.0) {
            return Err(invalid("fusion.decay time constant must be positive"));
        }
        if !(fusion.stale_ttl_secs.is_finite() && fusion.stale_ttl_secs > 0.0) {
            return Err(invalid("fusion.stale_ttl_secs must be positive"));
        }
        if fusion.top_n == 0 {
            return Err(invalid("fusion.top_n must be at least 1"));
        }
        if !fusion.baseline.in_range() {
            return Err(invalid("fusion.baseline lies outside affect space"));
        }

        let synthesis = &self.synthesis;
        if !(synthesis.smoothing > 0.0 && synthesis.smoothing <= 1.0) {
            return Err(invalid(format!(
                "synthesis.smoothing must be within (0, 1], got {}",
                synthesis.smoothing
            )));
        }
        if !(synthesis.publish_threshold.is_finite() && synthesis.publish_threshold >= 0.0) {
            return Err(invalid("synthesis.publish_threshold must be non-negative"));
        }
        if synthesis.switch_after == 0 {
            return Err(invalid("synthesis.switch_after must be at least 1"));
        }
        let distance = &synthesis.distance_weights;
        if axis_entries(distance)
            .iter()
            .any(|(_, w)| !w.is_finite() || *w < 0.0)
            || distance.sum() <= 0.0
        {
            return Err(invalid(
                "synthesis.distance_weights must be non-negative with a positive sum",
            ));
        }
        let baseline = &synthesis.baseline;
        if !(0.0 <= baseline.floor && baseline.floor <= baseline.weight && baseline.weight <= 1.0) {
            return Err(invalid(format!(
                "synthesis.baseline requires 0 <= floor <= weight <= 1, got floor={} weight={}",
                baseline.floor, baseline.weight
            )));
        }

        if self.publisher.queue_capacity == 0 || self.publisher.broadcast_capacity == 0 {
            return Err(invalid("publisher capacities must be at least 1"));
        }
        if self.tick_interval_ms == 0 {
            return Err(invalid("tick_interval_ms must be at least 1"));
        }
        Ok(())
    }
}

fn axis_entries(weights: &AxisWeights) -> [(&'static str, f64); 3] {
    [
        ("valence", weights.valence),
        ("arousal", weights.arousal),
        ("dominance", weights.dominance),
    ]
}

fn invalid(message: impl Into<String>) -> FusionError {
    FusionError::Configuration(message.into())
}
