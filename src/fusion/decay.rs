//! Recency decay: how quickly a silent user stops influencing the mix.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Monotonically non-increasing recency curve, `1.0` at age zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecencyDecay {
    /// Halves the weight every `half_life_secs`.
    Exponential { half_life_secs: f64 },
    /// Falls linearly to zero at `horizon_secs`.
    Linear { horizon_secs: f64 },
}

impl Default for RecencyDecay {
    fn default() -> Self {
        RecencyDecay::Exponential {
            half_life_secs: 10.0,
        }
    }
}

impl RecencyDecay {
    /// Recency factor in `[0, 1]` for an observation of the given age.
    pub fn factor(&self, age: Duration) -> f64 {
        let age_secs = (age.num_milliseconds().max(0) as f64) / 1000.0;
        match *self {
            RecencyDecay::Exponential { half_life_secs } => {
                0.5_f64.powf(age_secs / half_life_secs)
            }
            RecencyDecay::Linear { horizon_secs } => (1.0 - age_secs / horizon_secs).max(0.0),
        }
    }

    /// The time constant of the curve, in seconds.
    pub fn scale_secs(&self) -> f64 {
        match *self {
            RecencyDecay::Exponential { half_life_secs } => half_life_secs,
            RecencyDecay::Linear { horizon_secs } => horizon_secs,
        }
    }
}
