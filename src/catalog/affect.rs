//! Affect space: the (valence, arousal, dominance) coordinate system.

use serde::{Deserialize, Serialize};

/// A point in affect space.
///
/// - `valence` in `[-1, 1]` (unpleasant ↔ pleasant)
/// - `arousal` in `[0, 1]` (calm ↔ activated)
/// - `dominance` in `[0, 1]` (submissive ↔ in control)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectPoint {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
}

impl Default for AffectPoint {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl AffectPoint {
    /// Centre of the valence axis, floor of arousal, centre of dominance.
    pub const NEUTRAL: AffectPoint = AffectPoint {
        valence: 0.0,
        arousal: 0.0,
        dominance: 0.5,
    };

    /// Build a point, clamping every axis into its declared range.
    pub fn new(valence: f64, arousal: f64, dominance: f64) -> Self {
        Self {
            valence,
            arousal,
            dominance,
        }
        .clamped()
    }

    /// Clamp every axis into its declared range. NaN collapses to the
    /// neutral value for that axis.
    pub fn clamped(self) -> Self {
        fn clamp(v: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
            if v.is_nan() {
                fallback
            } else {
                v.clamp(lo, hi)
            }
        }
        Self {
            valence: clamp(self.valence, -1.0, 1.0, Self::NEUTRAL.valence),
            arousal: clamp(self.arousal, 0.0, 1.0, Self::NEUTRAL.arousal),
            dominance: clamp(self.dominance, 0.0, 1.0, Self::NEUTRAL.dominance),
        }
    }

    /// Whether every axis lies inside its declared range.
    pub fn in_range(&self) -> bool {
        (-1.0..=1.0).contains(&self.valence)
            && (0.0..=1.0).contains(&self.arousal)
            && (0.0..=1.0).contains(&self.dominance)
    }

    /// Linear interpolation toward `other` (`t` clamped to `[0, 1]`).
    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            valence: self.valence + (other.valence - self.valence) * t,
            arousal: self.arousal + (other.arousal - self.arousal) * t,
            dominance: self.dominance + (other.dominance - self.dominance) * t,
        }
    }

    /// Euclidean distance with a per-axis weight on the squared terms.
    pub fn weighted_distance(&self, other: &Self, weights: &AxisWeights) -> f64 {
        let dv = self.valence - other.valence;
        let da = self.arousal - other.arousal;
        let dd = self.dominance - other.dominance;
        (weights.valence * dv * dv + weights.arousal * da * da + weights.dominance * dd * dd)
            .sqrt()
    }

    /// Plain Euclidean distance.
    pub fn distance(&self, other: &Self) -> f64 {
        self.weighted_distance(other, &AxisWeights::UNIFORM)
    }
}

/// One coefficient per affect axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisWeights {
    pub valence: f64,
    pub arousal: f64,
    pub dominance: f64,
}

impl AxisWeights {
    pub const UNIFORM: AxisWeights = AxisWeights {
        valence: 1.0,
        arousal: 1.0,
        dominance: 1.0,
    };

    pub fn new(valence: f64, arousal: f64, dominance: f64) -> Self {
        Self {
            valence,
            arousal,
            dominance,
        }
    }

    pub fn sum(&self) -> f64 {
        self.valence + self.arousal + self.dominance
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.valence, self.arousal, self.dominance]
    }
}

impl Default for AxisWeights {
    fn default() -> Self {
        Self::UNIFORM
    }
}
