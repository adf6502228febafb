//! Strategies for naming the crowd's emotion.
//!
//! Every strategy fuses the same affect blend. They differ in how the
//! primary and secondary emotions are chosen and in how loud the result is.

use serde::{Deserialize, Serialize};

use crate::catalog::Emotion;
use crate::store::UserObservation;

/// How the fused state names the crowd's emotion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// The synthesizer picks the catalog emotion nearest the aggregate.
    #[default]
    WeightedAverage,
    /// The strongest user's emotion leads, and the runner-up's differing emotion follows.
    DominantEmotion,
    /// Weights are summed per emotion and the two largest sums lead.
    /// Diverse crowds are damped.
    HarmonicBlend,
}

/// Emotion choices made by a fusion method.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MethodPicks {
    pub primary: Option<Emotion>,
    pub secondary: Option<Emotion>,
    /// Multiplier applied to engagement, in `(0, 1]`.
    pub damping: f64,
}

impl MethodPicks {
    const NONE: MethodPicks = MethodPicks {
        primary: None,
        secondary: None,
        damping: 1.0,
    };
}

/// Share of engagement a fully diverse crowd loses under harmonic blending.
const HARMONIC_DAMPING: f64 = 0.3;

impl FusionMethod {
    /// `weighted` holds every user with non-zero weight.
    pub(crate) fn pick(&self, weighted: &[(&UserObservation, f64)]) -> MethodPicks {
        if weighted.is_empty() {
            return MethodPicks::NONE;
        }
        match self {
            FusionMethod::WeightedAverage => MethodPicks::NONE,
            FusionMethod::DominantEmotion => {
                let mut ranked: Vec<&(&UserObservation, f64)> = weighted.iter().collect();
                ranked.sort_by(|(a, wa), (b, wb)| {
                    wb.total_cmp(wa).then_with(|| a.user_id.cmp(&b.user_id))
                });
                let primary = ranked[0].0.emotion;
                let secondary = ranked
                    .iter()
                    .map(|(o, _)| o.emotion)
                    .find(|e| *e != primary);
                MethodPicks {
                    primary: Some(primary),
                    secondary,
                    damping: 1.0,
                }
            }
            FusionMethod::HarmonicBlend => {
                let mut sums = [0.0_f64; Emotion::ALL.len()];
                for (o, w) in weighted {
                    sums[o.emotion.index()] += w;
                }
                let mut ranked: Vec<(Emotion, f64)> = Emotion::ALL
                    .iter()
                    .map(|e| (*e, sums[e.index()]))
                    .filter(|(_, s)| *s > 0.0)
                    .collect();
                // Stable sort keeps declaration order among equal sums.
                ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

                let damping = if weighted.len() >= 2 {
                    let diversity = ranked.len() as f64 / weighted.len() as f64;
                    1.0 - HARMONIC_DAMPING * diversity
                } else {
                    1.0
                };
                MethodPicks {
                    primary: ranked.first().map(|(e, _)| *e),
                    secondary: ranked.get(1).map(|(e, _)| *e),
                    damping,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn obs(user: &str, emotion: Emotion) -> UserObservation {
        UserObservation {
            user_id: user.to_string(),
            emotion,
            intensity: 1.0,
            observed_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_weighted_average_leaves_choice_to_synthesizer() {
        let a = obs("a", Emotion::Happy);
        let picks = FusionMethod::WeightedAverage.pick(&[(&a, 0.9)]);
        assert_eq!(picks, MethodPicks::NONE);
    }

    #[test]
    fn test_dominant_emotion_ranks_by_weight() {
        let (a, b, c) = (
            obs("a", Emotion::Sad),
            obs("b", Emotion::Angry),
            obs("c", Emotion::Angry),
        );
        let picks = FusionMethod::DominantEmotion.pick(&[(&a, 0.4), (&b, 0.9), (&c, 0.8)]);
        assert_eq!(picks.primary, Some(Emotion::Angry));
        // "c" agrees with the leader, so the runner-up voice is "a".
        assert_eq!(picks.secondary, Some(Emotion::Sad));
        assert_eq!(picks.damping, 1.0);
    }

    #[test]
    fn test_harmonic_blend_sums_per_emotion_and_damps_diversity() {
        let (a, b, c) = (
            obs("a", Emotion::Relaxed),
            obs("b", Emotion::Relaxed),
            obs("c", Emotion::Excited),
        );
        let picks = FusionMethod::HarmonicBlend.pick(&[(&a, 0.5), (&b, 0.5), (&c, 0.8)]);
        assert_eq!(picks.primary, Some(Emotion::Relaxed));
        assert_eq!(picks.secondary, Some(Emotion::Excited));
        assert!((picks.damping - (1.0 - 0.3 * 2.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_harmonic_single_user_is_undamped() {
        let a = obs("a", Emotion::Fear);
        let picks = FusionMethod::HarmonicBlend.pick(&[(&a, 0.7)]);
        assert_eq!(picks.primary, Some(Emotion::Fear));
        assert_eq!(picks.secondary, None);
        assert_eq!(picks.damping, 1.0);
    }

    #[test]
    fn test_serde_snake_case() {
        let method: FusionMethod = serde_yaml::from_str("harmonic_blend").unwrap();
        assert_eq!(method, FusionMethod::HarmonicBlend);
        assert_eq!(
            serde_json::to_string(&FusionMethod::DominantEmotion).unwrap(),
            "\"dominant_emotion\""
        );
    }
}
