//! The outbound music directive and its textual rendering.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{Dynamics, Emotion, Harmony, TempoClass};

/// A text prompt with its relative strength, as consumed by
/// weighted-prompt music generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: f64,
}

/// Structured music-style instruction derived from the fused state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    /// Emotion whose style is being voiced.
    pub emotion: Emotion,
    /// Strongest differing emotion in the room, blended into the prompt.
    pub secondary: Option<Emotion>,
    pub genre: String,
    pub instrumentation: BTreeSet<String>,
    pub harmony: Harmony,
    pub tempo_class: TempoClass,
    pub dynamics: Dynamics,
    pub texture_complexity: f64,
    /// Weight of the emotion prompt in `[0, 1]`.
    pub intensity: f64,
    /// Rendered prompt text.
    pub prompt: String,
}

impl Directive {
    /// Build a directive voicing `emotion`'s catalog style.
    pub fn voicing(
        emotion: Emotion,
        secondary: Option<Emotion>,
        texture_complexity: f64,
        intensity: f64,
    ) -> Self {
        let style = emotion.style();
        let mut directive = Self {
            emotion,
            secondary,
            genre: style.genre.clone(),
            instrumentation: style.instrumentation.clone(),
            harmony: style.harmony,
            tempo_class: style.tempo_class,
            dynamics: style.dynamics,
            texture_complexity,
            intensity,
            prompt: String::new(),
        };
        directive.prompt = directive.render();
        directive
    }

    /// Whether any discrete (non-continuous) field differs.
    pub fn discrete_differs(&self, other: &Directive) -> bool {
        self.emotion != other.emotion
            || self.secondary != other.secondary
            || self.harmony != other.harmony
            || self.tempo_class != other.tempo_class
            || self.dynamics != other.dynamics
            || self.instrumentation != other.instrumentation
    }

    /// Render the prompt text.
    pub fn render(&self) -> String {
        let head = match self.secondary {
            Some(secondary) => format!(
                "{} blended with {}, social harmony",
                self.genre,
                secondary.style().genre
            ),
            None => format!("{}, emotional connection", self.genre),
        };
        let instruments = self
            .instrumentation
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{}, {} harmony, {}, {} dynamics, {} texture, featuring {}",
            head,
            self.harmony,
            self.tempo_class,
            self.dynamics,
            texture_label(self.texture_complexity),
            instruments
        )
    }

    /// Prompts to hand a weighted-prompt generator: the base prompt first,
    /// then the emotion prompt (omitted while its weight is zero).
    pub fn weighted_prompts(&self, base_prompt: &str, base_weight: f64) -> Vec<WeightedPrompt> {
        let mut prompts = vec![WeightedPrompt {
            text: base_prompt.to_string(),
            weight: base_weight,
        }];
        if self.intensity > 0.0 {
            prompts.push(WeightedPrompt {
                text: self.prompt.clone(),
                weight: self.intensity,
            });
        }
        prompts
    }
}

fn texture_label(complexity: f64) -> &'static str {
    if complexity < 0.33 {
        "sparse"
    } else if complexity < 0.66 {
        "layered"
    } else {
        "dense"
    }
}
