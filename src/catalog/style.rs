//! Music-style descriptors attached to every catalog emotion.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Harmonic character of a style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Harmony {
    Major,
    Lydian,
    Suspended,
    Modal,
    Minor,
    Dissonant,
}

/// Coarse tempo class. Ordered slowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoClass {
    Lento,
    Andante,
    Moderato,
    Allegro,
    Presto,
}

/// Coarse dynamics class. Ordered quietest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dynamics {
    Pianissimo,
    Piano,
    MezzoForte,
    Forte,
    Fortissimo,
}

impl Harmony {
    pub fn as_str(self) -> &'static str {
        match self {
            Harmony::Major => "major",
            Harmony::Lydian => "lydian",
            Harmony::Suspended => "suspended",
            Harmony::Modal => "modal",
            Harmony::Minor => "minor",
            Harmony::Dissonant => "dissonant",
        }
    }
}

impl TempoClass {
    pub fn as_str(self) -> &'static str {
        match self {
            TempoClass::Lento => "very slow tempo",
            TempoClass::Andante => "slow tempo",
            TempoClass::Moderato => "moderate tempo",
            TempoClass::Allegro => "fast tempo",
            TempoClass::Presto => "very fast tempo",
        }
    }
}

impl Dynamics {
    pub fn as_str(self) -> &'static str {
        match self {
            Dynamics::Pianissimo => "very soft",
            Dynamics::Piano => "soft",
            Dynamics::MezzoForte => "moderately loud",
            Dynamics::Forte => "loud",
            Dynamics::Fortissimo => "very loud",
        }
    }
}

impl fmt::Display for Harmony {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TempoClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Dynamics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Musical character associated with one emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    /// Genre phrase used as the prompt head (e.g. "upbeat pop").
    pub genre: String,
    pub instrumentation: BTreeSet<String>,
    pub harmony: Harmony,
    pub tempo_class: TempoClass,
    pub dynamics: Dynamics,
    /// Intrinsic layering density in `[0, 1]`.
    pub texture_complexity: f64,
    /// Nominal prompt strength in `[0, 1]`.
    pub weight: f64,
}

impl StyleDescriptor {
    pub(crate) fn build(
        genre: &str,
        instruments: &[&str],
        harmony: Harmony,
        tempo_class: TempoClass,
        dynamics: Dynamics,
        texture_complexity: f64,
        weight: f64,
    ) -> Self {
        Self {
            genre: genre.to_string(),
            instrumentation: instruments.iter().map(|s| s.to_string()).collect(),
            harmony,
            tempo_class,
            dynamics,
            texture_complexity,
            weight,
        }
    }

    /// Comma-separated instrument list in stable (sorted) order.
    pub fn instrument_list(&self) -> String {
        self.instrumentation
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
