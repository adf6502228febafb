//! Emotion catalog: the closed set of supported emotions.
//!
//! Each [`Emotion`] maps to a static [`EmotionProfile`]: a point in affect
//! space and the [`StyleDescriptor`] used to voice it musically. The table is
//! built once on first access and never mutated afterwards, so reads need no
//! synchronization.
//!
//! Declaration order of [`Emotion::ALL`] is significant: it is the total
//! order used to break ties when two emotions are equally close to a point.

pub mod affect;
pub mod style;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::FusionError;

pub use affect::{AffectPoint, AxisWeights};
pub use style::{Dynamics, Harmony, StyleDescriptor, TempoClass};

/// The 16 supported emotions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    // Positive
    Happy,
    Excited,
    Surprised,
    Pleased,
    Relaxed,
    // Negative
    Fear,
    Angry,
    Sad,
    Depressed,
    // Other negative variants
    Contempt,
    Disgust,
    Miserable,
    // Low arousal
    Bored,
    Tired,
    Sleepy,
    Neutral,
}

impl Emotion {
    /// Every emotion, in declaration (tie-break) order.
    pub const ALL: [Emotion; 16] = [
        Emotion::Happy,
        Emotion::Excited,
        Emotion::Surprised,
        Emotion::Pleased,
        Emotion::Relaxed,
        Emotion::Fear,
        Emotion::Angry,
        Emotion::Sad,
        Emotion::Depressed,
        Emotion::Contempt,
        Emotion::Disgust,
        Emotion::Miserable,
        Emotion::Bored,
        Emotion::Tired,
        Emotion::Sleepy,
        Emotion::Neutral,
    ];

    /// Canonical English label.
    pub fn label(self) -> &'static str {
        match self {
            Emotion::Happy => "Happy",
            Emotion::Excited => "Excited",
            Emotion::Surprised => "Surprised",
            Emotion::Pleased => "Pleased",
            Emotion::Relaxed => "Relaxed",
            Emotion::Fear => "Fear",
            Emotion::Angry => "Angry",
            Emotion::Sad => "Sad",
            Emotion::Depressed => "Depressed",
            Emotion::Contempt => "Contempt",
            Emotion::Disgust => "Disgust",
            Emotion::Miserable => "Miserable",
            Emotion::Bored => "Bored",
            Emotion::Tired => "Tired",
            Emotion::Sleepy => "Sleepy",
            Emotion::Neutral => "Neutral",
        }
    }

    /// Chinese label emitted by the EEG classifiers (`"Happy (开心)"`).
    pub fn zh_label(self) -> &'static str {
        match self {
            Emotion::Happy => "开心",
            Emotion::Excited => "激动",
            Emotion::Surprised => "惊喜",
            Emotion::Pleased => "平静",
            Emotion::Relaxed => "放松",
            Emotion::Fear => "恐惧",
            Emotion::Angry => "愤怒",
            Emotion::Sad => "悲伤",
            Emotion::Depressed => "沮丧",
            Emotion::Contempt => "轻蔑",
            Emotion::Disgust => "厌恶",
            Emotion::Miserable => "痛苦",
            Emotion::Bored => "无聊",
            Emotion::Tired => "疲倦",
            Emotion::Sleepy => "困倦",
            Emotion::Neutral => "中性",
        }
    }

    /// Position in [`Emotion::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Static profile for this emotion.
    pub fn profile(self) -> &'static EmotionProfile {
        &CATALOG[self.index()]
    }

    pub fn affect(self) -> AffectPoint {
        self.profile().affect
    }

    pub fn style(self) -> &'static StyleDescriptor {
        &self.profile().style
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Emotion {
    type Err = FusionError;

    /// Accepts `"happy"`, `"Happy"`, `"Happy (开心)"` and `"开心"`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let head = trimmed
            .split(|c| c == '(' || c == '（')
            .next()
            .unwrap_or("")
            .trim();

        Emotion::ALL
            .iter()
            .copied()
            .find(|e| e.label().eq_ignore_ascii_case(head) || e.zh_label() == head)
            .ok_or_else(|| FusionError::UnknownEmotion(trimmed.to_string()))
    }
}

/// Static knowledge about one emotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionProfile {
    pub emotion: Emotion,
    pub label: String,
    pub affect: AffectPoint,
    pub style: StyleDescriptor,
}

/// Resolve a raw label to its profile.
pub fn lookup(label: &str) -> Result<&'static EmotionProfile, FusionError> {
    label.parse::<Emotion>().map(Emotion::profile)
}

/// All profiles in declaration order.
pub fn profiles() -> &'static [EmotionProfile] {
    &CATALOG
}

// Dominance values are authored on a [-1, 1] scale and mapped to [0, 1].
fn profile(
    emotion: Emotion,
    valence: f64,
    arousal: f64,
    dominance: f64,
    style: StyleDescriptor,
) -> EmotionProfile {
    EmotionProfile {
        emotion,
        label: emotion.label().to_string(),
        affect: AffectPoint::new(valence, arousal, (dominance + 1.0) / 2.0),
        style,
    }
}

static CATALOG: Lazy<Vec<EmotionProfile>> = Lazy::new(|| {
    use Dynamics::*;
    use Harmony::*;
    use TempoClass::*;

    let table = vec![
        profile(
            Emotion::Happy,
            0.8,
            0.7,
            0.6,
            StyleDescriptor::build(
                "upbeat pop",
                &["acoustic guitar", "bass", "drums", "synth"],
                Major,
                Allegro,
                Forte,
                0.6,
                0.9,
            ),
        ),
        profile(
            Emotion::Excited,
            0.9,
            0.9,
            0.8,
            StyleDescriptor::build(
                "energetic rock",
                &["bass", "drums", "electric guitar"],
                Major,
                Presto,
                Fortissimo,
                0.8,
                0.95,
            ),
        ),
        profile(
            Emotion::Surprised,
            0.6,
            0.8,
            0.5,
            StyleDescriptor::build(
                "dramatic cinematic",
                &["brass", "orchestral percussion", "strings"],
                Lydian,
                Allegro,
                Forte,
                0.75,
                0.8,
            ),
        ),
        profile(
            Emotion::Pleased,
            0.7,
            0.3,
            0.4,
            StyleDescriptor::build(
                "serene nature",
                &["field recordings", "flute", "harp"],
                Major,
                Andante,
                Piano,
                0.35,
                0.5,
            ),
        ),
        profile(
            Emotion::Relaxed,
            0.6,
            0.2,
            0.3,
            StyleDescriptor::build(
                "peaceful meditation",
                &["pads", "singing bowls", "soft piano"],
                Suspended,
                Lento,
                Piano,
                0.25,
                0.6,
            ),
        ),
        profile(
            Emotion::Fear,
            -0.7,
            0.8,
            -0.6,
            StyleDescriptor::build(
                "dark ambient",
                &["drones", "low strings", "processed percussion"],
                Dissonant,
                Andante,
                MezzoForte,
                0.55,
                0.7,
            ),
        ),
        profile(
            Emotion::Angry,
            -0.8,
            0.9,
            0.7,
            StyleDescriptor::build(
                "aggressive metal",
                &["bass", "distorted guitar", "double kick drums"],
                Minor,
                Presto,
                Fortissimo,
                0.85,
                0.9,
            ),
        ),
        profile(
            Emotion::Sad,
            -0.8,
            0.3,
            -0.5,
            StyleDescriptor::build(
                "emotional ballad",
                &["cello", "piano", "strings"],
                Minor,
                Andante,
                Piano,
                0.4,
                0.7,
            ),
        ),
        profile(
            Emotion::Depressed,
            -0.9,
            0.2,
            -0.8,
            StyleDescriptor::build(
                "somber strings",
                &["cello", "double bass", "viola"],
                Minor,
                Lento,
                Pianissimo,
                0.3,
                0.6,
            ),
        ),
        profile(
            Emotion::Contempt,
            -0.5,
            0.4,
            0.6,
            StyleDescriptor::build(
                "cold electronic",
                &["analog synth", "drum machine"],
                Modal,
                Moderato,
                MezzoForte,
                0.5,
                0.6,
            ),
        ),
        profile(
            Emotion::Disgust,
            -0.8,
            0.6,
            0.3,
            StyleDescriptor::build(
                "dissonant experimental",
                &["noise", "prepared piano", "tape loops"],
                Dissonant,
                Moderato,
                MezzoForte,
                0.7,
                0.7,
            ),
        ),
        profile(
            Emotion::Miserable,
            -0.9,
            0.7,
            -0.7,
            StyleDescriptor::build(
                "melancholic piano",
                &["piano", "reverb pads"],
                Minor,
                Lento,
                Piano,
                0.3,
                0.8,
            ),
        ),
        profile(
            Emotion::Bored,
            -0.2,
            0.1,
            -0.3,
            StyleDescriptor::build(
                "minimal ambient",
                &["pads", "sine tones"],
                Modal,
                Lento,
                Pianissimo,
                0.15,
                0.4,
            ),
        ),
        profile(
            Emotion::Tired,
            -0.3,
            0.2,
            -0.4,
            StyleDescriptor::build(
                "soft acoustic",
                &["acoustic guitar", "brushed drums"],
                Suspended,
                Andante,
                Piano,
                0.25,
                0.5,
            ),
        ),
        profile(
            Emotion::Sleepy,
            0.1,
            0.1,
            -0.2,
            StyleDescriptor::build(
                "gentle lullaby",
                &["celesta", "music box", "soft strings"],
                Major,
                Lento,
                Pianissimo,
                0.15,
                0.3,
            ),
        ),
        profile(
            Emotion::Neutral,
            0.0,
            0.0,
            0.0,
            StyleDescriptor::build(
                "balanced instrumental",
                &["bass", "light percussion", "piano"],
                Modal,
                Moderato,
                MezzoForte,
                0.4,
                0.5,
            ),
        ),
    ];

    debug_assert!(table
        .iter()
        .zip(Emotion::ALL.iter())
        .all(|(p, e)| p.emotion == *e));
    table
});
