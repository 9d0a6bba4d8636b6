//! Portal state model
//!
//! A `LocationState` is one observation of a portal: who holds it, how healthy
//! it is, and what sits on it. Identity is the portal name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Controlling party of a portal.
///
/// Feeds deliver the faction as free text. Anything outside the three known
/// values is kept verbatim in `Unrecognized` so it can be reported, and it
/// never aborts processing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Faction {
    Neutral,
    Enlightened,
    Resistance,
    Unrecognized(String),
}

impl Faction {
    /// Parse a feed value, case-insensitively.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "neutral" => Faction::Neutral,
            "enlightened" => Faction::Enlightened,
            "resistance" => Faction::Resistance,
            _ => Faction::Unrecognized(value.to_string()),
        }
    }

    /// Single-letter token shared by cue names and the frame's faction byte.
    pub fn token(&self) -> Option<char> {
        match self {
            Faction::Neutral => Some('n'),
            Faction::Enlightened => Some('e'),
            Faction::Resistance => Some('r'),
            Faction::Unrecognized(_) => None,
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.token().is_some()
    }

    pub fn as_str(&self) -> &str {
        match self {
            Faction::Neutral => "Neutral",
            Faction::Enlightened => "Enlightened",
            Faction::Resistance => "Resistance",
            Faction::Unrecognized(raw) => raw,
        }
    }
}

impl From<String> for Faction {
    fn from(value: String) -> Self {
        Faction::parse(&value)
    }
}

impl From<Faction> for String {
    fn from(value: Faction) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compass position of a resonator around the portal.
///
/// Frame slots run counter-clockwise starting at east:
///
/// ```text
/// slot:  0  1   2  3   4  5   6  7
///        E  NE  N  NW  W  SW  S  SE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompassPosition {
    E,
    NE,
    N,
    NW,
    W,
    SW,
    S,
    SE,
}

impl CompassPosition {
    pub const ALL: [CompassPosition; 8] = [
        CompassPosition::E,
        CompassPosition::NE,
        CompassPosition::N,
        CompassPosition::NW,
        CompassPosition::W,
        CompassPosition::SW,
        CompassPosition::S,
        CompassPosition::SE,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "E" => Some(CompassPosition::E),
            "NE" => Some(CompassPosition::NE),
            "N" => Some(CompassPosition::N),
            "NW" => Some(CompassPosition::NW),
            "W" => Some(CompassPosition::W),
            "SW" => Some(CompassPosition::SW),
            "S" => Some(CompassPosition::S),
            "SE" => Some(CompassPosition::SE),
            _ => None,
        }
    }

    /// Index of this position within the frame's 8-wide resonator fields.
    pub fn slot(self) -> usize {
        self as usize
    }
}

/// One resonator deployed on a portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResonatorState {
    /// Compass position as delivered by the feed ("N", "SE", ...)
    pub position: String,
    /// Resonator level, 0-8
    pub level: f32,
    /// Health percentage, 0-100
    pub health: f32,
    #[serde(default)]
    pub owner: String,
}

impl ResonatorState {
    /// Parsed compass position, `None` when the feed sent something else.
    pub fn compass(&self) -> Option<CompassPosition> {
        CompassPosition::parse(&self.position)
    }
}

/// A mod installed in one of the portal's four slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModSlot {
    /// Slot index, 0-3
    pub slot: usize,
    /// Mod type, abbreviated ("HS") or long form ("Heat Sink")
    pub kind: String,
    /// Rarity, abbreviated ("VR") or long form ("Very Rare"); may be empty
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub owner: String,
}

/// The last observed status of a single portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationState {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    pub faction: Faction,
    /// Overall portal health, 0-100
    pub health: f32,
    pub level: f32,
    #[serde(default)]
    pub resonators: Vec<ResonatorState>,
    #[serde(default)]
    pub mods: Vec<ModSlot>,
}

impl LocationState {
    /// A bare portal with no resonators or mods.
    pub fn new(name: impl Into<String>, faction: Faction, health: f32) -> Self {
        Self {
            name: name.into(),
            owner: String::new(),
            faction,
            health,
            level: 0.0,
            resonators: Vec::new(),
            mods: Vec::new(),
        }
    }

    pub fn with_resonator(mut self, position: &str, level: f32, health: f32) -> Self {
        self.resonators.push(ResonatorState {
            position: position.to_string(),
            level,
            health,
            owner: String::new(),
        });
        self
    }

    pub fn with_mod(mut self, slot: usize, kind: &str, rarity: &str) -> Self {
        self.mods.push(ModSlot {
            slot,
            kind: kind.to_string(),
            rarity: rarity.to_string(),
            owner: String::new(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faction_parse_is_case_insensitive() {
        assert_eq!(Faction::parse("Enlightened"), Faction::Enlightened);
        assert_eq!(Faction::parse("RESISTANCE"), Faction::Resistance);
        assert_eq!(Faction::parse(" neutral "), Faction::Neutral);
    }

    #[test]
    fn unrecognized_faction_keeps_raw_value() {
        let faction = Faction::parse("Machina");
        assert_eq!(faction, Faction::Unrecognized("Machina".to_string()));
        assert_eq!(faction.token(), None);
        assert_eq!(faction.to_string(), "Machina");
    }

    #[test]
    fn faction_serde_uses_plain_strings() {
        let json = serde_json::to_string(&Faction::Resistance).unwrap();
        assert_eq!(json, "\"Resistance\"");
        let back: Faction = serde_json::from_str("\"Enlightened\"").unwrap();
        assert_eq!(back, Faction::Enlightened);
    }

    #[test]
    fn compass_slots_run_counter_clockwise_from_east() {
        assert_eq!(CompassPosition::parse("E").map(|p| p.slot()), Some(0));
        assert_eq!(CompassPosition::parse("n").map(|p| p.slot()), Some(2));
        assert_eq!(CompassPosition::parse("SE").map(|p| p.slot()), Some(7));
        assert_eq!(CompassPosition::parse("NNE"), None);

        for (i, pos) in CompassPosition::ALL.iter().enumerate() {
            assert_eq!(pos.slot(), i);
        }
    }
}
