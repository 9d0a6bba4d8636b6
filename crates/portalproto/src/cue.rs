//! Faction → audio cue table
//!
//! Cue names are `<token>-<kind>`, e.g. `e-ambient`, `r-capture`, `n-loss`.
//! The audio side resolves them to files.

use std::fmt;

use crate::model::Faction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueKind {
    /// Looping background for the controlling faction
    Ambient,
    /// One-shot played when a faction takes the portal
    Capture,
    /// One-shot played when a faction loses the portal
    Loss,
}

impl CueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CueKind::Ambient => "ambient",
            CueKind::Capture => "capture",
            CueKind::Loss => "loss",
        }
    }
}

/// A named audio trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cue(String);

impl Cue {
    /// Look up the cue for a faction. Unrecognized factions have no cue.
    pub fn for_faction(faction: &Faction, kind: CueKind) -> Option<Self> {
        faction
            .token()
            .map(|token| Cue(format!("{}-{}", token, kind.as_str())))
    }

    /// Wrap an arbitrary cue name (configured defaults, tests).
    pub fn named(name: impl Into<String>) -> Self {
        Cue(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_faction_has_distinct_cues() {
        let ambient: Vec<_> = [Faction::Neutral, Faction::Enlightened, Faction::Resistance]
            .iter()
            .filter_map(|f| Cue::for_faction(f, CueKind::Ambient))
            .map(Cue::into_string)
            .collect();
        assert_eq!(ambient, vec!["n-ambient", "e-ambient", "r-ambient"]);
    }

    #[test]
    fn unrecognized_faction_has_no_cue() {
        let faction = Faction::parse("Machina");
        assert!(Cue::for_faction(&faction, CueKind::Capture).is_none());
    }
}
