//! Status diffing
//!
//! Compares each observed `LocationState` against the last one seen for the
//! same portal and works out what changed: faction transitions, the cues they
//! trigger, and (for the home portal only) the frame to send.

use std::collections::HashMap;

use portalproto::{CommandFrame, Cue, CueKind, Faction, LocationState};
use tracing::warn;

/// Last known state per portal name.
///
/// Owned by the gateway loop, which is its only reader and writer.
#[derive(Debug, Default)]
pub struct StateStore {
    last: HashMap<String, LocationState>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&LocationState> {
        self.last.get(name)
    }

    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }

    fn replace(&mut self, state: LocationState) -> Option<LocationState> {
        self.last.insert(state.name.clone(), state)
    }
}

/// What one observation changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub location: String,
    /// First time this portal was seen; history was seeded, no capture/loss
    pub first_observation: bool,
    pub faction_changed: bool,
    pub previous_faction: Option<Faction>,
    pub faction: Faction,
    /// Ambient cue to switch to, if it needs switching
    pub ambient: Option<Cue>,
    /// One-shot cues, loss before capture
    pub effects: Vec<Cue>,
    /// Only built for the home portal
    pub frame: Option<CommandFrame>,
}

impl Transition {
    /// Whether the ambient cue must be (re)selected this cycle.
    pub fn force_ambient(&self) -> bool {
        self.first_observation
    }

    pub fn has_audio(&self) -> bool {
        self.ambient.is_some() || !self.effects.is_empty()
    }
}

fn cue(location: &str, faction: &Faction, kind: CueKind) -> Option<Cue> {
    let cue = Cue::for_faction(faction, kind);
    if cue.is_none() {
        warn!(
            location = %location,
            faction = %faction,
            "unrecognized faction, no {} cue",
            kind.as_str()
        );
    }
    cue
}

/// Diff `state` against the store, then record it as the latest.
///
/// The store is updated for every portal, home or not.
pub fn diff(store: &mut StateStore, home: &str, state: LocationState) -> Transition {
    let previous_faction = store.get(&state.name).map(|prior| prior.faction.clone());
    let first_observation = previous_faction.is_none();
    let faction_changed = previous_faction
        .as_ref()
        .map(|prior| *prior != state.faction)
        .unwrap_or(false);

    let location = state.name.clone();
    let mut effects = Vec::new();

    if faction_changed {
        if let Some(prior) = &previous_faction {
            effects.extend(cue(&location, prior, CueKind::Loss));
        }
        effects.extend(cue(&location, &state.faction, CueKind::Capture));
    }

    let ambient = if faction_changed || first_observation {
        cue(&location, &state.faction, CueKind::Ambient)
    } else {
        None
    };

    let frame = (state.name == home).then(|| CommandFrame::encode(&state, faction_changed));
    let faction = state.faction.clone();

    store.replace(state);

    Transition {
        location,
        first_observation,
        faction_changed,
        previous_faction,
        faction,
        ambient,
        effects,
        frame,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(faction: Faction) -> LocationState {
        LocationState::new("Alpha", faction, 80.0).with_resonator("N", 6.0, 90.0)
    }

    #[test]
    fn first_observation_seeds_history() {
        let mut store = StateStore::new();
        let t = diff(&mut store, "Alpha", alpha(Faction::Enlightened));

        assert!(t.first_observation);
        assert!(t.force_ambient());
        assert!(!t.faction_changed);
        assert!(t.effects.is_empty());
        assert_eq!(t.ambient, Some(Cue::named("e-ambient")));
        assert_eq!(store.get("Alpha"), Some(&alpha(Faction::Enlightened)));
    }

    #[test]
    fn faction_change_orders_loss_before_capture() {
        let mut store = StateStore::new();
        diff(&mut store, "Alpha", alpha(Faction::Enlightened));
        let t = diff(&mut store, "Alpha", alpha(Faction::Resistance));

        assert!(t.faction_changed);
        assert!(!t.first_observation);
        assert_eq!(t.previous_faction, Some(Faction::Enlightened));
        assert_eq!(
            t.effects,
            vec![Cue::named("e-loss"), Cue::named("r-capture")]
        );
        assert_eq!(t.ambient, Some(Cue::named("r-ambient")));
        assert_eq!(t.frame.unwrap().faction_byte(), b'R');
    }

    #[test]
    fn steady_state_is_quiet() {
        let mut store = StateStore::new();
        diff(&mut store, "Alpha", alpha(Faction::Neutral));
        let t = diff(&mut store, "Alpha", alpha(Faction::Neutral));

        assert!(!t.faction_changed);
        assert!(!t.has_audio());
        assert_eq!(t.frame.unwrap().faction_byte(), b'n');
    }

    #[test]
    fn frames_only_for_home() {
        let mut store = StateStore::new();
        let t = diff(
            &mut store,
            "Alpha",
            LocationState::new("Beta", Faction::Resistance, 50.0),
        );
        assert!(t.frame.is_none());
        // Non-home portals still update history
        assert!(store.get("Beta").is_some());
    }

    #[test]
    fn last_known_is_latest_update() {
        let mut store = StateStore::new();
        for health in [10.0, 40.0, 70.0, 20.0] {
            diff(
                &mut store,
                "Alpha",
                LocationState::new("Alpha", Faction::Enlightened, health),
            );
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Alpha").unwrap().health, 20.0);
    }

    #[test]
    fn unrecognized_faction_is_not_fatal() {
        let mut store = StateStore::new();
        diff(&mut store, "Alpha", alpha(Faction::Enlightened));
        let t = diff(&mut store, "Alpha", alpha(Faction::parse("Machina")));

        assert!(t.faction_changed);
        // Loss for the old faction survives, capture for the unknown one is absent
        assert_eq!(t.effects, vec![Cue::named("e-loss")]);
        assert_eq!(t.ambient, None);
        assert_eq!(t.frame.unwrap().faction_byte(), b' ');
    }
}
