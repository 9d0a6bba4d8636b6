//! Status feed documents
//!
//! Two kinds of upstream devices publish portal status as JSON:
//!
//! - **Tecthulhu modules** wrap the portal in `"status"`, list mods as
//!   `TYPE-RARITY` strings and use integer numbers.
//! - **Concentrators** wrap it in `"externalApiPortal"`, list mods as objects
//!   with an explicit slot, and may send fractional numbers.
//!
//! Both normalize into `LocationState`. Unknown fields are ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Faction, LocationState, ModSlot, ResonatorState};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unrecognized status document (expected \"status\" or \"externalApiPortal\")")]
    UnknownDocument,

    #[error("Status document has no portal title")]
    MissingTitle,
}

#[derive(Debug, Deserialize)]
struct ResonatorDoc {
    #[serde(default)]
    position: String,
    #[serde(default)]
    level: f32,
    #[serde(default)]
    health: f32,
    #[serde(default)]
    owner: Option<String>,
}

impl From<ResonatorDoc> for ResonatorState {
    fn from(doc: ResonatorDoc) -> Self {
        ResonatorState {
            position: doc.position,
            level: doc.level,
            health: doc.health,
            owner: doc.owner.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TecthulhuStatus {
    #[serde(default)]
    title: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    level: f32,
    #[serde(default)]
    health: f32,
    #[serde(default)]
    controlling_faction: String,
    #[serde(default)]
    mods: Option<Vec<String>>,
    #[serde(default)]
    resonators: Option<Vec<ResonatorDoc>>,
}

#[derive(Debug, Deserialize)]
struct ConcentratorMod {
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    slot: Option<f32>,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    rarity: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConcentratorStatus {
    #[serde(default, alias = "Title")]
    title: String,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    level: f32,
    #[serde(default)]
    health: f32,
    #[serde(default)]
    controlling_faction: String,
    #[serde(default)]
    mods: Option<Vec<ConcentratorMod>>,
    #[serde(default)]
    resonators: Option<Vec<ResonatorDoc>>,
}

impl TecthulhuStatus {
    fn into_state(self) -> LocationState {
        let mods = self
            .mods
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(slot, code)| {
                let (kind, rarity) = match code.split_once('-') {
                    Some((kind, rarity)) => (kind.to_string(), rarity.to_string()),
                    None => (code, String::new()),
                };
                ModSlot {
                    slot,
                    kind,
                    rarity,
                    owner: String::new(),
                }
            })
            .collect();

        LocationState {
            name: self.title,
            owner: self.owner.unwrap_or_default(),
            faction: Faction::parse(&self.controlling_faction),
            health: self.health,
            level: self.level,
            resonators: self
                .resonators
                .unwrap_or_default()
                .into_iter()
                .map(ResonatorState::from)
                .collect(),
            mods,
        }
    }
}

impl ConcentratorStatus {
    fn into_state(self) -> LocationState {
        let mods = self
            .mods
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, m)| ModSlot {
                slot: m.slot.map(|s| s.max(0.0) as usize).unwrap_or(index),
                kind: m.kind,
                rarity: m.rarity,
                owner: m.owner.unwrap_or_default(),
            })
            .collect();

        LocationState {
            name: self.title,
            owner: self.owner.unwrap_or_default(),
            faction: Faction::parse(&self.controlling_faction),
            health: self.health,
            level: self.level,
            resonators: self
                .resonators
                .unwrap_or_default()
                .into_iter()
                .map(ResonatorState::from)
                .collect(),
            mods,
        }
    }
}

/// Parse a tecthulhu or concentrator status document.
pub fn parse_status(body: &[u8]) -> Result<LocationState, FeedError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;

    let state = if let Some(portal) = value.get("externalApiPortal") {
        ConcentratorStatus::deserialize(portal)?.into_state()
    } else if let Some(status) = value.get("status") {
        TecthulhuStatus::deserialize(status)?.into_state()
    } else {
        return Err(FeedError::UnknownDocument);
    };

    if state.name.trim().is_empty() {
        return Err(FeedError::MissingTitle);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_tecthulhu_document() {
        let body = br#"{
            "status": {
                "title": "Camp Navarro",
                "owner": "agent",
                "level": 5,
                "health": 80,
                "controllingFaction": "Enlightened",
                "mods": ["HS-VR", "FA"],
                "resonators": [
                    {"position": "N", "level": 6, "health": 90, "owner": "agent"}
                ]
            }
        }"#;
        let state = parse_status(body).unwrap();
        assert_eq!(state.name, "Camp Navarro");
        assert_eq!(state.faction, Faction::Enlightened);
        assert_eq!(state.health, 80.0);
        assert_eq!(state.resonators.len(), 1);
        assert_eq!(state.resonators[0].position, "N");
        assert_eq!(state.mods[0].kind, "HS");
        assert_eq!(state.mods[0].rarity, "VR");
        assert_eq!(state.mods[1].slot, 1);
        assert_eq!(state.mods[1].rarity, "");
    }

    #[test]
    fn parses_concentrator_document() {
        let body = br#"{
            "externalApiPortal": {
                "Title": "Camp Navarro",
                "description": "a fountain",
                "coverImageUrl": "http://example/x.png",
                "owner": "agent",
                "level": 7.5,
                "health": 62.5,
                "controllingFaction": "Resistance",
                "mods": [{"owner": "a", "slot": 2, "type": "Portal Shield", "rarity": "Rare"}],
                "resonators": [{"position": "SW", "level": 8, "health": 100.0, "owner": "a"}]
            }
        }"#;
        let state = parse_status(body).unwrap();
        assert_eq!(state.name, "Camp Navarro");
        assert_eq!(state.faction, Faction::Resistance);
        assert_eq!(state.level, 7.5);
        assert_eq!(state.mods[0].slot, 2);
        assert_eq!(state.mods[0].kind, "Portal Shield");
        assert_eq!(state.resonators[0].position, "SW");
    }

    #[test]
    fn missing_lists_default_to_empty() {
        let body = br#"{"status": {"title": "Alpha", "controllingFaction": "Neutral", "mods": null}}"#;
        let state = parse_status(body).unwrap();
        assert!(state.mods.is_empty());
        assert!(state.resonators.is_empty());
    }

    #[test]
    fn unknown_faction_is_kept() {
        let body = br#"{"status": {"title": "Alpha", "controllingFaction": "Machina"}}"#;
        let state = parse_status(body).unwrap();
        assert_eq!(state.faction, Faction::Unrecognized("Machina".to_string()));
    }

    #[test]
    fn rejects_unknown_documents() {
        assert!(matches!(
            parse_status(br#"{"portal": {}}"#),
            Err(FeedError::UnknownDocument)
        ));
        assert!(matches!(parse_status(b"not json"), Err(FeedError::Json(_))));
        assert!(matches!(
            parse_status(br#"{"status": {"controllingFaction": "Neutral"}}"#),
            Err(FeedError::MissingTitle)
        ));
    }
}
