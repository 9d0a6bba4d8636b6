//! Controller command frame
//!
//! One newline-terminated ASCII line per dispatch. Every field sits at a fixed
//! offset so the microcontroller can index straight into its receive buffer.
//!
//! ## Wire Format
//!
//! ```text
//! Byte  0       Faction     'n'/'e'/'r' steady, 'N'/'E'/'R' on the cycle the
//!                           faction changed, ' ' if unrecognized
//! Bytes 1-8     Levels      one digit per compass slot, '0' when empty
//! Byte  9       Health      overall portal health, percent-encoded
//! Bytes 10-17   Res health  per compass slot, percent-encoded, ' ' when empty
//! Bytes 18-21   Mods        one code per mod slot, ' ' when empty or unmapped
//! Byte  22      '\n'
//! ```
//!
//! Percent encoding maps 0 to `' '` and anything else to `' ' + value / 2`,
//! so 0-100 lands in the printable range `' '..='R'`.

use std::fmt;

use crate::model::{LocationState, ModSlot};

/// Total frame length including the terminator.
pub const FRAME_LEN: usize = 23;

pub const FACTION_OFFSET: usize = 0;
pub const LEVELS_OFFSET: usize = 1;
pub const HEALTH_OFFSET: usize = 9;
pub const RES_HEALTH_OFFSET: usize = 10;
pub const MODS_OFFSET: usize = 18;

/// Number of compass slots in the frame.
pub const RESONATOR_SLOTS: usize = 8;
/// Number of mod slots in the frame.
pub const MOD_SLOTS: usize = 4;

/// Placeholder for a faction the table doesn't know.
pub const UNKNOWN_FACTION: u8 = b' ';

/// Mod abbreviation → frame code.
const MOD_CODES: &[(&str, u8)] = &[
    ("FA", b'0'),
    ("HS-C", b'1'),
    ("HS-R", b'2'),
    ("HS-VR", b'3'),
    ("LA-R", b'4'),
    ("LA-VR", b'5'),
    ("SBUL", b'6'),
    ("MH-C", b'7'),
    ("MH-R", b'8'),
    ("MH-VR", b'9'),
    ("PS-C", b'A'),
    ("PS-R", b'B'),
    ("PS-VR", b'C'),
    ("AXA", b'D'),
    ("T", b'E'),
];

/// Compress a 0-100 percentage into one printable byte.
///
/// Fractions truncate, values outside 0-100 clamp.
pub fn encode_percent(value: f32) -> u8 {
    let v = if value.is_nan() {
        0
    } else {
        value.clamp(0.0, 100.0) as u8
    };
    if v == 0 {
        b' '
    } else {
        b' ' + v / 2
    }
}

/// First decimal digit of a resonator level.
fn level_digit(level: f32) -> u8 {
    let whole = if level.is_nan() { 0 } else { level.max(0.0) as u64 };
    whole.to_string().as_bytes()[0]
}

fn abbreviate_kind(kind: &str) -> &str {
    match kind.trim().to_ascii_lowercase().as_str() {
        "force amplifier" => "FA",
        "heat sink" => "HS",
        "link amplifier" => "LA",
        "softbank ultralink" | "softbank ultra link" => "SBUL",
        "multi-hack" | "multihack" => "MH",
        "portal shield" => "PS",
        "axa shield" => "AXA",
        "turret" => "T",
        _ => kind.trim(),
    }
}

fn abbreviate_rarity(rarity: &str) -> &str {
    match rarity.trim().to_ascii_lowercase().as_str() {
        "common" => "C",
        "rare" => "R",
        "very rare" | "very_rare" | "veryrare" => "VR",
        _ => rarity.trim(),
    }
}

/// Frame code for a mod, `None` when the table has no entry.
///
/// Accepts either a combined abbreviation in `kind` ("HS-VR") or separate
/// kind and rarity in long or short form. Mods whose code carries no rarity
/// (FA, SBUL, AXA, T) match regardless of the rarity given.
pub fn mod_code(kind: &str, rarity: &str) -> Option<u8> {
    let lookup = |key: &str| {
        MOD_CODES
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, code)| *code)
    };

    let kind = abbreviate_kind(kind);
    if kind.contains('-') {
        return lookup(kind);
    }

    let rarity = abbreviate_rarity(rarity);
    if !rarity.is_empty() {
        if let Some(code) = lookup(&format!("{}-{}", kind, rarity)) {
            return Some(code);
        }
    }
    lookup(kind)
}

fn mod_slot_code(slot: &ModSlot) -> u8 {
    mod_code(&slot.kind, &slot.rarity).unwrap_or(b' ')
}

/// One encoded line for the attached controllers.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandFrame(Vec<u8>);

impl CommandFrame {
    /// Encode a portal state.
    ///
    /// `faction_changed` selects the uppercase faction byte. Resonators at an
    /// unknown compass position and mods outside slots 0-3 are left out.
    pub fn encode(state: &LocationState, faction_changed: bool) -> Self {
        let mut bytes = vec![b' '; FRAME_LEN];

        bytes[FACTION_OFFSET] = match state.faction.token() {
            Some(token) if faction_changed => token.to_ascii_uppercase() as u8,
            Some(token) => token as u8,
            None => UNKNOWN_FACTION,
        };

        for slot in 0..RESONATOR_SLOTS {
            bytes[LEVELS_OFFSET + slot] = b'0';
        }
        for res in &state.resonators {
            if let Some(pos) = res.compass() {
                bytes[LEVELS_OFFSET + pos.slot()] = level_digit(res.level);
                bytes[RES_HEALTH_OFFSET + pos.slot()] = encode_percent(res.health);
            }
        }

        bytes[HEALTH_OFFSET] = encode_percent(state.health);

        for m in &state.mods {
            if m.slot < MOD_SLOTS {
                bytes[MODS_OFFSET + m.slot] = mod_slot_code(m);
            }
        }

        bytes[FRAME_LEN - 1] = b'\n';
        CommandFrame(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn faction_byte(&self) -> u8 {
        self.0[FACTION_OFFSET]
    }

    pub fn level_byte(&self, slot: usize) -> u8 {
        self.0[LEVELS_OFFSET + slot]
    }

    pub fn health_byte(&self) -> u8 {
        self.0[HEALTH_OFFSET]
    }

    pub fn resonator_health_byte(&self, slot: usize) -> u8 {
        self.0[RES_HEALTH_OFFSET + slot]
    }

    pub fn mod_byte(&self, slot: usize) -> u8 {
        self.0[MODS_OFFSET + slot]
    }
}

impl fmt::Display for CommandFrame {
    /// Escaped form for log lines, e.g. `"e00600000H  ...\n"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

impl fmt::Debug for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandFrame({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Faction;
    use pretty_assertions::assert_eq;

    #[test]
    fn percent_zero_is_space() {
        assert_eq!(encode_percent(0.0), b' ');
    }

    #[test]
    fn percent_hundred_stays_printable() {
        let top = encode_percent(100.0);
        assert_eq!(top, b' ' + 50);
        assert!(top.is_ascii_graphic());
    }

    #[test]
    fn percent_is_monotonic() {
        let mut last = encode_percent(0.0);
        for v in 0..=1000 {
            let next = encode_percent(v as f32 / 10.0);
            assert!(next >= last, "encoding dropped at {}", v as f32 / 10.0);
            last = next;
        }
    }

    #[test]
    fn percent_clamps_out_of_range() {
        assert_eq!(encode_percent(-5.0), b' ');
        assert_eq!(encode_percent(250.0), b' ' + 50);
        assert_eq!(encode_percent(f32::NAN), b' ');
    }

    #[test]
    fn level_digit_truncates() {
        assert_eq!(level_digit(6.0), b'6');
        assert_eq!(level_digit(7.9), b'7');
        assert_eq!(level_digit(12.0), b'1');
        assert_eq!(level_digit(-1.0), b'0');
    }

    #[test]
    fn mod_codes_accept_short_and_long_forms() {
        assert_eq!(mod_code("HS-VR", ""), Some(b'3'));
        assert_eq!(mod_code("Heat Sink", "Very Rare"), Some(b'3'));
        assert_eq!(mod_code("PS", "C"), Some(b'A'));
        assert_eq!(mod_code("Link Amplifier", "Rare"), Some(b'4'));
        assert_eq!(mod_code("Force Amplifier", "Rare"), Some(b'0'));
        assert_eq!(mod_code("Turret", ""), Some(b'E'));
        assert_eq!(mod_code("Ito En Transmuter", "Rare"), None);
    }

    #[test]
    fn empty_portal_frame() {
        let state = LocationState::new("Alpha", Faction::Neutral, 0.0);
        let frame = CommandFrame::encode(&state, false);

        let mut expected = b"n00000000".to_vec();
        expected.extend_from_slice(&[b' '; 13]);
        expected.push(b'\n');

        assert_eq!(frame.as_bytes(), expected.as_slice());
        assert_eq!(frame.len(), FRAME_LEN);
    }

    #[test]
    fn full_frame_layout() {
        let state = LocationState::new("Alpha", Faction::Resistance, 100.0)
            .with_resonator("E", 8.0, 100.0)
            .with_resonator("N", 6.0, 90.0)
            .with_resonator("SE", 1.0, 2.0)
            .with_mod(0, "PS", "VR")
            .with_mod(3, "AXA", "");
        let frame = CommandFrame::encode(&state, true);

        let mut expected = Vec::new();
        expected.push(b'R');
        expected.extend_from_slice(b"80600001");
        expected.push(b' ' + 50);
        expected.extend_from_slice(&[b' ' + 50, b' ', b' ' + 45, b' ', b' ', b' ', b' ', b' ' + 1]);
        expected.extend_from_slice(b"C  D");
        expected.push(b'\n');

        assert_eq!(frame.as_bytes(), expected.as_slice());
    }

    #[test]
    fn unknown_positions_and_slots_are_skipped() {
        let state = LocationState::new("Alpha", Faction::Enlightened, 50.0)
            .with_resonator("up", 8.0, 100.0)
            .with_mod(7, "HS", "C");
        let frame = CommandFrame::encode(&state, false);
        for slot in 0..RESONATOR_SLOTS {
            assert_eq!(frame.level_byte(slot), b'0');
            assert_eq!(frame.resonator_health_byte(slot), b' ');
        }
        for slot in 0..MOD_SLOTS {
            assert_eq!(frame.mod_byte(slot), b' ');
        }
        assert_eq!(frame.len(), FRAME_LEN);
    }

    #[test]
    fn unrecognized_faction_uses_placeholder() {
        let state = LocationState::new("Alpha", Faction::parse("Machina"), 10.0);
        let frame = CommandFrame::encode(&state, true);
        assert_eq!(frame.faction_byte(), UNKNOWN_FACTION);
        assert_eq!(frame.len(), FRAME_LEN);
    }

    #[test]
    fn display_escapes_newline() {
        let state = LocationState::new("Alpha", Faction::Neutral, 0.0);
        let shown = CommandFrame::encode(&state, false).to_string();
        assert!(shown.ends_with("\\n\""));
    }
}
