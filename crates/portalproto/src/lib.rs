//! portalproto - Portal status model and device wire encoding
//!
//! This crate holds everything about a monitored portal that does not touch
//! I/O:
//!
//! - `model`: `LocationState` and its parts (`Faction`, resonators, mods)
//! - `feed`: the JSON documents served by tecthulhu modules and concentrators,
//!   normalized into `LocationState`
//! - `cue`: the faction → audio cue table
//! - `frame`: the fixed-width ASCII `CommandFrame` sent to attached controllers
//!
//! The `pigateway` crate owns all the async plumbing and depends on this one.

pub mod cue;
pub mod feed;
pub mod frame;
pub mod model;

pub use cue::{Cue, CueKind};
pub use feed::{parse_status, FeedError};
pub use frame::{encode_percent, mod_code, CommandFrame, FRAME_LEN};
pub use model::{CompassPosition, Faction, LocationState, ModSlot, ResonatorState};
