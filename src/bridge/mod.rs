//! Host bridge: the pair-list wire format and the snapshot normalizer.
//!
//! The simulator bridge can only carry arrays of primitives, so every
//! payload arrives as an ordered tree of `[key, value]` pairs. Everything
//! crossing that trust boundary is normalized into typed records here;
//! raw maps never propagate into the engine.

mod normalizer;
mod pairs;

pub use normalizer::{ingest, BadSnapshot};
pub use pairs::{pair_list, BridgeError, PairValue};
