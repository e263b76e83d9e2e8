//! Input pipelines: keystream (keys → annotated characters) and
//! gesturestream (touch frames → taps), plus their event vocabulary.

pub mod events;
pub mod gestures;
pub mod keycode;
pub mod keystream;
pub mod trie;
