//! Chapter Flow: branching visual-novel progression for games.
//!
//! Tracks the player's position in a chapter of authored content (a main
//! sequence plus click, forced and terminal branches) and decides, per
//! hold-gesture or click, which node is shown next. Display, audio and
//! scene-object activation are delegated to host-provided sinks.

pub mod core;
pub mod schema;
