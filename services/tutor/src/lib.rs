//! EngBuddy terminal front-end library.
//!
//! Application state and rendering for the `engbuddy` binary, which is a thin
//! input loop around this crate.

pub mod render;
pub mod state;
