//! Accept loop feeding connections to the engine.

pub mod listener;
