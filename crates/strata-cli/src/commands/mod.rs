//! CLI command implementations.

pub mod check;
pub mod common;
pub mod devices;
pub mod objects;
pub mod play;
pub mod render;
