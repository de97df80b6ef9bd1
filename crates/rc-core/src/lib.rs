//! rc-core: shared errors, configuration, ids, media enums, and events.
//!
//! This crate is the foundational dependency for the other rc-* crates.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, Severity, SwapStage};
pub use ids::*;
pub use media::*;
