//! Common utility helpers
//!
//! - **[`serde`]**: Serialization helpers for durations in configuration
//!   files and health snapshots

pub mod serde;

// Re-export commonly used items for convenience
pub use self::serde::{duration_millis, duration_to_millis, option_duration_millis};
