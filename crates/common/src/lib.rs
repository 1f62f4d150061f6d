//! Reelcut Common Utilities
//!
//! Shared infrastructure for all Reelcut crates:
//! - Error types and result aliases
//! - Frame timebase and render clock utilities
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
