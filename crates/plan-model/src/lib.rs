//! Reelcut Plan Model
//!
//! Defines the data contracts consumed by the render engine:
//! - **Operations:** Timestamped edit actions with one typed payload per kind
//! - **Plan:** The ordered operation list produced by the upstream planner
//! - **Narration:** Audio cues in the original recording's time base
//! - **Media:** Source properties and per-job render configuration
//!
//! Overlay geometry arrives in source pixels and is normalized to the
//! `[0.0, 1.0]` range before compositing.

pub mod easing;
pub mod error;
pub mod geometry;
pub mod media;
pub mod narration;
pub mod operation;
pub mod plan;

pub use easing::*;
pub use error::*;
pub use geometry::*;
pub use media::*;
pub use narration::*;
pub use operation::*;
pub use plan::*;
