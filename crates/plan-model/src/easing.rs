//! Easing curves for animated overlays.

use serde::{Deserialize, Serialize};

/// Easing curve applied to an animation progress value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Easing {
    Linear,
    #[serde(alias = "ease_in")]
    EaseIn,
    #[serde(alias = "ease_out")]
    EaseOut,
    #[default]
    #[serde(alias = "ease_in_out")]
    EaseInOut,
}

impl Easing {
    /// Map linear progress to eased progress. Input is clamped to `[0, 1]`.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t * t,
            Easing::EaseOut => 1.0 - (1.0 - t).powi(3),
            Easing::EaseInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
        }
    }
}
