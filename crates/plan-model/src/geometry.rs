//! Viewport and region types for overlay placement.
//!
//! Edit plans address the source frame in pixels. Internally everything is
//! normalized to the `[0.0, 1.0]` range so transforms survive resolution
//! changes between source and output.

use serde::{Deserialize, Serialize};

/// A rectangular viewport within the source frame.
///
/// Coordinates are normalized: `(0.0, 0.0)` is top-left,
/// `(1.0, 1.0)` is bottom-right of the full source frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Left edge (normalized).
    pub x: f64,
    /// Top edge (normalized).
    pub y: f64,
    /// Width (normalized).
    pub w: f64,
    /// Height (normalized).
    pub h: f64,
}

impl Viewport {
    /// Full-frame viewport (no zoom).
    pub const FULL: Viewport = Viewport {
        x: 0.0,
        y: 0.0,
        w: 1.0,
        h: 1.0,
    };

    /// Create a new viewport, clamping values to valid range.
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
            w: w.clamp(0.01, 1.0), // minimum 1% width
            h: h.clamp(0.01, 1.0), // minimum 1% height
        }
    }

    /// Create a viewport centered at `(cx, cy)` with given dimensions.
    /// Automatically clamps to stay within [0, 1] bounds.
    pub fn centered(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        let w = w.clamp(0.01, 1.0);
        let h = h.clamp(0.01, 1.0);

        let x = (cx - w / 2.0).clamp(0.0, 1.0 - w);
        let y = (cy - h / 2.0).clamp(0.0, 1.0 - h);

        Self { x, y, w, h }
    }

    /// The center point of this viewport.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        (self.x + self.w).min(1.0)
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        (self.y + self.h).min(1.0)
    }

    /// Effective zoom factor (1.0 = no zoom, 2.0 = 200% zoom).
    pub fn zoom_factor(&self) -> f64 {
        1.0 / self.w.min(self.h)
    }

    /// Check if a normalized point is within this viewport.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Linearly interpolate between two viewports.
    pub fn lerp(a: &Viewport, b: &Viewport, t: f64) -> Viewport {
        let t = t.clamp(0.0, 1.0);
        Viewport {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
            w: a.w + (b.w - a.w) * t,
            h: a.h + (b.h - a.h) * t,
        }
    }

    /// Convert a point from source space to viewport-local coordinates.
    /// Returns `None` if the point is outside the viewport.
    pub fn to_local(&self, px: f64, py: f64) -> Option<(f64, f64)> {
        if !self.contains(px, py) {
            return None;
        }
        Some(((px - self.x) / self.w, (py - self.y) / self.h))
    }

    /// Like [`Viewport::to_local`] but clamps points outside the viewport to its edge.
    pub fn to_local_clamped(&self, px: f64, py: f64) -> (f64, f64) {
        (
            ((px - self.x) / self.w).clamp(0.0, 1.0),
            ((py - self.y) / self.h).clamp(0.0, 1.0),
        )
    }

    /// Intersect a normalized rectangle with this viewport and express the
    /// visible part in viewport-local coordinates. `None` when nothing is visible.
    pub fn clip_local(&self, rect: &Viewport) -> Option<Viewport> {
        let left = rect.x.max(self.x);
        let top = rect.y.max(self.y);
        let right = (rect.x + rect.w).min(self.right());
        let bottom = (rect.y + rect.h).min(self.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Viewport {
            x: (left - self.x) / self.w,
            y: (top - self.y) / self.h,
            w: (right - left) / self.w,
            h: (bottom - top) / self.h,
        })
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::FULL
    }
}

/// A point in source pixel coordinates, `[x, y]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

impl PixelPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Normalize against a source resolution.
    pub fn normalized(&self, width: u32, height: u32) -> (f64, f64) {
        (
            self.x / width.max(1) as f64,
            self.y / height.max(1) as f64,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for PixelPoint {
    fn from(v: [f64; 2]) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

impl From<PixelPoint> for [f64; 2] {
    fn from(p: PixelPoint) -> Self {
        [p.x, p.y]
    }
}

/// An axis-aligned box in source pixel coordinates, `[x1, y1, x2, y2]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct PixelRect {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl PixelRect {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).abs()
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).abs()
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn is_valid(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }

    /// Normalize against a source resolution, clamped to the frame.
    pub fn normalized(&self, width: u32, height: u32) -> Viewport {
        let w = width.max(1) as f64;
        let h = height.max(1) as f64;
        let x1 = (self.x1.min(self.x2) / w).clamp(0.0, 1.0);
        let y1 = (self.y1.min(self.y2) / h).clamp(0.0, 1.0);
        let x2 = (self.x1.max(self.x2) / w).clamp(0.0, 1.0);
        let y2 = (self.y1.max(self.y2) / h).clamp(0.0, 1.0);
        Viewport {
            x: x1,
            y: y1,
            w: x2 - x1,
            h: y2 - y1,
        }
    }
}

impl From<[f64; 4]> for PixelRect {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<PixelRect> for [f64; 4] {
    fn from(r: PixelRect) -> Self {
        [r.x1, r.y1, r.x2, r.y2]
    }
}

/// An RGB color parsed from `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Parse `#RRGGBB` (leading `#` optional).
    pub fn parse_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    /// `0xRRGGBB` form used by ffmpeg color options.
    pub fn to_ffmpeg_hex(&self) -> String {
        format!("0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}
