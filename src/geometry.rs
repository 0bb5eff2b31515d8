//! Physical units and page geometry.
//!
//! All layout coordinates are PDF points (1 pt = 1/72 inch) measured from the
//! top-left corner of the full page, bleed included. Renderers flip to the
//! PDF bottom-left origin themselves.

use serde::{Deserialize, Serialize};

use crate::model::LayoutSpec;

/// Points per millimetre: 72 pt per inch / 25.4 mm per inch.
pub const POINTS_PER_MM: f64 = 72.0 / 25.4;

/// Screen resolution source pixel dimensions are assumed to be authored at.
pub const REFERENCE_DPI: f64 = 72.0;

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * POINTS_PER_MM
}

/// Axis-aligned rectangle in points, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Shrink by `by` on every side. Returns `None` once nothing is left.
    pub fn inset(&self, by: f32) -> Option<Rect> {
        let width = self.width - 2.0 * by;
        let height = self.height - 2.0 * by;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Rect::new(self.x + by, self.y + by, width, height))
    }

    /// True if `other` lies entirely inside `self`. A small epsilon absorbs
    /// f32 rounding on shared edges.
    pub fn contains(&self, other: &Rect) -> bool {
        const EPS: f32 = 1e-3;
        other.x >= self.x - EPS
            && other.y >= self.y - EPS
            && other.right() <= self.right() + EPS
            && other.bottom() <= self.bottom() + EPS
    }
}

/// Dimensions of one physical page for a given layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    /// Full page width including bleed on both sides.
    pub width_pt: f32,
    pub height_pt: f32,
    pub bleed_pt: f32,
}

impl PageGeometry {
    /// `(trim + 2 × bleed) × 72/25.4` on each axis.
    pub fn for_spec(spec: &LayoutSpec) -> Self {
        let (trim_w, trim_h) = spec.paper_size.dimensions_mm();
        Self {
            width_pt: mm_to_pt(trim_w + spec.bleed_mm * 2.0) as f32,
            height_pt: mm_to_pt(trim_h + spec.bleed_mm * 2.0) as f32,
            bleed_pt: mm_to_pt(spec.bleed_mm) as f32,
        }
    }

    pub fn media_box(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width_pt, self.height_pt)
    }

    /// The finished page after cutting.
    pub fn trim_box(&self) -> Rect {
        Rect::new(
            self.bleed_pt,
            self.bleed_pt,
            self.width_pt - 2.0 * self.bleed_pt,
            self.height_pt - 2.0 * self.bleed_pt,
        )
    }

    /// Trim box shrunk by `inset_mm`; `None` when the inset consumes the page.
    pub fn safe_area(&self, inset_mm: f64) -> Option<Rect> {
        self.trim_box().inset(mm_to_pt(inset_mm) as f32)
    }
}
