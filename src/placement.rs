//! Content placement – lays items out in a single row per page inside the
//! safe area.
//!
//! Handles:
//! - equal-width cells separated by a fixed gutter
//! - aspect-preserving fit of each item into its cell, centred
//! - wrapping onto further pages once a row is full
//!
//! One pass, no search: placement is a pure function of the items, the page
//! geometry and the [`PlacementConfig`].

use serde::{Deserialize, Serialize};

use crate::error::PlacementError;
use crate::geometry::{mm_to_pt, PageGeometry, Rect};
use crate::model::{ContentId, ContentItem, OptimizedAsset, PlacementRect};

/// Something with an identity and a pixel size to fit into a cell.
pub trait Placeable {
    fn content_id(&self) -> &ContentId;

    /// Width and height whose ratio the placed rect keeps.
    fn pixel_size(&self) -> (u32, u32);
}

impl Placeable for ContentItem {
    fn content_id(&self) -> &ContentId {
        &self.id
    }

    fn pixel_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Optimized assets are placed by the pixels they actually carry.
impl Placeable for OptimizedAsset {
    fn content_id(&self) -> &ContentId {
        &self.item_id
    }

    fn pixel_size(&self) -> (u32, u32) {
        (self.pixel_width, self.pixel_height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    /// Distance from the trim edge to the safe area, in millimetres.
    pub safe_inset_mm: f64,
    /// Horizontal space between neighbouring cells, in millimetres.
    pub gutter_mm: f64,
    /// Row capacity; further items wrap onto the next page.
    pub items_per_page: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            safe_inset_mm: 5.0,
            gutter_mm: 4.0,
            items_per_page: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContentPlacer {
    geometry: PageGeometry,
    config: PlacementConfig,
}

impl ContentPlacer {
    pub fn new(geometry: PageGeometry, config: PlacementConfig) -> Self {
        Self { geometry, config }
    }

    /// The area every rect must stay inside.
    pub fn safe_area(&self) -> Result<Rect, PlacementError> {
        self.geometry
            .safe_area(self.config.safe_inset_mm)
            .ok_or(PlacementError::NoSafeArea {
                inset_mm: self.config.safe_inset_mm,
            })
    }

    /// Number of pages `count` items occupy. Always at least one.
    pub fn page_count(&self, count: usize) -> usize {
        count.div_ceil(self.capacity()).max(1)
    }

    /// One rect per item, same order, every one flagged safe.
    pub fn place<P: Placeable>(&self, items: &[P]) -> Result<Vec<PlacementRect>, PlacementError> {
        let safe = self.safe_area()?;
        let gutter = mm_to_pt(self.config.gutter_mm.max(0.0)) as f32;
        let mut rects = Vec::with_capacity(items.len());

        for (page, row) in items.chunks(self.capacity()).enumerate() {
            let n = row.len() as f32;
            let cell_w = (safe.width - gutter * (n - 1.0)) / n;
            if cell_w <= 0.0 {
                return Err(PlacementError::NoSafeArea {
                    inset_mm: self.config.safe_inset_mm,
                });
            }

            for (slot, item) in row.iter().enumerate() {
                let (width, height) = item.pixel_size();
                if width == 0 || height == 0 {
                    return Err(PlacementError::EmptyItem {
                        item_id: item.content_id().clone(),
                    });
                }
                let cell = Rect::new(
                    safe.x + slot as f32 * (cell_w + gutter),
                    safe.y,
                    cell_w,
                    safe.height,
                );
                let fitted = fit_centered(width, height, &cell);
                rects.push(PlacementRect {
                    page,
                    x: fitted.x,
                    y: fitted.y,
                    width: fitted.width,
                    height: fitted.height,
                    in_safe_zone: safe.contains(&fitted),
                });
            }
        }

        log::debug!(
            "placed {} items on {} page(s)",
            rects.len(),
            self.page_count(items.len())
        );
        Ok(rects)
    }

    fn capacity(&self) -> usize {
        self.config.items_per_page.max(1)
    }
}

/// Largest rect with the source aspect ratio that fits `cell`, centred in it.
fn fit_centered(width: u32, height: u32, cell: &Rect) -> Rect {
    let scale = (cell.width / width as f32).min(cell.height / height as f32);
    let w = width as f32 * scale;
    let h = height as f32 * scale;
    Rect::new(
        cell.x + (cell.width - w) / 2.0,
        cell.y + (cell.height - h) / 2.0,
        w,
        h,
    )
}
