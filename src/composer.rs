//! Document composition – opens a writer sized for the layout, draws every
//! asset at its placement and finalizes the byte stream.

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;
use crate::geometry::{mm_to_pt, PageGeometry, Rect};
use crate::model::{ColorSpace, LayoutSpec, OptimizedAsset, PlacementRect};
use crate::writer::{DocumentWriter, PageSetup, Point, StrokeColor, StrokeStyle, WriterFactory};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Draw crop marks in the bleed at each trim corner.
    pub draw_guides: bool,
    pub guide_width_pt: f32,
    /// Gap between a crop mark and the trim line, in millimetres.
    pub mark_offset_mm: f64,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            title: "Gazette".to_string(),
            draw_guides: true,
            guide_width_pt: 0.25,
            mark_offset_mm: 1.0,
        }
    }
}

/// A finished document and the facts it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedDocument {
    pub bytes: Vec<u8>,
    pub geometry: PageGeometry,
    pub color_space: ColorSpace,
    pub pages: usize,
}

pub struct DocumentComposer<F> {
    factory: F,
    config: ComposerConfig,
}

impl<F: WriterFactory> DocumentComposer<F> {
    pub fn new(factory: F, config: ComposerConfig) -> Self {
        Self { factory, config }
    }

    /// Compose and return only the bytes.
    pub fn compose(
        &self,
        spec: &LayoutSpec,
        assets: &[OptimizedAsset],
        placements: &[PlacementRect],
    ) -> Result<Vec<u8>, CompositionError> {
        self.compose_document(spec, assets, placements)
            .map(|doc| doc.bytes)
    }

    /// `assets[i]` is drawn at `placements[i]`. Placements must be grouped by
    /// non-decreasing page index.
    pub fn compose_document(
        &self,
        spec: &LayoutSpec,
        assets: &[OptimizedAsset],
        placements: &[PlacementRect],
    ) -> Result<ComposedDocument, CompositionError> {
        if assets.len() != placements.len() {
            return Err(CompositionError::CountMismatch {
                assets: assets.len(),
                placements: placements.len(),
            });
        }

        let geometry = PageGeometry::for_spec(spec);
        let mut writer = self.factory.open(PageSetup {
            title: self.config.title.clone(),
            geometry,
            color_space: spec.color_space,
        })?;

        let mut page = 0usize;
        for (asset, rect) in assets.iter().zip(placements) {
            if rect.page < page {
                return Err(CompositionError::PageOrder {
                    page: rect.page,
                    previous: page,
                });
            }
            while page < rect.page {
                self.draw_guides(&mut writer, &geometry)?;
                writer.next_page()?;
                page += 1;
            }
            let area = Rect::new(rect.x, rect.y, rect.width, rect.height);
            writer.place_image(asset, area)?;
        }
        self.draw_guides(&mut writer, &geometry)?;

        let bytes = writer.finalize()?;
        log::debug!("composed {} page(s), {} bytes", page + 1, bytes.len());

        Ok(ComposedDocument {
            bytes,
            geometry,
            color_space: spec.color_space,
            pages: page + 1,
        })
    }

    /// Eight crop marks: at each trim corner one horizontal and one vertical
    /// stroke running from the page edge to just short of the trim line.
    fn draw_guides<W: DocumentWriter>(
        &self,
        writer: &mut W,
        geo: &PageGeometry,
    ) -> Result<(), CompositionError> {
        if !self.config.draw_guides {
            return Ok(());
        }
        let offset = mm_to_pt(self.config.mark_offset_mm.max(0.0)) as f32;
        let reach = geo.bleed_pt - offset;
        if reach <= 0.0 {
            return Ok(());
        }

        let style = StrokeStyle {
            width_pt: self.config.guide_width_pt,
            color: StrokeColor::Registration,
        };
        let (w, h, b) = (geo.width_pt, geo.height_pt, geo.bleed_pt);

        for (trim_x, edge_x, stop_x) in [(b, 0.0, reach), (w - b, w, w - reach)] {
            for (trim_y, edge_y, stop_y) in [(b, 0.0, reach), (h - b, h, h - reach)] {
                writer.draw_line(Point::new(edge_x, trim_y), Point::new(stop_x, trim_y), style)?;
                writer.draw_line(Point::new(trim_x, edge_y), Point::new(trim_x, stop_y), style)?;
            }
        }
        Ok(())
    }
}
