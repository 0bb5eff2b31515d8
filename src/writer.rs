//! Document writer port.
//!
//! A writer is a stateful sink for one document: it is created from a
//! [`PageSetup`], receives drawing calls in order and is consumed by
//! [`DocumentWriter::finalize`], so it can be finalized at most once and is
//! never shared between requests.

use crate::error::WriterError;
use crate::geometry::{PageGeometry, Rect};
use crate::model::{ColorSpace, OptimizedAsset};

/// Page size and colour model a document is opened with.
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    pub title: String,
    pub geometry: PageGeometry,
    pub color_space: ColorSpace,
}

/// Colour for vector strokes, in the document's colour space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeColor {
    /// 100 % of every process ink; prints on every separation.
    Registration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeStyle {
    pub width_pt: f32,
    pub color: StrokeColor,
}

/// A point in layout coordinates (points, top-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

pub trait DocumentWriter {
    /// Close the current page and start an empty one.
    fn next_page(&mut self) -> Result<(), WriterError>;

    fn place_image(&mut self, asset: &OptimizedAsset, area: Rect) -> Result<(), WriterError>;

    fn draw_line(&mut self, from: Point, to: Point, style: StrokeStyle) -> Result<(), WriterError>;

    fn draw_rect(&mut self, rect: Rect, style: StrokeStyle) -> Result<(), WriterError>;

    /// Complete byte stream of the document.
    fn finalize(self) -> Result<Vec<u8>, WriterError>;
}

/// Opens a fresh [`DocumentWriter`] per document.
pub trait WriterFactory {
    type Writer: DocumentWriter;

    fn open(&self, setup: PageSetup) -> Result<Self::Writer, WriterError>;
}
