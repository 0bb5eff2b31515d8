//! Data model – the records read from the gazette store and the ephemeral
//! values produced while one document is generated.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a gazette record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GazetteId(pub String);

impl GazetteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GazetteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a content item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical paper formats a layout may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A3,
    A4,
    A5,
    Letter,
    Legal,
}

impl PaperSize {
    /// Trim size `(width, height)` in millimetres, portrait.
    pub fn dimensions_mm(self) -> (f64, f64) {
        match self {
            PaperSize::A3 => (297.0, 420.0),
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::Letter => (215.9, 279.4),
            PaperSize::Legal => (215.9, 355.6),
        }
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaperSize::A3 => "A3",
            PaperSize::A4 => "A4",
            PaperSize::A5 => "A5",
            PaperSize::Letter => "Letter",
            PaperSize::Legal => "Legal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorSpace {
    Rgb,
    Cmyk,
    Grayscale,
}

impl ColorSpace {
    /// Number of 8-bit channels per pixel.
    pub fn channels(self) -> usize {
        match self {
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
            ColorSpace::Grayscale => 1,
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorSpace::Rgb => "RGB",
            ColorSpace::Cmyk => "CMYK",
            ColorSpace::Grayscale => "Grayscale",
        };
        f.write_str(name)
    }
}

/// How the printed sheets are bound. Carried through untouched; it does not
/// influence any geometry computed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingStyle {
    #[default]
    SaddleStitch,
    PerfectBound,
    Spiral,
    Loose,
}

/// Print-production parameters embedded in every gazette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutSpec {
    pub paper_size: PaperSize,
    pub color_space: ColorSpace,
    /// Output resolution in dots per inch.
    pub resolution: u32,
    /// Bleed beyond the trim edge, in millimetres.
    pub bleed_mm: f64,
    #[serde(default)]
    pub binding: BindingStyle,
}

impl LayoutSpec {
    /// A4, CMYK, 300 DPI, 3 mm bleed.
    pub fn press_default() -> Self {
        Self {
            paper_size: PaperSize::A4,
            color_space: ColorSpace::Cmyk,
            resolution: 300,
            bleed_mm: 3.0,
            binding: BindingStyle::default(),
        }
    }
}

/// A gazette as stored: ordered content references plus its layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gazette {
    pub id: GazetteId,
    pub content_ids: Vec<ContentId>,
    pub layout: LayoutSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Photo,
    Illustration,
    Scan,
}

/// One piece of raw gazette content.
///
/// `data` holds the encoded source image (PNG or JPEG); `width` and `height`
/// are its natural pixel dimensions as recorded by the store. The buffer is
/// shared, so cloning an item never copies pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentItem {
    pub id: ContentId,
    pub kind: MediaKind,
    pub data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
}

impl ContentItem {
    pub fn new(id: impl Into<String>, kind: MediaKind, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id: ContentId::new(id),
            kind,
            data: data.into(),
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
}

/// Chroma subsampling applied by a lossy encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChromaSampling {
    /// Every component sampled at full resolution (4:4:4).
    Full,
}

/// Encoder parameters attached to every optimized asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeSettings {
    pub format: ImageFormatKind,
    pub color_space: ColorSpace,
    /// 1..=100
    pub quality: u8,
    pub chroma: ChromaSampling,
}

impl EncodeSettings {
    /// The only settings used for press output: CMYK JPEG at quality 100
    /// without chroma subsampling.
    pub const PRESS_MASTER: EncodeSettings = EncodeSettings {
        format: ImageFormatKind::Jpeg,
        color_space: ColorSpace::Cmyk,
        quality: 100,
        chroma: ChromaSampling::Full,
    };
}

/// A print-grade rendition of a [`ContentItem`].
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedAsset {
    pub item_id: ContentId,
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// Bounding box the resize was asked to fit inside.
    pub target_width: u32,
    pub target_height: u32,
    /// Pixel dimensions actually produced by the codec.
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub settings: EncodeSettings,
}

/// Where one content item lands, in points from the top-left corner of the
/// full (bleed-inclusive) page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementRect {
    /// Zero-based page the rect belongs to.
    pub page: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub in_safe_zone: bool,
}

impl PlacementRect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// True when both rects share a page and their interiors intersect.
    pub fn overlaps(&self, other: &PlacementRect) -> bool {
        self.page == other.page
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}
