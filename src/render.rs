//! PDF renderer – a [`DocumentWriter`] that emits PDF bytes using
//! `pdf-writer`.
//!
//! Images are embedded verbatim as DCT streams in the asset's device colour
//! space, so CMYK JPEGs reach the press without being re-encoded. Every page
//! carries a MediaBox covering the bleed, a matching BleedBox and a TrimBox
//! inset by the bleed.

use pdf_writer::{Content, Filter, Name, Pdf, Rect as PdfRect, Ref, TextStr};

use crate::error::WriterError;
use crate::geometry::{PageGeometry, Rect};
use crate::model::{ColorSpace, ImageFormatKind, OptimizedAsset};
use crate::writer::{DocumentWriter, PageSetup, Point, StrokeColor, StrokeStyle, WriterFactory};

/// Opens a [`PdfWriter`] per document.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfWriterFactory;

impl WriterFactory for PdfWriterFactory {
    type Writer = PdfWriter;

    fn open(&self, setup: PageSetup) -> Result<PdfWriter, WriterError> {
        PdfWriter::new(setup)
    }
}

/// Content stream and XObject names of one page.
struct PageContent {
    content: Content,
    images: Vec<(String, Ref)>,
}

impl PageContent {
    fn new() -> Self {
        Self {
            content: Content::new(),
            images: Vec::new(),
        }
    }
}

pub struct PdfWriter {
    setup: PageSetup,
    pdf: Pdf,
    next_ref: i32,
    catalog_id: Ref,
    page_tree_id: Ref,
    info_id: Ref,
    finished: Vec<PageContent>,
    current: PageContent,
    image_count: usize,
}

impl PdfWriter {
    pub fn new(setup: PageSetup) -> Result<Self, WriterError> {
        let geo = &setup.geometry;
        if !(geo.width_pt > 0.0 && geo.height_pt > 0.0) || geo.bleed_pt < 0.0 {
            return Err(WriterError::Backend(format!(
                "degenerate page {}x{} pt with {} pt bleed",
                geo.width_pt, geo.height_pt, geo.bleed_pt
            )));
        }

        Ok(Self {
            setup,
            pdf: Pdf::new(),
            next_ref: 4,
            catalog_id: Ref::new(1),
            page_tree_id: Ref::new(2),
            info_id: Ref::new(3),
            finished: Vec::new(),
            current: PageContent::new(),
            image_count: 0,
        })
    }

    fn alloc(&mut self) -> Ref {
        let id = Ref::new(self.next_ref);
        self.next_ref += 1;
        id
    }

    fn page_height(&self) -> f32 {
        self.setup.geometry.height_pt
    }

    fn set_stroke(&mut self, style: StrokeStyle) {
        let space = self.setup.color_space;
        let content = &mut self.current.content;
        match (style.color, space) {
            (StrokeColor::Registration, ColorSpace::Cmyk) => {
                content.set_stroke_cmyk(1.0, 1.0, 1.0, 1.0);
            }
            (StrokeColor::Registration, ColorSpace::Rgb) => {
                content.set_stroke_rgb(0.0, 0.0, 0.0);
            }
            (StrokeColor::Registration, ColorSpace::Grayscale) => {
                content.set_stroke_gray(0.0);
            }
        }
        content.set_line_width(style.width_pt);
    }
}

impl DocumentWriter for PdfWriter {
    fn next_page(&mut self) -> Result<(), WriterError> {
        let done = std::mem::replace(&mut self.current, PageContent::new());
        self.finished.push(done);
        Ok(())
    }

    fn place_image(&mut self, asset: &OptimizedAsset, area: Rect) -> Result<(), WriterError> {
        let space = self.setup.color_space;
        match asset.settings.format {
            ImageFormatKind::Jpeg => {}
        }
        if asset.settings.color_space != space {
            return Err(WriterError::UnsupportedImage {
                color_space: space,
                reason: format!(
                    "asset {} is encoded in {}",
                    asset.item_id, asset.settings.color_space
                ),
            });
        }
        let (px_w, px_h) = match (
            i32::try_from(asset.pixel_width),
            i32::try_from(asset.pixel_height),
        ) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
            _ => {
                return Err(WriterError::ImageTooLarge {
                    width: asset.pixel_width,
                    height: asset.pixel_height,
                })
            }
        };

        let id = self.alloc();
        {
            let mut image = self.pdf.image_xobject(id, &asset.data);
            image.filter(Filter::DctDecode);
            image.width(px_w);
            image.height(px_h);
            match space {
                ColorSpace::Cmyk => image.color_space().device_cmyk(),
                ColorSpace::Rgb => image.color_space().device_rgb(),
                ColorSpace::Grayscale => image.color_space().device_gray(),
            }
            image.bits_per_component(8);
            // Adobe CMYK JPEGs store inverted samples.
            if space == ColorSpace::Cmyk && has_adobe_marker(&asset.data) {
                image.decode(INVERTED_CMYK);
            }
        }

        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        // PDF origin is bottom-left; layout origin is top-left.
        // The image unit square is stretched over the placement rect.
        let bottom = self.page_height() - area.y - area.height;
        let content = &mut self.current.content;
        content.save_state();
        content.transform([area.width, 0.0, 0.0, area.height, area.x, bottom]);
        content.x_object(Name(name.as_bytes()));
        content.restore_state();

        self.current.images.push((name, id));
        Ok(())
    }

    fn draw_line(&mut self, from: Point, to: Point, style: StrokeStyle) -> Result<(), WriterError> {
        self.set_stroke(style);
        let page_h = self.page_height();
        let content = &mut self.current.content;
        content.move_to(from.x, page_h - from.y);
        content.line_to(to.x, page_h - to.y);
        content.stroke();
        Ok(())
    }

    fn draw_rect(&mut self, rect: Rect, style: StrokeStyle) -> Result<(), WriterError> {
        self.set_stroke(style);
        let bottom = self.page_height() - rect.y - rect.height;
        let content = &mut self.current.content;
        content.rect(rect.x, bottom, rect.width, rect.height);
        content.stroke();
        Ok(())
    }

    fn finalize(mut self) -> Result<Vec<u8>, WriterError> {
        let last = std::mem::replace(&mut self.current, PageContent::new());
        let mut pages = std::mem::take(&mut self.finished);
        pages.push(last);

        let ids: Vec<(Ref, Ref)> = pages.iter().map(|_| (self.alloc(), self.alloc())).collect();
        let geo = self.setup.geometry;
        let media = media_box(&geo);
        let trim = trim_box(&geo);

        self.pdf.catalog(self.catalog_id).pages(self.page_tree_id);
        self.pdf
            .pages(self.page_tree_id)
            .kids(ids.iter().map(|(page_id, _)| *page_id))
            .count(pages.len() as i32);
        self.pdf
            .document_info(self.info_id)
            .title(TextStr(&self.setup.title))
            .creator(TextStr(concat!("gazette-press ", env!("CARGO_PKG_VERSION"))));

        for (page, (page_id, content_id)) in pages.into_iter().zip(ids) {
            {
                let mut pdf_page = self.pdf.page(page_id);
                pdf_page
                    .media_box(media)
                    .bleed_box(media)
                    .trim_box(trim)
                    .parent(self.page_tree_id)
                    .contents(content_id);
                let mut resources = pdf_page.resources();
                let mut x_objects = resources.x_objects();
                for (name, id) in &page.images {
                    x_objects.pair(Name(name.as_bytes()), *id);
                }
            }
            let stream = page.content.finish();
            self.pdf.stream(content_id, &stream);
        }

        let bytes = self.pdf.finish();
        if bytes.is_empty() {
            return Err(WriterError::Backend("empty PDF output".to_string()));
        }
        Ok(bytes)
    }
}

const INVERTED_CMYK: [f32; 8] = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];

/// Whether the JPEG carries an Adobe APP14 segment before its scan data.
fn has_adobe_marker(jpeg: &[u8]) -> bool {
    if !jpeg.starts_with(&[0xFF, 0xD8]) {
        return false;
    }
    let mut i = 2;
    while i + 4 <= jpeg.len() && jpeg[i] == 0xFF {
        let marker = jpeg[i + 1];
        // SOS or EOI: no more header segments.
        if marker == 0xDA || marker == 0xD9 {
            return false;
        }
        let len = u16::from_be_bytes([jpeg[i + 2], jpeg[i + 3]]) as usize;
        if marker == 0xEE && jpeg.get(i + 4..i + 9) == Some(b"Adobe".as_slice()) {
            return true;
        }
        i += 2 + len;
    }
    false
}

fn media_box(geo: &PageGeometry) -> PdfRect {
    PdfRect::new(0.0, 0.0, geo.width_pt, geo.height_pt)
}

/// Trim box in PDF space; symmetric bleed makes the flip a no-op.
fn trim_box(geo: &PageGeometry) -> PdfRect {
    PdfRect::new(
        geo.bleed_pt,
        geo.bleed_pt,
        geo.width_pt - geo.bleed_pt,
        geo.height_pt - geo.bleed_pt,
    )
}
