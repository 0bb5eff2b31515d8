//! Integration tests for the gazette-press pipeline.
//!
//! These tests validate:
//! - Layout specs are accepted or rejected with the right failure
//! - Optimized assets have the press resolution, colour space and quality
//! - Placements stay in the safe zone, in order, across pages
//! - Generated PDFs carry the bleed-inclusive page size and CMYK images
//! - Fetch deadlines and cancellation surface as their own failures

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gazette_press::codec::{ImageCodec, RasterCodec};
use gazette_press::error::{
    CodecError, CompositionError, LayoutError, StoreError, ValidationError, WriterError,
};
use gazette_press::geometry::{PageGeometry, Rect};
use gazette_press::model::{
    BindingStyle, ChromaSampling, ColorSpace, ContentId, ContentItem, EncodeSettings, Gazette,
    GazetteId, LayoutSpec, MediaKind, OptimizedAsset, PaperSize, PlacementRect,
};
use gazette_press::optimizer::{target_dimensions, ImageOptimizer};
use gazette_press::placement::{ContentPlacer, PlacementConfig};
use gazette_press::render::PdfWriterFactory;
use gazette_press::store::{ContentRecord, GazetteStore, InMemoryStore, JsonFileStore, Manifest};
use gazette_press::validation::{LayoutValidator, ValidatorConfig};
use gazette_press::writer::{DocumentWriter, PageSetup, Point, StrokeStyle, WriterFactory};
use gazette_press::{EngineConfig, LayoutService, RequestContext};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

// =====================================================================
// Helpers
// =====================================================================

fn valid_spec() -> LayoutSpec {
    LayoutSpec::press_default()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn photo(id: &str, width: u32, height: u32) -> ContentItem {
    ContentItem::new(id, MediaKind::Photo, png(width, height), width, height)
}

fn sized(id: &str, width: u32, height: u32) -> ContentItem {
    ContentItem::new(id, MediaKind::Photo, Vec::new(), width, height)
}

fn gazette(id: &str, layout: LayoutSpec, items: &[ContentItem]) -> Gazette {
    Gazette {
        id: GazetteId::new(id),
        content_ids: items.iter().map(|i| i.id.clone()).collect(),
        layout,
    }
}

fn store_with(gazettes: Vec<Gazette>, items: Vec<ContentItem>) -> InMemoryStore {
    let mut store = InMemoryStore::new();
    for g in gazettes {
        store.insert_gazette(g);
    }
    for i in items {
        store.insert_content(i);
    }
    store
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

/// `(width, height, components)` from the first baseline SOF segment.
fn jpeg_frame(bytes: &[u8]) -> (u32, u32, u8) {
    assert_eq!(&bytes[0..2], &[0xFF, 0xD8], "missing SOI");
    let mut i = 2;
    while i + 4 < bytes.len() {
        assert_eq!(bytes[i], 0xFF, "marker expected at {i}");
        let marker = bytes[i + 1];
        let len = u16::from_be_bytes([bytes[i + 2], bytes[i + 3]]) as usize;
        if marker == 0xC0 {
            let h = u16::from_be_bytes([bytes[i + 5], bytes[i + 6]]) as u32;
            let w = u16::from_be_bytes([bytes[i + 7], bytes[i + 8]]) as u32;
            return (w, h, bytes[i + 9]);
        }
        i += 2 + len;
    }
    panic!("no SOF0 segment");
}

fn production_service<S: GazetteStore>(store: S) -> LayoutService<S, RasterCodec, PdfWriterFactory> {
    let config = EngineConfig {
        optimizer: gazette_press::config::OptimizerConfig { workers: 2 },
        ..EngineConfig::default()
    };
    LayoutService::new(store, Arc::new(RasterCodec::default()), PdfWriterFactory, &config)
}

// =====================================================================
// Recording fakes
// =====================================================================

#[derive(Debug, Clone, PartialEq)]
enum Drawn {
    Page,
    Image { item: String, area: Rect },
    Line,
}

#[derive(Clone, Default)]
struct Journal(Arc<Mutex<Vec<Drawn>>>);

impl Journal {
    fn events(&self) -> Vec<Drawn> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingWriter {
    journal: Journal,
}

impl DocumentWriter for RecordingWriter {
    fn next_page(&mut self) -> Result<(), WriterError> {
        self.journal.0.lock().unwrap().push(Drawn::Page);
        Ok(())
    }

    fn place_image(&mut self, asset: &OptimizedAsset, area: Rect) -> Result<(), WriterError> {
        self.journal.0.lock().unwrap().push(Drawn::Image {
            item: asset.item_id.to_string(),
            area,
        });
        Ok(())
    }

    fn draw_line(&mut self, _: Point, _: Point, _: StrokeStyle) -> Result<(), WriterError> {
        self.journal.0.lock().unwrap().push(Drawn::Line);
        Ok(())
    }

    fn draw_rect(&mut self, _: Rect, _: StrokeStyle) -> Result<(), WriterError> {
        Ok(())
    }

    fn finalize(self) -> Result<Vec<u8>, WriterError> {
        Ok(b"recorded".to_vec())
    }
}

struct RecordingFactory {
    journal: Journal,
    setups: Arc<Mutex<Vec<PageSetup>>>,
}

impl WriterFactory for RecordingFactory {
    type Writer = RecordingWriter;

    fn open(&self, setup: PageSetup) -> Result<RecordingWriter, WriterError> {
        self.setups.lock().unwrap().push(setup);
        Ok(RecordingWriter {
            journal: self.journal.clone(),
        })
    }
}

/// Echoes target sizes without touching pixels; fails on `fail_on` bytes.
struct ScriptedCodec {
    fail_on: Option<&'static [u8]>,
}

impl ImageCodec for ScriptedCodec {
    type Raster = (u32, u32, ColorSpace);

    fn decode(&self, bytes: &[u8]) -> Result<Self::Raster, CodecError> {
        if Some(bytes) == self.fail_on {
            return Err(CodecError::Decode("scripted failure".into()));
        }
        Ok((1, 1, ColorSpace::Rgb))
    }

    fn dimensions(&self, raster: &Self::Raster) -> (u32, u32) {
        (raster.0, raster.1)
    }

    fn resize_to_fit(&self, r: Self::Raster, w: u32, h: u32) -> Result<Self::Raster, CodecError> {
        Ok((w, h, r.2))
    }

    fn set_color_space(&self, r: Self::Raster, space: ColorSpace) -> Result<Self::Raster, CodecError> {
        Ok((r.0, r.1, space))
    }

    fn encode(&self, r: &Self::Raster, _: &EncodeSettings) -> Result<Vec<u8>, CodecError> {
        Ok(format!("{}x{}", r.0, r.1).into_bytes())
    }
}

/// Sleeps before answering.
struct SlowStore {
    inner: InMemoryStore,
    delay: Duration,
}

impl GazetteStore for SlowStore {
    async fn find_by_id(&self, id: &GazetteId) -> Result<Option<Gazette>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find_by_id(id).await
    }

    async fn fetch_content(&self, ids: &[ContentId]) -> Result<Vec<ContentItem>, StoreError> {
        self.inner.fetch_content(ids).await
    }
}

// =====================================================================
// Validation
// =====================================================================

#[test]
fn valid_specs_pass() {
    let validator = LayoutValidator::default();
    for resolution in [300, 301, 600, 2400] {
        for bleed_mm in [3.0, 3.5, 5.0, 12.7] {
            for binding in [BindingStyle::SaddleStitch, BindingStyle::PerfectBound] {
                let spec = LayoutSpec { resolution, bleed_mm, binding, ..valid_spec() };
                assert_eq!(validator.validate(&spec), Ok(()), "{spec:?}");
            }
        }
    }
}

#[test]
fn non_standard_page_size_fails() {
    for paper_size in [PaperSize::A3, PaperSize::A5, PaperSize::Letter, PaperSize::Legal] {
        let spec = LayoutSpec { paper_size, ..valid_spec() };
        assert_eq!(
            LayoutValidator::default().validate(&spec),
            Err(ValidationError::UnsupportedPageSize { found: paper_size, expected: PaperSize::A4 })
        );
    }
}

#[test]
fn non_production_colorspace_fails() {
    let spec = LayoutSpec { color_space: ColorSpace::Rgb, ..valid_spec() };
    assert!(matches!(
        LayoutValidator::default().validate(&spec),
        Err(ValidationError::UnsupportedColorSpace { found: ColorSpace::Rgb, .. })
    ));
}

#[test]
fn resolution_200_fails_with_required_300() {
    let spec = LayoutSpec { resolution: 200, ..valid_spec() };
    assert_eq!(
        LayoutValidator::default().validate(&spec),
        Err(ValidationError::InsufficientResolution { found: 200, required: 300 })
    );
}

#[test]
fn bleed_2mm_fails_with_required_3mm() {
    let spec = LayoutSpec { bleed_mm: 2.0, ..valid_spec() };
    assert_eq!(
        LayoutValidator::default().validate(&spec),
        Err(ValidationError::InsufficientBleed { found_mm: 2.0, required_mm: 3.0 })
    );
}

#[test]
fn thresholds_come_from_config() {
    let validator = LayoutValidator::new(ValidatorConfig {
        min_resolution_dpi: 150,
        min_bleed_mm: 2.0,
        ..ValidatorConfig::default()
    });
    let spec = LayoutSpec { resolution: 200, bleed_mm: 2.0, ..valid_spec() };
    assert_eq!(validator.validate(&spec), Ok(()));
}

// =====================================================================
// Optimization
// =====================================================================

#[test]
fn thousand_pixels_at_300_dpi_is_4167() {
    let optimizer = ImageOptimizer::new(Arc::new(ScriptedCodec { fail_on: None }), 1);
    let asset = optimizer.optimize_item(&sized("sq", 1000, 1000), 300).unwrap();

    assert_eq!((asset.target_width, asset.target_height), (4167, 4167));
    assert_eq!(asset.settings, EncodeSettings::PRESS_MASTER);
    assert_eq!(asset.settings.color_space, ColorSpace::Cmyk);
    assert_eq!(asset.settings.quality, 100);
    assert_eq!(asset.settings.chroma, ChromaSampling::Full);
}

#[test]
fn raster_codec_produces_cmyk_jpeg_at_target_size() {
    let optimizer = ImageOptimizer::new(Arc::new(RasterCodec::default()), 1);
    let asset = optimizer.optimize_item(&photo("p", 72, 48), 300).unwrap();

    assert_eq!((asset.target_width, asset.target_height), (300, 200));
    assert_eq!((asset.pixel_width, asset.pixel_height), (300, 200));
    assert_eq!(jpeg_frame(&asset.data), (300, 200, 4));
}

#[tokio::test]
async fn optimize_keeps_input_order_and_is_repeatable() {
    let items: Vec<_> = (0..12).map(|i| sized(&format!("c{i}"), 50 + i * 7, 40 + i)).collect();
    let optimizer = ImageOptimizer::new(Arc::new(ScriptedCodec { fail_on: None }), 4);

    let first = optimizer.optimize(&items, 300).await.unwrap();
    let second = optimizer.optimize(&items, 300).await.unwrap();

    assert_eq!(first, second);
    for (asset, item) in first.iter().zip(&items) {
        assert_eq!(asset.item_id, item.id);
        assert_eq!(
            (asset.target_width, asset.target_height),
            target_dimensions(item.width, item.height, 300)
        );
    }
}

#[tokio::test]
async fn optimize_failure_names_the_item() {
    let codec = ScriptedCodec { fail_on: Some(&b"bad"[..]) };
    let optimizer = ImageOptimizer::new(Arc::new(codec), 2);
    let items = vec![
        sized("ok", 10, 10),
        ContentItem::new("broken", MediaKind::Scan, b"bad".to_vec(), 10, 10),
    ];

    let err = optimizer.optimize(&items, 300).await.unwrap_err();
    assert_eq!(err.item_id.as_str(), "broken");
    assert!(err.to_string().contains("broken"));
}

// =====================================================================
// Placement
// =====================================================================

fn placer() -> ContentPlacer {
    ContentPlacer::new(PageGeometry::for_spec(&valid_spec()), PlacementConfig::default())
}

#[test]
fn two_items_two_safe_rects_left_to_right() {
    let rects = placer().place(&[sized("a", 400, 300), sized("b", 300, 400)]).unwrap();
    assert_eq!(rects.len(), 2);
    assert!(rects.iter().all(|r| r.in_safe_zone));
    assert!(rects[1].x > rects[0].x);
    assert!(!rects[0].overlaps(&rects[1]));
}

#[test]
fn placement_is_repeatable() {
    let items = [sized("a", 640, 480), sized("b", 10, 900), sized("c", 1, 1)];
    assert_eq!(placer().place(&items).unwrap(), placer().place(&items).unwrap());
}

#[test]
fn overflow_wraps_and_stays_safe() {
    let items: Vec<_> = (0..10).map(|i| sized(&format!("c{i}"), 100 + i, 80)).collect();
    let rects = placer().place(&items).unwrap();
    let safe = PageGeometry::for_spec(&valid_spec()).safe_area(5.0).unwrap();

    assert_eq!(rects.len(), 10);
    assert_eq!(rects.iter().map(|r| r.page).max(), Some(2));
    assert_eq!(placer().page_count(items.len()), 3);
    for (i, r) in rects.iter().enumerate() {
        assert!(r.in_safe_zone);
        assert!(safe.contains(&Rect::new(r.x, r.y, r.width, r.height)));
        for other in &rects[i + 1..] {
            assert!(!r.overlaps(other), "{r:?} overlaps {other:?}");
            if other.page == r.page {
                assert!(other.x > r.x);
            }
        }
    }
}

// =====================================================================
// Service with fakes
// =====================================================================

#[tokio::test]
async fn absent_gazette_is_not_found() {
    let svc = production_service(InMemoryStore::new());
    let err = svc.generate_layout(&GazetteId::new("g-404")).await.unwrap_err();
    assert!(matches!(err.kind(), LayoutError::GazetteNotFound));
    assert_eq!(err.gazette_id.as_str(), "g-404");
}

#[tokio::test]
async fn assets_are_drawn_at_their_placements() {
    let items: Vec<_> = (0..6).map(|i| sized(&format!("c{i}"), 300 + 10 * i, 200)).collect();
    let store = store_with(vec![gazette("g-1", valid_spec(), &items)], items.clone());
    let journal = Journal::default();
    let setups = Arc::new(Mutex::new(Vec::new()));
    let factory = RecordingFactory { journal: journal.clone(), setups: Arc::clone(&setups) };
    let svc = LayoutService::new(
        store,
        Arc::new(ScriptedCodec { fail_on: None }),
        factory,
        &EngineConfig::default(),
    );

    let doc = svc.render(&GazetteId::new("g-1"), &svc.context()).await.unwrap();
    assert_eq!(doc.bytes, b"recorded".to_vec());
    assert_eq!(doc.pages, 2);

    let setup = setups.lock().unwrap()[0].clone();
    assert_eq!(setup.color_space, ColorSpace::Cmyk);
    assert_eq!(setup.geometry, PageGeometry::for_spec(&valid_spec()));

    let events = journal.events();
    let images: Vec<(String, Rect)> = events
        .iter()
        .filter_map(|e| match e {
            Drawn::Image { item, area } => Some((item.clone(), *area)),
            _ => None,
        })
        .collect();
    assert_eq!(images.len(), 6);
    for ((item, area), (rect, src)) in images.iter().zip(doc.placements.iter().zip(&items)) {
        assert_eq!(item, src.id.as_str());
        assert_eq!(*area, Rect::new(rect.x, rect.y, rect.width, rect.height));
    }

    // one page break, eight crop marks on each of two pages
    assert_eq!(events.iter().filter(|e| **e == Drawn::Page).count(), 1);
    assert_eq!(events.iter().filter(|e| **e == Drawn::Line).count(), 16);
    let break_at = events.iter().position(|e| *e == Drawn::Page).unwrap();
    let before = events[..break_at].iter().filter(|e| matches!(e, Drawn::Image { .. })).count();
    assert_eq!(before, 4);
}

#[tokio::test]
async fn validation_failure_skips_content_fetch() {
    let spec = LayoutSpec { bleed_mm: 2.0, ..valid_spec() };
    // Content id is dangling: only a fetch would notice.
    let g = Gazette { content_ids: vec![ContentId::new("ghost")], ..gazette("g-1", spec, &[]) };
    let svc = production_service(store_with(vec![g], vec![]));

    let err = svc.generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        LayoutError::Validation(ValidationError::InsufficientBleed { .. })
    ));
}

#[tokio::test]
async fn missing_content_is_a_store_error() {
    let g = Gazette { content_ids: vec![ContentId::new("ghost")], ..gazette("g-1", valid_spec(), &[]) };
    let svc = production_service(store_with(vec![g], vec![]));

    let err = svc.generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
    assert!(matches!(err.kind(), LayoutError::Store(StoreError::MissingContent(_))));
}

#[tokio::test]
async fn composition_failure_is_not_partial_output() {
    struct Refusing;
    impl WriterFactory for Refusing {
        type Writer = RecordingWriter;
        fn open(&self, _: PageSetup) -> Result<RecordingWriter, WriterError> {
            Err(WriterError::Backend("no paper".into()))
        }
    }

    let items = vec![sized("a", 10, 10)];
    let store = store_with(vec![gazette("g-1", valid_spec(), &items)], items);
    let svc = LayoutService::new(
        store,
        Arc::new(ScriptedCodec { fail_on: None }),
        Refusing,
        &EngineConfig::default(),
    );

    let err = svc.generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
    assert!(matches!(
        err.into_kind(),
        LayoutError::Composition(CompositionError::Writer(WriterError::Backend(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn fetch_deadline_is_a_timeout() {
    let store = SlowStore { inner: InMemoryStore::new(), delay: Duration::from_secs(60) };
    let svc = production_service(store);
    let ctx = RequestContext::new(Some(Duration::from_millis(250)));

    let err = svc.render(&GazetteId::new("g-1"), &ctx).await.unwrap_err();
    assert!(matches!(
        err.kind(),
        LayoutError::FetchTimeout { timeout } if *timeout == Duration::from_millis(250)
    ));
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_fetch() {
    let store = SlowStore { inner: InMemoryStore::new(), delay: Duration::from_secs(60) };
    let svc = production_service(store);
    let token = CancellationToken::new();
    let ctx = RequestContext::new(None).with_cancel(token.clone());

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let err = svc.render(&GazetteId::new("g-1"), &ctx).await.unwrap_err();
    assert!(matches!(err.kind(), LayoutError::Cancelled));
}

// =====================================================================
// End to end
// =====================================================================

#[tokio::test]
async fn generate_layout_produces_press_pdf() {
    let items = vec![photo("p1", 72, 48), photo("p2", 30, 60)];
    let store = store_with(vec![gazette("g-1", valid_spec(), &items)], items);
    let svc = production_service(store);

    let doc = svc.render(&GazetteId::new("g-1"), &svc.context()).await.unwrap();

    assert!((doc.geometry.width_pt - (210.0 + 3.0 * 2.0) * 2.83465).abs() < 0.01);
    assert!((doc.geometry.height_pt - (297.0 + 3.0 * 2.0) * 2.83465).abs() < 0.01);
    assert_eq!(doc.color_space, ColorSpace::Cmyk);
    assert_eq!(doc.pages, 1);

    assert_valid_pdf(&doc.bytes);
    assert!(contains(&doc.bytes, b"/DeviceCMYK"));
    assert!(contains(&doc.bytes, b"/DCTDecode"));
    assert!(contains(&doc.bytes, b"/TrimBox"));
    assert!(contains(&doc.bytes, b"/BleedBox"));
    assert!(contains(&doc.bytes, b"/Im2"));

    let bytes = svc.generate_layout(&GazetteId::new("g-1")).await.unwrap();
    assert_eq!(bytes, doc.bytes, "same inputs, same document");
}

#[tokio::test]
async fn white_paper_carries_no_ink() {
    let img = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
    let mut data = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    let items = vec![ContentItem::new("white", MediaKind::Photo, data, 16, 16)];
    let store = store_with(vec![gazette("paper", valid_spec(), &items)], items);

    let bytes = production_service(store)
        .generate_layout(&GazetteId::new("paper"))
        .await
        .unwrap();

    // The encoder writes Adobe-inverted CMYK; the image must be decoded back.
    assert!(contains(&bytes, b"Adobe"));
    assert!(contains(&bytes, b"/Decode [1 0 1 0 1 0 1 0]"));
}

#[tokio::test]
async fn placement_follows_optimized_pixels_not_declared_size() {
    // Declared square, actually twice as wide as tall.
    let items = vec![ContentItem::new("banner", MediaKind::Photo, png(200, 100), 100, 100)];
    let store = store_with(vec![gazette("g-wide", valid_spec(), &items)], items);

    let doc = production_service(store)
        .render(&GazetteId::new("g-wide"), &RequestContext::default())
        .await
        .unwrap();

    let rect = &doc.placements[0];
    let aspect = rect.width / rect.height;
    assert!((aspect - 2.0).abs() < 0.02, "placed aspect {aspect}");
}

#[tokio::test]
async fn empty_gazette_is_one_blank_page() {
    let store = store_with(vec![gazette("blank", valid_spec(), &[])], vec![]);
    let doc = production_service(store)
        .render(&GazetteId::new("blank"), &RequestContext::default())
        .await
        .unwrap();
    assert_eq!(doc.pages, 1);
    assert!(doc.placements.is_empty());
    assert_valid_pdf(&doc.bytes);
    assert!(contains(&doc.bytes, b"/Count 1"));
}

#[tokio::test]
async fn json_file_store_end_to_end() {
    let item = photo("cover", 36, 24);
    let manifest = Manifest {
        gazettes: vec![gazette("weekly-12", valid_spec(), std::slice::from_ref(&item))],
        content: vec![ContentRecord::from_item(&item)],
    };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    std::fs::write(&path, manifest.to_json()).unwrap();

    let svc = production_service(JsonFileStore::new(&path));
    let doc = svc.render(&GazetteId::new("weekly-12"), &svc.context()).await.unwrap();

    assert_valid_pdf(&doc.bytes);
    let placed: &[PlacementRect] = &doc.placements;
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].page, 0);
    assert!(placed[0].in_safe_zone);
    let report = doc.report().to_json();
    assert!(report.contains("weekly-12"));
}
