//! Pipeline – ties together fetching, validation, optimization, placement
//! and composition behind a single call.
//!
//! ```text
//! fetch gazette ─▶ validate layout ─▶ fetch content ─▶ optimize ─▶ place ─▶ compose
//! ```
//!
//! Stages run strictly in order. The first failure ends the request and is
//! returned as a [`GenerationError`] naming the gazette.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::codec::ImageCodec;
use crate::composer::DocumentComposer;
use crate::config::EngineConfig;
use crate::error::{GenerationError, LayoutError, StoreError};
use crate::geometry::PageGeometry;
use crate::model::{ColorSpace, ContentItem, Gazette, GazetteId, PlacementRect};
use crate::optimizer::ImageOptimizer;
use crate::placement::{ContentPlacer, PlacementConfig};
use crate::store::GazetteStore;
use crate::validation::LayoutValidator;
use crate::writer::WriterFactory;

/// Caller-owned limits for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Deadline for everything the store does for this request.
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A finished, print-ready document.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub gazette_id: GazetteId,
    pub bytes: Vec<u8>,
    pub geometry: PageGeometry,
    pub color_space: ColorSpace,
    pub pages: usize,
    pub placements: Vec<PlacementRect>,
}

impl RenderedDocument {
    /// Page geometry and placements without the document bytes.
    pub fn report(&self) -> LayoutReport {
        LayoutReport {
            gazette_id: self.gazette_id.clone(),
            page_width_pt: self.geometry.width_pt,
            page_height_pt: self.geometry.height_pt,
            bleed_pt: self.geometry.bleed_pt,
            color_space: self.color_space,
            pages: self.pages,
            placements: self.placements.clone(),
        }
    }
}

/// JSON summary of a rendered document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutReport {
    pub gazette_id: GazetteId,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub bleed_pt: f32,
    pub color_space: ColorSpace,
    pub pages: usize,
    pub placements: Vec<PlacementRect>,
}

impl LayoutReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

pub struct LayoutService<S, C, F> {
    store: S,
    validator: LayoutValidator,
    optimizer: ImageOptimizer<C>,
    placement: PlacementConfig,
    composer: DocumentComposer<F>,
    fetch_timeout: Option<Duration>,
}

impl<S, C, F> LayoutService<S, C, F>
where
    S: GazetteStore,
    C: ImageCodec + 'static,
    F: WriterFactory,
{
    pub fn new(store: S, codec: Arc<C>, factory: F, config: &EngineConfig) -> Self {
        Self {
            store,
            validator: LayoutValidator::new(config.validator.clone()),
            optimizer: ImageOptimizer::new(codec, config.optimizer.workers),
            placement: config.placement.clone(),
            composer: DocumentComposer::new(factory, config.composer.clone()),
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Context carrying the configured fetch deadline and a fresh token.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.fetch_timeout)
    }

    /// Generate the document for `id` and return its bytes.
    pub async fn generate_layout(&self, id: &GazetteId) -> Result<Vec<u8>, GenerationError> {
        self.render(id, &self.context()).await.map(|doc| doc.bytes)
    }

    /// Generate the document for `id` under the caller's context.
    pub async fn render(
        &self,
        id: &GazetteId,
        ctx: &RequestContext,
    ) -> Result<RenderedDocument, GenerationError> {
        match self.run(id, ctx).await {
            Ok(doc) => {
                log::info!(
                    "gazette {id}: {} page(s), {} bytes",
                    doc.pages,
                    doc.bytes.len()
                );
                Ok(doc)
            }
            Err(kind) => {
                log::warn!("gazette {id}: {kind}");
                Err(GenerationError::new(id.clone(), kind))
            }
        }
    }

    async fn run(&self, id: &GazetteId, ctx: &RequestContext) -> Result<RenderedDocument, LayoutError> {
        let deadline = ctx.timeout.map(|limit| (Instant::now() + limit, limit));

        // 1. Fetch the gazette record
        let gazette: Gazette = guarded(ctx, deadline, self.store.find_by_id(id))
            .await?
            .ok_or(LayoutError::GazetteNotFound)?;
        let spec = gazette.layout;

        // 2. Validate before touching any content
        self.validator.validate(&spec)?;
        log::debug!("gazette {id}: layout {spec:?} accepted");

        // 3. Fetch content in gazette order
        let items: Vec<ContentItem> =
            guarded(ctx, deadline, self.store.fetch_content(&gazette.content_ids)).await?;
        log::debug!("gazette {id}: fetched {} content item(s)", items.len());

        if ctx.cancel.is_cancelled() {
            return Err(LayoutError::Cancelled);
        }

        // 4. Optimize
        let assets = self.optimizer.optimize(&items, spec.resolution).await?;

        // 5. Place the optimized assets, which keep the item order
        let geometry = PageGeometry::for_spec(&spec);
        let placements = ContentPlacer::new(geometry, self.placement.clone()).place(&assets)?;
        log::debug!("gazette {id}: placed {} item(s)", placements.len());

        // 6. Compose
        let doc = self.composer.compose_document(&spec, &assets, &placements)?;

        Ok(RenderedDocument {
            gazette_id: id.clone(),
            bytes: doc.bytes,
            geometry: doc.geometry,
            color_space: doc.color_space,
            pages: doc.pages,
            placements,
        })
    }
}

/// Run a store call under the request deadline, racing cancellation.
async fn guarded<T>(
    ctx: &RequestContext,
    deadline: Option<(Instant, Duration)>,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, LayoutError> {
    let bounded = async {
        match deadline {
            Some((at, limit)) => match tokio::time::timeout_at(at, call).await {
                Ok(result) => result.map_err(LayoutError::from),
                Err(_) => Err(LayoutError::FetchTimeout { timeout: limit }),
            },
            None => call.await.map_err(LayoutError::from),
        }
    };

    tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => Err(LayoutError::Cancelled),
        result = bounded => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CodecError, ValidationError, WriterError};
    use crate::geometry::Rect;
    use crate::model::{ContentId, EncodeSettings, LayoutSpec, MediaKind, OptimizedAsset};
    use crate::store::InMemoryStore;
    use crate::writer::{DocumentWriter, PageSetup, Point, StrokeStyle};

    /// Raster is just the target size.
    struct SizeCodec;

    impl ImageCodec for SizeCodec {
        type Raster = (u32, u32);

        fn decode(&self, bytes: &[u8]) -> Result<Self::Raster, CodecError> {
            if bytes.is_empty() {
                return Err(CodecError::Decode("empty buffer".into()));
            }
            Ok((1, 1))
        }

        fn dimensions(&self, raster: &Self::Raster) -> (u32, u32) {
            *raster
        }

        fn resize_to_fit(&self, _: Self::Raster, w: u32, h: u32) -> Result<Self::Raster, CodecError> {
            Ok((w, h))
        }

        fn set_color_space(&self, raster: Self::Raster, _: ColorSpace) -> Result<Self::Raster, CodecError> {
            Ok(raster)
        }

        fn encode(&self, _: &Self::Raster, _: &EncodeSettings) -> Result<Vec<u8>, CodecError> {
            Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
        }
    }

    struct CountingWriter {
        pages: usize,
        images: usize,
    }

    impl DocumentWriter for CountingWriter {
        fn next_page(&mut self) -> Result<(), WriterError> {
            self.pages += 1;
            Ok(())
        }

        fn place_image(&mut self, _: &OptimizedAsset, _: Rect) -> Result<(), WriterError> {
            self.images += 1;
            Ok(())
        }

        fn draw_line(&mut self, _: Point, _: Point, _: StrokeStyle) -> Result<(), WriterError> {
            Ok(())
        }

        fn draw_rect(&mut self, _: Rect, _: StrokeStyle) -> Result<(), WriterError> {
            Ok(())
        }

        fn finalize(self) -> Result<Vec<u8>, WriterError> {
            Ok(format!("{} pages, {} images", self.pages, self.images).into_bytes())
        }
    }

    struct CountingFactory;

    impl WriterFactory for CountingFactory {
        type Writer = CountingWriter;

        fn open(&self, _: PageSetup) -> Result<CountingWriter, WriterError> {
            Ok(CountingWriter { pages: 1, images: 0 })
        }
    }

    /// Delays every call by `delay`.
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
            tokio::time::sleep(self.delay).await;
            self.inner.fetch_content(ids).await
        }
    }

    fn store_with(layout: LayoutSpec, items: usize) -> InMemoryStore {
        let mut store = InMemoryStore::new();
        let mut ids = Vec::new();
        for i in 0..items {
            let id = format!("c{i}");
            store.insert_content(ContentItem::new(id.as_str(), MediaKind::Photo, vec![1], 320, 240));
            ids.push(ContentId::new(id));
        }
        store.insert_gazette(Gazette {
            id: GazetteId::new("g-1"),
            content_ids: ids,
            layout,
        });
        store
    }

    fn service<S: GazetteStore>(store: S) -> LayoutService<S, SizeCodec, CountingFactory> {
        let config = EngineConfig {
            fetch_timeout_ms: Some(50),
            ..EngineConfig::default()
        };
        LayoutService::new(store, Arc::new(SizeCodec), CountingFactory, &config)
    }

    #[tokio::test]
    async fn absent_gazette_is_not_found() {
        let svc = service(InMemoryStore::new());
        let err = svc.generate_layout(&GazetteId::new("missing")).await.unwrap_err();
        assert_eq!(err.gazette_id.as_str(), "missing");
        assert!(matches!(err.kind(), LayoutError::GazetteNotFound));
    }

    #[tokio::test]
    async fn validation_failure_is_passed_through() {
        let layout = LayoutSpec { resolution: 200, ..LayoutSpec::press_default() };
        let err = service(store_with(layout, 1))
            .generate_layout(&GazetteId::new("g-1"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            LayoutError::Validation(ValidationError::InsufficientResolution { found: 200, required: 300 })
        ));
    }

    #[tokio::test]
    async fn page_size_includes_bleed() {
        let svc = service(store_with(LayoutSpec::press_default(), 2));
        let doc = svc.render(&GazetteId::new("g-1"), &svc.context()).await.unwrap();

        assert!((doc.geometry.width_pt - 216.0 * 2.83465).abs() < 0.01);
        assert!((doc.geometry.height_pt - 303.0 * 2.83465).abs() < 0.01);
        assert_eq!(doc.color_space, ColorSpace::Cmyk);
        assert_eq!(doc.placements.len(), 2);
        assert_eq!(doc.bytes, b"1 pages, 2 images".to_vec());

        let json = doc.report().to_json();
        assert!(json.contains("\"gazette_id\": \"g-1\""));
        assert!(json.contains("\"CMYK\""));
    }

    #[tokio::test]
    async fn overflow_wraps_to_new_pages() {
        let svc = service(store_with(LayoutSpec::press_default(), 9));
        let doc = svc.render(&GazetteId::new("g-1"), &svc.context()).await.unwrap();
        assert_eq!(doc.pages, 3);
        assert_eq!(doc.bytes, b"3 pages, 9 images".to_vec());
    }

    #[tokio::test]
    async fn codec_failure_names_the_item() {
        let mut store = store_with(LayoutSpec::press_default(), 2);
        store.insert_content(ContentItem::new("c1", MediaKind::Scan, Vec::new(), 10, 10));
        let err = service(store).generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
        match err.into_kind() {
            LayoutError::AssetEncoding(e) => assert_eq!(e.item_id.as_str(), "c1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_times_out() {
        let store = SlowStore {
            inner: store_with(LayoutSpec::press_default(), 1),
            delay: Duration::from_secs(5),
        };
        let err = service(store).generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
        assert!(matches!(
            err.kind(),
            LayoutError::FetchTimeout { timeout } if *timeout == Duration::from_millis(50)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_covers_both_store_calls() {
        // Each call fits on its own, the pair does not.
        let store = SlowStore {
            inner: store_with(LayoutSpec::press_default(), 1),
            delay: Duration::from_millis(30),
        };
        let err = service(store).generate_layout(&GazetteId::new("g-1")).await.unwrap_err();
        assert!(matches!(err.kind(), LayoutError::FetchTimeout { .. }));
    }

    #[tokio::test]
    async fn cancelled_request_stops() {
        let svc = service(store_with(LayoutSpec::press_default(), 1));
        let ctx = RequestContext::new(None);
        ctx.cancel.cancel();
        let err = svc.render(&GazetteId::new("g-1"), &ctx).await.unwrap_err();
        assert!(matches!(err.kind(), LayoutError::Cancelled));
    }
}
