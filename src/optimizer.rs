//! Turns raw content images into print-grade assets.
//!
//! Each item is scaled from the 72 DPI reference grid to the layout
//! resolution, converted to CMYK and encoded as a maximum-quality JPEG. Items
//! are independent, so the batch fans out over a bounded set of blocking
//! workers; results are slotted back by input index before returning.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};

use crate::codec::ImageCodec;
use crate::error::{AssetEncodingError, CodecError};
use crate::geometry::REFERENCE_DPI;
use crate::model::{ContentItem, EncodeSettings, OptimizedAsset};

/// `round(source × resolution / 72)` on both axes.
pub fn target_dimensions(width: u32, height: u32, resolution: u32) -> (u32, u32) {
    let scale = resolution as f64 / REFERENCE_DPI;
    (
        (width as f64 * scale).round() as u32,
        (height as f64 * scale).round() as u32,
    )
}

pub struct ImageOptimizer<C> {
    codec: Arc<C>,
    workers: usize,
    settings: EncodeSettings,
}

impl<C> ImageOptimizer<C>
where
    C: ImageCodec + 'static,
{
    pub fn new(codec: Arc<C>, workers: usize) -> Self {
        Self {
            codec,
            workers: workers.max(1),
            settings: EncodeSettings::PRESS_MASTER,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Optimize a single item on the calling thread.
    pub fn optimize_item(
        &self,
        item: &ContentItem,
        resolution: u32,
    ) -> Result<OptimizedAsset, AssetEncodingError> {
        optimize_with(self.codec.as_ref(), item, resolution, &self.settings)
    }

    /// Optimize every item, one output per input, in input order. The first
    /// failure aborts the batch; outstanding workers are dropped.
    pub async fn optimize(
        &self,
        items: &[ContentItem],
        resolution: u32,
    ) -> Result<Vec<OptimizedAsset>, AssetEncodingError> {
        let mut slots: Vec<Option<OptimizedAsset>> = vec![None; items.len()];
        let mut pending = items.iter().enumerate();
        let mut tasks: JoinSet<(usize, Result<OptimizedAsset, AssetEncodingError>)> =
            JoinSet::new();

        loop {
            while tasks.len() < self.workers {
                let Some((index, item)) = pending.next() else {
                    break;
                };
                let codec = Arc::clone(&self.codec);
                let item = item.clone();
                let settings = self.settings;
                tasks.spawn_blocking(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        optimize_with(codec.as_ref(), &item, resolution, &settings)
                    }))
                    .unwrap_or_else(|_| {
                        Err(AssetEncodingError {
                            item_id: item.id.clone(),
                            source: CodecError::WorkerFailed,
                        })
                    });
                    (index, outcome)
                });
            }

            match tasks.join_next().await {
                Some(joined) => settle(joined, items, &mut slots)?,
                None => break,
            }
        }

        log::debug!("optimized {} assets at {resolution} DPI", items.len());

        slots
            .into_iter()
            .zip(items)
            .map(|(slot, item)| {
                slot.ok_or_else(|| AssetEncodingError {
                    item_id: item.id.clone(),
                    source: CodecError::WorkerFailed,
                })
            })
            .collect()
    }
}

fn settle(
    joined: Result<(usize, Result<OptimizedAsset, AssetEncodingError>), JoinError>,
    items: &[ContentItem],
    slots: &mut [Option<OptimizedAsset>],
) -> Result<(), AssetEncodingError> {
    match joined {
        Ok((index, Ok(asset))) => {
            slots[index] = Some(asset);
            Ok(())
        }
        Ok((_, Err(e))) => {
            log::warn!("{e}");
            Err(e)
        }
        Err(join_err) => {
            // Panics are caught inside the worker, so this is a runtime
            // shutdown. Blame the first item that never finished.
            let item_id = slots
                .iter()
                .zip(items)
                .find(|(slot, _)| slot.is_none())
                .map(|(_, item)| item.id.clone())
                .unwrap_or_else(|| items[0].id.clone());
            log::warn!("optimize worker lost: {join_err}");
            Err(AssetEncodingError {
                item_id,
                source: CodecError::WorkerFailed,
            })
        }
    }
}

fn optimize_with<C>(
    codec: &C,
    item: &ContentItem,
    resolution: u32,
    settings: &EncodeSettings,
) -> Result<OptimizedAsset, AssetEncodingError>
where
    C: ImageCodec + ?Sized,
{
    let fail = |source: CodecError| AssetEncodingError {
        item_id: item.id.clone(),
        source,
    };

    let (target_width, target_height) = target_dimensions(item.width, item.height, resolution);
    let limit = codec.max_dimension();
    if target_width == 0 || target_height == 0 || target_width > limit || target_height > limit {
        return Err(fail(CodecError::InvalidDimensions {
            width: target_width,
            height: target_height,
        }));
    }

    let raster = codec.decode(&item.data).map_err(fail)?;
    let raster = codec
        .resize_to_fit(raster, target_width, target_height)
        .map_err(fail)?;
    let raster = codec
        .set_color_space(raster, settings.color_space)
        .map_err(fail)?;
    let (pixel_width, pixel_height) = codec.dimensions(&raster);
    let data = codec.encode(&raster, settings).map_err(fail)?;

    log::trace!(
        "{}: {}x{} -> {pixel_width}x{pixel_height} ({} bytes)",
        item.id,
        item.width,
        item.height,
        data.len()
    );

    Ok(OptimizedAsset {
        item_id: item.id.clone(),
        data,
        target_width,
        target_height,
        pixel_width,
        pixel_height,
        settings: *settings,
    })
}
