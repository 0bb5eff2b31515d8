//! Gazette store port plus two read-only adapters.
//!
//! The store is the only stage that performs external I/O. It is read once
//! per request and never written to.
//!
//! Manifest format (JSON):
//!
//! ```json
//! {
//!   "gazettes": [
//!     { "id": "g-1", "content_ids": ["c-1"],
//!       "layout": { "paper_size": "A4", "color_space": "CMYK",
//!                   "resolution": 300, "bleed_mm": 3.0 } }
//!   ],
//!   "content": [
//!     { "id": "c-1", "kind": "photo", "width": 640, "height": 480,
//!       "data": "<base64 PNG or JPEG>" }
//!   ]
//! }
//! ```
//!
//! `width`/`height` may be omitted; they are then read from the image header.

use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{ContentId, ContentItem, Gazette, GazetteId, MediaKind};

pub trait GazetteStore: Send + Sync {
    /// `Ok(None)` when no gazette has this id.
    fn find_by_id(
        &self,
        id: &GazetteId,
    ) -> impl Future<Output = Result<Option<Gazette>, StoreError>> + Send;

    /// Items for `ids`, in the same order.
    fn fetch_content(
        &self,
        ids: &[ContentId],
    ) -> impl Future<Output = Result<Vec<ContentItem>, StoreError>> + Send;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub gazettes: Vec<Gazette>,
    #[serde(default)]
    pub content: Vec<ContentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    #[serde(default)]
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Base64-encoded image file.
    pub data: String,
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Manifest(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

impl ContentRecord {
    pub fn from_item(item: &ContentItem) -> Self {
        Self {
            id: item.id.clone(),
            kind: item.kind,
            width: Some(item.width),
            height: Some(item.height),
            data: BASE64_STD.encode(&item.data),
        }
    }

    pub fn into_item(self) -> Result<ContentItem, StoreError> {
        let data = BASE64_STD
            .decode(self.data.trim())
            .map_err(|e| StoreError::Manifest(format!("content {}: base64: {e}", self.id)))?;

        let (width, height) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            _ => natural_dimensions(&data)
                .map_err(|e| StoreError::Manifest(format!("content {}: {e}", self.id)))?,
        };

        Ok(ContentItem {
            id: self.id,
            kind: self.kind,
            data: data.into(),
            width,
            height,
        })
    }
}

/// Read pixel dimensions from an image header without decoding pixels.
fn natural_dimensions(bytes: &[u8]) -> Result<(u32, u32), String> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())?
        .into_dimensions()
        .map_err(|e| e.to_string())
}

/// Store backed by maps, filled up front.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    gazettes: HashMap<GazetteId, Gazette>,
    content: HashMap<ContentId, ContentItem>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_gazette(&mut self, gazette: Gazette) {
        self.gazettes.insert(gazette.id.clone(), gazette);
    }

    pub fn insert_content(&mut self, item: ContentItem) {
        self.content.insert(item.id.clone(), item);
    }

    pub fn from_manifest(manifest: Manifest) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for gazette in manifest.gazettes {
            store.insert_gazette(gazette);
        }
        for record in manifest.content {
            store.insert_content(record.into_item()?);
        }
        Ok(store)
    }

    pub fn from_json(json: &[u8]) -> Result<Self, StoreError> {
        Self::from_manifest(Manifest::from_slice(json)?)
    }

    fn get_gazette(&self, id: &GazetteId) -> Option<Gazette> {
        self.gazettes.get(id).cloned()
    }

    fn get_content(&self, ids: &[ContentId]) -> Result<Vec<ContentItem>, StoreError> {
        ids.iter()
            .map(|id| {
                self.content
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::MissingContent(id.clone()))
            })
            .collect()
    }
}

impl GazetteStore for InMemoryStore {
    async fn find_by_id(&self, id: &GazetteId) -> Result<Option<Gazette>, StoreError> {
        Ok(self.get_gazette(id))
    }

    async fn fetch_content(&self, ids: &[ContentId]) -> Result<Vec<ContentItem>, StoreError> {
        self.get_content(ids)
    }
}

/// Store that reads a manifest file on every call.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Manifest, StoreError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Manifest::from_slice(&bytes)
    }
}

impl GazetteStore for JsonFileStore {
    async fn find_by_id(&self, id: &GazetteId) -> Result<Option<Gazette>, StoreError> {
        let manifest = self.load().await?;
        Ok(manifest.gazettes.into_iter().find(|g| &g.id == id))
    }

    async fn fetch_content(&self, ids: &[ContentId]) -> Result<Vec<ContentItem>, StoreError> {
        let manifest = self.load().await?;
        let records: HashMap<ContentId, ContentRecord> = manifest
            .content
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            // A gazette may reference the same item twice.
            let record = match records.get(id) {
                Some(r) => r.clone(),
                None => return Err(StoreError::MissingContent(id.clone())),
            };
            items.push(record.into_item()?);
        }
        Ok(items)
    }
}
