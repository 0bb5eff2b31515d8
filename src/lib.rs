//! # gazette-press – print-production layout engine for gazettes
//!
//! Turns a gazette record and its content images into a print-ready PDF.
//! A request runs through these stages:
//!
//! 1. **Fetch** – gazette and content from a [`store::GazetteStore`]
//! 2. **Validate** – page size, colour space, resolution and bleed ([`validation`])
//! 3. **Optimize** – resample to the press resolution and encode CMYK JPEG ([`optimizer`])
//! 4. **Place** – safe-zone rects, wrapping onto extra pages ([`placement`])
//! 5. **Compose** – draw assets and crop marks through a [`writer::DocumentWriter`] ([`composer`])
//!
//! [`pipeline::LayoutService`] drives the stages. The codec, writer and store
//! are traits so hosts and tests can substitute their own; [`codec::RasterCodec`],
//! [`render::PdfWriter`] and [`store::JsonFileStore`] are the production
//! implementations.
//!
//! A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod codec;
pub mod composer;
pub mod config;
pub mod error;
pub mod ffi;
pub mod geometry;
pub mod model;
pub mod optimizer;
pub mod pipeline;
pub mod placement;
pub mod render;
pub mod store;
pub mod validation;
pub mod writer;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{GenerationError, LayoutError};
pub use model::{ColorSpace, Gazette, GazetteId, LayoutSpec, PaperSize};
pub use pipeline::{LayoutService, RenderedDocument, RequestContext};
