//! # Quire
//!
//! A block-layout typesetting engine.
//!
//! A document is a tree of blocks: text, images, columns, rows and empty
//! boxes, each carrying margins, padding, sizing and break hints. Quire lays
//! the tree out into pages of positioned frames and then emits drawing
//! primitives for every frame to a page-writing [`Backend`].
//!
//! Layout is page-aware. Each block is laid out into the space actually left
//! on the current page and hands back whatever did not fit as a remainder
//! block for the next page, so nothing is ever sliced after the fact.
//!
//! ## Architecture
//!
//! ```text
//! Document (JSON/API)
//!       ↓
//!   [model]    Block tree, page settings, text spans
//!       ↓
//!   [font] [image_loader] [resource]   resolve and cache resources
//!       ↓
//!   [text]     segments, line breaking, alignment
//!   [layout]   blocks to frames, columns, rows, pagination
//!       ↓
//!   [render]   frames to drawing operators (y flipped here)
//!       ↓
//!   [pdf]      one Backend: serialize to PDF bytes
//! ```

pub mod error;
pub mod font;
pub mod geometry;
pub mod image_loader;
pub mod layout;
pub mod model;
pub mod pdf;
pub mod render;
pub mod resource;
pub mod style;
pub mod svg;
pub mod text;

pub use error::{QuireError, ResourceError, Result};
pub use layout::{Frame, Page, RenderObject};
pub use model::{Block, Document};
pub use render::backend::{Backend, Operator, RecordingBackend};

use font::{FontRegistry, FontStore};
use image_loader::ImageStore;
use layout::LayoutContext;
use pdf::PdfWriter;
use resource::ResourceLoader;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How long parsed fonts and decoded images are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheScope {
    /// Fresh caches for every layout call.
    #[default]
    PerCall,
    /// Caches live as long as the [`Engine`] and are shared by all calls.
    Shared,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub cache_scope: CacheScope,
}

/// Entry point. Holds the resource loader and, with
/// [`CacheScope::Shared`], the caches reused across calls.
pub struct Engine {
    loader: Arc<dyn ResourceLoader>,
    config: EngineConfig,
    shared: Option<SharedCaches>,
}

struct SharedCaches {
    registry: Arc<FontRegistry>,
    images: Arc<ImageStore>,
}

impl Engine {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self::with_config(loader, EngineConfig::default())
    }

    pub fn with_config(loader: Arc<dyn ResourceLoader>, config: EngineConfig) -> Self {
        let shared = match config.cache_scope {
            CacheScope::Shared => Some(SharedCaches {
                registry: Arc::new(FontRegistry::new(loader.clone())),
                images: Arc::new(ImageStore::new(loader.clone())),
            }),
            CacheScope::PerCall => None,
        };
        Self {
            loader,
            config,
            shared,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lay the document out into pages.
    pub fn layout(&self, doc: &Document) -> Result<Vec<Page>> {
        let (registry, images) = match &self.shared {
            Some(shared) => (shared.registry.clone(), shared.images.clone()),
            None => (
                Arc::new(FontRegistry::new(self.loader.clone())),
                Arc::new(ImageStore::new(self.loader.clone())),
            ),
        };
        let fonts = FontStore::new(&doc.fonts, registry);
        let ctx = LayoutContext {
            fonts: &fonts,
            images: &images,
            guides: doc.guides,
        };
        layout::pages::layout_pages(doc, &ctx)
    }

    /// Emit laid-out pages to `backend`.
    pub fn render<B: Backend + ?Sized>(
        &self,
        doc: &Document,
        pages: &[Page],
        backend: &mut B,
    ) -> Result<()> {
        render::render(doc, pages, backend)
    }

    /// Lay out and render straight to PDF bytes.
    pub fn render_pdf(&self, doc: &Document) -> Result<Vec<u8>> {
        let pages = self.layout(doc)?;
        let mut writer = PdfWriter::new();
        self.render(doc, &pages, &mut writer)?;
        Ok(writer.finish())
    }
}

/// Lay out `doc` with a one-off engine.
pub fn layout(doc: &Document, loader: Arc<dyn ResourceLoader>) -> Result<Vec<Page>> {
    Engine::new(loader).layout(doc)
}

/// Emit `pages` to `backend`.
pub fn render<B: Backend + ?Sized>(doc: &Document, pages: &[Page], backend: &mut B) -> Result<()> {
    render::render(doc, pages, backend)
}
