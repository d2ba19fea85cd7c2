//! Drawing primitives and the page-writer interface.
//!
//! A [`Backend`] receives pages, registered resources and a stream of
//! [`Operator`]s per page, all in the backend's bottom-left, y-up space.

use crate::error::Result;
use crate::font::Font;
use crate::geometry::{Rect, Size};
use crate::image_loader::Image;
use crate::model::shapes::{LineCap, LineJoin};
use crate::model::Metadata;
use crate::style::Color;
use crate::svg::Matrix;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRef(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontRef(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRef(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub enum LinkTarget {
    Uri(String),
    /// A named destination registered with [`Backend::add_destination`].
    Internal(String),
}

impl LinkTarget {
    /// `#name` links to an anchor; everything else is an external URI.
    pub fn parse(url: &str) -> LinkTarget {
        match url.strip_prefix('#') {
            Some(name) => LinkTarget::Internal(name.to_string()),
            None => LinkTarget::Uri(url.to_string()),
        }
    }
}

/// One drawing instruction, equivalent to a content stream operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operator {
    SaveState,
    RestoreState,
    Transform(Matrix),
    FillColor(Color),
    StrokeColor(Color),
    FillOpacity(f64),
    StrokeOpacity(f64),
    LineWidth(f64),
    LineCap(LineCap),
    LineJoin(LineJoin),
    LineDash(Vec<f64>),
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    Rect(f64, f64, f64, f64),
    ClosePath,
    Stroke,
    Fill,
    FillAndStroke,
    BeginText,
    EndText,
    SetFont(FontRef, f64),
    CharSpacing(f64),
    TextRise(f64),
    TextMatrix(Matrix),
    ShowText(String),
    /// Paint an image into the unit square of the current transform.
    DrawImage(ImageRef),
}

/// A page writer. One instance belongs to exactly one render call.
pub trait Backend {
    fn add_page(&mut self, size: Size) -> Result<PageRef>;
    /// Called once per distinct font.
    fn register_font(&mut self, font: &Arc<Font>) -> Result<FontRef>;
    /// Called once per distinct image.
    fn register_image(&mut self, image: &Arc<Image>) -> Result<ImageRef>;
    fn draw(&mut self, page: PageRef, op: Operator) -> Result<()>;
    fn add_link(&mut self, page: PageRef, rect: Rect, target: LinkTarget) -> Result<()>;
    fn add_destination(&mut self, name: &str, page: PageRef, x: f64, y: f64) -> Result<()>;
    fn set_metadata(&mut self, info: &Metadata) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct RecordedPage {
    pub size: Size,
    pub ops: Vec<Operator>,
    pub links: Vec<(Rect, LinkTarget)>,
}

/// A backend that keeps every call for inspection.
#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub pages: Vec<RecordedPage>,
    /// Font keys in registration order.
    pub fonts: Vec<String>,
    /// Image names in registration order.
    pub images: Vec<String>,
    pub destinations: Vec<(String, PageRef, f64, f64)>,
    pub metadata: Option<Metadata>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn page_mut(&mut self, page: PageRef) -> Result<&mut RecordedPage> {
        self.pages
            .get_mut(page.0)
            .ok_or_else(|| crate::error::QuireError::Render(format!("unknown page {}", page.0)))
    }
}

impl Backend for RecordingBackend {
    fn add_page(&mut self, size: Size) -> Result<PageRef> {
        self.pages.push(RecordedPage {
            size,
            ops: Vec::new(),
            links: Vec::new(),
        });
        Ok(PageRef(self.pages.len() - 1))
    }

    fn register_font(&mut self, font: &Arc<Font>) -> Result<FontRef> {
        self.fonts.push(font.key());
        Ok(FontRef(self.fonts.len() - 1))
    }

    fn register_image(&mut self, image: &Arc<Image>) -> Result<ImageRef> {
        self.images.push(image.name.clone());
        Ok(ImageRef(self.images.len() - 1))
    }

    fn draw(&mut self, page: PageRef, op: Operator) -> Result<()> {
        self.page_mut(page)?.ops.push(op);
        Ok(())
    }

    fn add_link(&mut self, page: PageRef, rect: Rect, target: LinkTarget) -> Result<()> {
        self.page_mut(page)?.links.push((rect, target));
        Ok(())
    }

    fn add_destination(&mut self, name: &str, page: PageRef, x: f64, y: f64) -> Result<()> {
        self.destinations.push((name.to_string(), page, x, y));
        Ok(())
    }

    fn set_metadata(&mut self, info: &Metadata) -> Result<()> {
        self.metadata = Some(info.clone());
        Ok(())
    }
}
