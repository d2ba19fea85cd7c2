//! # Document Model
//!
//! The input representation for the engine. A definition reader hands over a
//! validated [`Document`]: global page settings plus a tree of [`Block`]s.
//! Blocks are a closed set of kinds (text, image, columns, rows, empty) that
//! all share one set of layout attributes.
//!
//! Blocks are read-only once built. Pagination never mutates the input tree;
//! content that spills onto the next page is described by new remainder
//! blocks instead.
//!
//! Everything here deserializes from JSON. Closures (graphics generators,
//! page-dependent headers, insert-after-break factories) can only be attached
//! in code.

pub mod shapes;

use crate::font::FontDef;
use crate::geometry::{deserialize_edges, deserialize_length, Edges, LengthInput, Size};
use crate::style::{TextAlign, TextAttrs, VerticalAlign};
use serde::{Deserialize, Deserializer, Serialize};
use shapes::Shape;
use std::fmt;
use std::sync::Arc;

/// A complete document ready for layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Top-level content, laid out top to bottom and paginated.
    #[serde(default)]
    pub content: Vec<Block>,

    /// Block repeated at the top of every page.
    #[serde(default)]
    pub header: Option<PageBlock>,

    /// Block repeated at the bottom of every page.
    #[serde(default)]
    pub footer: Option<PageBlock>,

    #[serde(default)]
    pub page_size: PageSize,

    #[serde(default)]
    pub page_orientation: Orientation,

    /// Page margins. Content is laid out inside the page box inset by these.
    #[serde(default = "default_margin", deserialize_with = "deserialize_edges")]
    pub margin: Edges,

    /// Text attributes every block inherits from.
    #[serde(default)]
    pub default_style: TextAttrs,

    /// Draw debug outlines around every frame and its content box.
    #[serde(default)]
    pub guides: bool,

    /// Font definitions. The built-in standard fonts are always available
    /// after these.
    #[serde(default)]
    pub fonts: Vec<FontDef>,

    #[serde(default)]
    pub info: Metadata,
}

fn default_margin() -> Edges {
    Edges::uniform(40.0)
}

impl Default for Document {
    fn default() -> Self {
        Self {
            content: Vec::new(),
            header: None,
            footer: None,
            page_size: PageSize::default(),
            page_orientation: Orientation::default(),
            margin: default_margin(),
            default_style: TextAttrs::default(),
            guides: false,
            fonts: Vec::new(),
            info: Metadata::default(),
        }
    }
}

impl Document {
    pub fn new(content: Vec<Block>) -> Self {
        Self {
            content,
            ..Default::default()
        }
    }

    /// Page dimensions in points after applying the orientation.
    pub fn page_dimensions(&self) -> Size {
        self.page_size.dimensions(self.page_orientation)
    }
}

/// Document metadata handed to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// Creation timestamp, already formatted by the host (e.g. `D:20240101120000Z`).
    /// Left unset, no date is written, which keeps output reproducible.
    pub creation_date: Option<String>,
}

/// Standard page sizes in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom {
        width: f64,
        height: f64,
    },
}

impl PageSize {
    pub fn dimensions(&self, orientation: Orientation) -> Size {
        let (w, h) = match self {
            PageSize::A4 => (595.28, 841.89),
            PageSize::A3 => (841.89, 1190.55),
            PageSize::A5 => (419.53, 595.28),
            PageSize::Letter => (612.0, 792.0),
            PageSize::Legal => (612.0, 1008.0),
            PageSize::Tabloid => (792.0, 1224.0),
            PageSize::Custom { width, height } => (*width, *height),
        };
        match orientation {
            Orientation::Portrait => Size::new(w.min(h), w.max(h)),
            Orientation::Landscape => Size::new(w.max(h), w.min(h)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Page-break hint for the boundary before, after or inside a block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakPolicy {
    #[default]
    Auto,
    Avoid,
    Always,
}

/// How a block's width is determined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub enum Width {
    /// Take all available width (or an even share of what is left, inside columns).
    #[default]
    Fill,
    /// Shrink to the intrinsic width of the content.
    Auto,
    /// A fixed width in points.
    Fixed(f64),
}

impl<'de> Deserialize<'de> for Width {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match LengthInput::deserialize(deserializer)? {
            LengthInput::Text(s) if s == "auto" => Ok(Width::Auto),
            other => crate::geometry::parse_length(&other)
                .map(Width::Fixed)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A node in the block tree: one kind plus the shared layout attributes.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    #[serde(default)]
    pub attrs: BlockAttrs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum BlockKind {
    /// Flowing text built from (possibly nested) spans.
    Text { text: Vec<TextSpan> },
    /// An image resource referenced by name.
    Image {
        image: String,
        #[serde(default, rename = "imageAlign")]
        image_align: Option<TextAlign>,
    },
    /// Children placed side by side.
    Columns { columns: Vec<Block> },
    /// Children stacked top to bottom. The only kind that continues onto the
    /// next page child by child.
    Rows {
        rows: Vec<Block>,
        /// Prepended to the remainder whenever the rows break across pages.
        #[serde(default, rename = "insertAfterBreak")]
        insert_after_break: Option<InsertAfterBreak>,
    },
    Empty,
}

/// Layout attributes shared by every block kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAttrs {
    #[serde(default, deserialize_with = "deserialize_edges")]
    pub padding: Edges,
    #[serde(default, deserialize_with = "deserialize_edges")]
    pub margin: Edges,
    #[serde(default)]
    pub width: Width,
    /// Fixed height in points, including padding.
    #[serde(default, deserialize_with = "deserialize_length")]
    pub height: Option<f64>,
    #[serde(default)]
    pub vertical_align: Option<VerticalAlign>,
    /// Anchor name other content can link to with `#id`.
    #[serde(default)]
    pub id: Option<String>,
    /// Generator for shapes drawn beneath the block's content.
    #[serde(skip)]
    pub graphics: Option<Graphics>,
    #[serde(default)]
    pub break_before: BreakPolicy,
    #[serde(default)]
    pub break_after: BreakPolicy,
    #[serde(default)]
    pub break_inside: BreakPolicy,
    /// Text attributes inherited by everything inside this block.
    #[serde(flatten)]
    pub text: TextAttrs,
}

impl Block {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            attrs: BlockAttrs::default(),
        }
    }

    pub fn text(spans: Vec<TextSpan>) -> Self {
        Self::new(BlockKind::Text { text: spans })
    }

    /// A text block with a single unstyled span.
    pub fn paragraph(text: &str) -> Self {
        Self::text(vec![TextSpan::plain(text)])
    }

    pub fn image(name: &str) -> Self {
        Self::new(BlockKind::Image {
            image: name.to_string(),
            image_align: None,
        })
    }

    pub fn columns(columns: Vec<Block>) -> Self {
        Self::new(BlockKind::Columns { columns })
    }

    pub fn rows(rows: Vec<Block>) -> Self {
        Self::new(BlockKind::Rows {
            rows,
            insert_after_break: None,
        })
    }

    pub fn empty() -> Self {
        Self::new(BlockKind::Empty)
    }

    pub fn with_padding(mut self, padding: Edges) -> Self {
        self.attrs.padding = padding;
        self
    }

    pub fn with_margin(mut self, margin: Edges) -> Self {
        self.attrs.margin = margin;
        self
    }

    pub fn with_width(mut self, width: Width) -> Self {
        self.attrs.width = width;
        self
    }

    pub fn with_height(mut self, height: f64) -> Self {
        self.attrs.height = Some(height);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.attrs.id = Some(id.to_string());
        self
    }

    pub fn with_text_attrs(mut self, text: TextAttrs) -> Self {
        self.attrs.text = text;
        self
    }

    pub fn with_graphics<F>(mut self, generator: F) -> Self
    where
        F: Fn(&GraphicsInfo) -> Vec<Shape> + Send + Sync + 'static,
    {
        self.attrs.graphics = Some(Graphics(Arc::new(generator)));
        self
    }

    /// Set the block to prepend on each page after the rows break. Only
    /// meaningful on rows blocks.
    pub fn with_insert_after_break(mut self, insert: InsertAfterBreak) -> Self {
        if let BlockKind::Rows {
            insert_after_break, ..
        } = &mut self.kind
        {
            *insert_after_break = Some(insert);
        }
        self
    }
}

/// Final geometry passed to a graphics generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphicsInfo {
    pub width: f64,
    pub height: f64,
    pub padding: Edges,
}

pub type GraphicsFn = dyn Fn(&GraphicsInfo) -> Vec<Shape> + Send + Sync;

#[derive(Clone)]
pub struct Graphics(pub Arc<GraphicsFn>);

impl Graphics {
    pub fn generate(&self, info: &GraphicsInfo) -> Vec<Shape> {
        (self.0)(info)
    }
}

impl fmt::Debug for Graphics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Graphics(..)")
    }
}

/// Content inserted at the top of each continuation of a rows block, e.g. a
/// repeated table header.
#[derive(Clone)]
pub enum InsertAfterBreak {
    Block(Box<Block>),
    Factory(Arc<dyn Fn() -> Block + Send + Sync>),
}

impl InsertAfterBreak {
    pub fn produce(&self) -> Block {
        match self {
            InsertAfterBreak::Block(block) => (**block).clone(),
            InsertAfterBreak::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for InsertAfterBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertAfterBreak::Block(block) => f.debug_tuple("Block").field(block).finish(),
            InsertAfterBreak::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for InsertAfterBreak {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Block::deserialize(deserializer).map(|b| InsertAfterBreak::Block(Box::new(b)))
    }
}

/// Page numbers handed to header and footer content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    /// 1-based.
    pub page_number: usize,
    pub page_count: usize,
    pub page_size: Size,
}

/// Header or footer content. Static blocks may contain `{{pageNumber}}` and
/// `{{pageCount}}` placeholders in their text.
#[derive(Clone)]
pub enum PageBlock {
    Static(Block),
    Dynamic(Arc<dyn Fn(&PageInfo) -> Block + Send + Sync>),
}

impl PageBlock {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&PageInfo) -> Block + Send + Sync + 'static,
    {
        PageBlock::Dynamic(Arc::new(f))
    }
}

impl fmt::Debug for PageBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageBlock::Static(block) => f.debug_tuple("Static").field(block).finish(),
            PageBlock::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for PageBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Block::deserialize(deserializer).map(PageBlock::Static)
    }
}

/// A run of text with its own attributes. Spans nest; attributes inherit
/// downward and the innermost value wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextSpan {
    pub text: SpanContent,
    #[serde(flatten)]
    pub attrs: TextAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpanContent {
    Text(String),
    Spans(Vec<TextSpan>),
}

impl TextSpan {
    pub fn plain(text: &str) -> Self {
        Self::styled(text, TextAttrs::default())
    }

    pub fn styled(text: &str, attrs: TextAttrs) -> Self {
        Self {
            text: SpanContent::Text(text.to_string()),
            attrs,
        }
    }

    pub fn nested(children: Vec<TextSpan>, attrs: TextAttrs) -> Self {
        Self {
            text: SpanContent::Spans(children),
            attrs,
        }
    }
}

impl<'de> Deserialize<'de> for TextSpan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Plain(String),
            Styled {
                text: SpanContent,
                #[serde(flatten)]
                attrs: TextAttrs,
            },
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Plain(text) => TextSpan::plain(&text),
            Raw::Styled { text, attrs } => TextSpan { text, attrs },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::FontWeight;

    #[test]
    fn test_deserialize_block_tree() {
        let json = r##"{
            "content": [
                {
                    "kind": {"type": "Rows", "rows": [
                        {"kind": {"type": "Text", "text": ["Hello ", {"text": "world", "fontWeight": "bold"}]},
                         "attrs": {"margin": {"y": 6}, "breakAfter": "avoid", "fontSize": 14}},
                        {"kind": {"type": "Empty"}, "attrs": {"height": "1in", "width": "auto"}}
                    ]},
                    "attrs": {"padding": 4, "id": "intro"}
                }
            ],
            "margin": "1cm",
            "pageSize": "Letter",
            "pageOrientation": "landscape"
        }"##;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.page_dimensions(), Size::new(792.0, 612.0));
        assert!((doc.margin.left - 72.0 / 2.54).abs() < 1e-9);

        let rows = &doc.content[0];
        assert_eq!(rows.attrs.padding, Edges::uniform(4.0));
        assert_eq!(rows.attrs.id.as_deref(), Some("intro"));
        let BlockKind::Rows { rows: children, .. } = &rows.kind else {
            panic!("expected rows, got {:?}", rows.kind);
        };
        assert_eq!(children.len(), 2);

        let text = &children[0];
        assert_eq!(text.attrs.margin.top, 6.0);
        assert_eq!(text.attrs.break_after, BreakPolicy::Avoid);
        assert_eq!(text.attrs.text.font_size, Some(14.0));
        let BlockKind::Text { text: spans } = &text.kind else {
            panic!("expected text");
        };
        assert_eq!(spans[0], TextSpan::plain("Hello "));
        assert_eq!(spans[1].attrs.font_weight, Some(FontWeight::BOLD));

        assert_eq!(children[1].attrs.height, Some(72.0));
        assert_eq!(children[1].attrs.width, Width::Auto);
    }

    #[test]
    fn test_default_document_settings() {
        let doc: Document = serde_json::from_str("{}").unwrap();
        assert!(doc.content.is_empty());
        assert_eq!(doc.margin, Edges::uniform(40.0));
        assert_eq!(doc.page_dimensions(), Size::new(595.28, 841.89));
        assert!(!doc.guides);
    }

    #[test]
    fn test_insert_after_break_factory() {
        let block = Block::rows(vec![]).with_insert_after_break(InsertAfterBreak::Factory(
            Arc::new(|| Block::paragraph("continued")),
        ));
        let BlockKind::Rows {
            insert_after_break: Some(insert),
            ..
        } = &block.kind
        else {
            panic!("insert not attached");
        };
        assert!(matches!(insert.produce().kind, BlockKind::Text { .. }));
    }
}
