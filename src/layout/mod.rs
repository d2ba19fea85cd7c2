//! # Block Layout
//!
//! Turns blocks into frames. Every block kind has its own layout function
//! and [`layout_block`] dispatches on the kind with an exhaustive match.
//!
//! ## Coordinates
//!
//! Layout works top-left, y down, in points. A frame's `x`/`y` are relative
//! to its parent frame's origin; the render objects on a frame are relative
//! to the frame itself. Only the renderer converts to page coordinates.
//!
//! ## Splitting
//!
//! Layout never slices a finished canvas. Each call receives the space that
//! is actually left on the page and returns the frame that fits plus an
//! optional remainder block describing what must continue on the next page.
//! Text splits between rows, rows blocks split between children; images,
//! columns and empty blocks are placed whole.

pub mod columns;
pub mod page_break;
pub mod pages;
pub mod rows;

use crate::error::Result;
use crate::font::FontStore;
use crate::geometry::{subtract_edges, Edges, Rect, Size};
use crate::image_loader::{Image, ImageStore};
use crate::model::shapes::Shape;
use crate::model::{Block, BlockAttrs, BlockKind, BreakPolicy, GraphicsInfo, TextSpan, Width};
use crate::style::{Color, TextAlign, TextAttrs};
use crate::svg::{parse_svg_path, to_segments};
use crate::text::{self, TextRow};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// A positioned box in the output tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<RenderObject>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Frame>,
}

impl Frame {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    fn shift(&mut self, dx: f64, dy: f64) {
        self.x += dx;
        self.y += dy;
    }
}

/// Something drawn on a frame. Coordinates are relative to the frame origin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RenderObject {
    /// Rows of text, each row relative to `(x, y)`.
    Text { x: f64, y: f64, rows: Vec<TextRow> },
    Link {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        url: String,
    },
    /// A named destination other content can link to.
    Anchor { name: String, x: f64, y: f64 },
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(serialize_with = "serialize_image")]
        image: Arc<Image>,
    },
    Graphics { shapes: Vec<Shape> },
}

fn serialize_image<S: Serializer>(image: &Arc<Image>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&image.name)
}

impl RenderObject {
    fn shift(&mut self, dx: f64, dy: f64) {
        match self {
            RenderObject::Text { x, y, .. }
            | RenderObject::Link { x, y, .. }
            | RenderObject::Anchor { x, y, .. }
            | RenderObject::Image { x, y, .. } => {
                *x += dx;
                *y += dy;
            }
            RenderObject::Graphics { .. } => {}
        }
    }
}

/// One laid-out page. `content`, `header` and `footer` are positioned on
/// the page itself.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub size: Size,
    pub content: Frame,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Frame>,
}

impl Page {
    /// Dump the frame tree for inspection tools.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Everything a layout call needs besides the block itself.
#[derive(Debug, Clone, Copy)]
pub struct LayoutContext<'a> {
    pub fonts: &'a FontStore,
    pub images: &'a ImageStore,
    /// Draw frame and padding outlines on every block.
    pub guides: bool,
}

#[derive(Debug, Clone)]
pub struct LayoutResult {
    pub frame: Frame,
    /// What did not fit and continues on the next page.
    pub remainder: Option<Block>,
}

/// Laid-out content of one block, relative to the block's frame origin.
#[derive(Debug, Default)]
struct Content {
    width: f64,
    height: f64,
    objects: Vec<RenderObject>,
    children: Vec<Frame>,
    remainder: Option<BlockKind>,
}

/// Lay out `block` inside `bounds`. `bounds` includes the block's margin;
/// the returned frame sits inside it.
pub fn layout_block(
    block: &Block,
    bounds: &Rect,
    ctx: &LayoutContext,
    inherited: &TextAttrs,
) -> Result<LayoutResult> {
    let attrs = &block.attrs;
    let text_attrs = attrs.text.inherit(inherited);
    let outer = subtract_edges(bounds, &attrs.margin);
    let frame_box = Rect::new(
        0.0,
        0.0,
        match attrs.width {
            Width::Fixed(w) => w,
            Width::Fill | Width::Auto => outer.width,
        },
        attrs.height.unwrap_or(outer.height),
    );
    let content_box = subtract_edges(&frame_box, &attrs.padding);

    let mut content = match &block.kind {
        BlockKind::Text { text } => layout_text(text, &content_box, attrs, &text_attrs, ctx)?,
        BlockKind::Image { image, image_align } => {
            layout_image(image, image_align.unwrap_or_default(), &content_box, attrs, ctx)?
        }
        BlockKind::Columns { columns } => {
            let laid = columns::layout_columns(columns, &content_box, ctx, &text_attrs)?;
            Content {
                width: laid.width,
                height: laid.height,
                children: laid.children,
                ..Default::default()
            }
        }
        BlockKind::Rows {
            rows,
            insert_after_break,
        } => {
            let laid = rows::layout_rows_content(rows, &content_box, ctx, &text_attrs)?;
            let remainder = laid.remainder.map(|mut rest| {
                if let Some(insert) = insert_after_break {
                    // The repeated block must share its page with the next row,
                    // or every continuation would hold only the repeat.
                    let mut repeated = insert.produce();
                    repeated.attrs.break_after = BreakPolicy::Avoid;
                    if let Some(next) = rest.first_mut() {
                        if next.attrs.break_before == BreakPolicy::Always {
                            next.attrs.break_before = BreakPolicy::Auto;
                        }
                    }
                    rest.insert(0, repeated);
                }
                BlockKind::Rows {
                    rows: rest,
                    insert_after_break: insert_after_break.clone(),
                }
            });
            Content {
                width: laid.width,
                height: laid.height,
                children: laid.children,
                remainder,
                ..Default::default()
            }
        }
        BlockKind::Empty => Content::default(),
    };

    let padding = attrs.padding;
    let width = match attrs.width {
        Width::Fixed(w) => w,
        Width::Fill => outer.width,
        Width::Auto => (content.width + padding.horizontal()).min(outer.width),
    };
    let height = attrs
        .height
        .unwrap_or(content.height + padding.vertical());

    if attrs.height.is_some() {
        let free = (height - padding.vertical() - content.height).max(0.0);
        let dy = free * attrs.vertical_align.unwrap_or_default().offset_factor();
        if dy > 0.0 {
            content.objects.iter_mut().for_each(|o| o.shift(0.0, dy));
            content.children.iter_mut().for_each(|c| c.shift(0.0, dy));
        }
    }

    let mut objects = Vec::with_capacity(content.objects.len() + 3);
    if let Some(generator) = &attrs.graphics {
        let shapes = generator.generate(&GraphicsInfo {
            width,
            height,
            padding,
        });
        check_shapes(&shapes)?;
        objects.push(RenderObject::Graphics { shapes });
    }
    if let Some(id) = &attrs.id {
        objects.push(RenderObject::Anchor {
            name: id.clone(),
            x: 0.0,
            y: 0.0,
        });
    }
    objects.append(&mut content.objects);
    if ctx.guides {
        objects.push(RenderObject::Graphics {
            shapes: guide_shapes(width, height, &padding),
        });
    }

    Ok(LayoutResult {
        frame: Frame {
            x: outer.x,
            y: outer.y,
            width,
            height,
            objects,
            children: content.children,
        },
        remainder: content.remainder.map(|kind| Block {
            kind,
            attrs: continuation_attrs(attrs),
        }),
    })
}

/// Attributes for the part of a block that continues on the next page.
/// The anchor stays with the first part.
fn continuation_attrs(attrs: &BlockAttrs) -> BlockAttrs {
    BlockAttrs {
        id: None,
        break_before: BreakPolicy::Auto,
        ..attrs.clone()
    }
}

fn layout_text(
    spans: &[TextSpan],
    content_box: &Rect,
    attrs: &BlockAttrs,
    text_attrs: &TextAttrs,
    ctx: &LayoutContext,
) -> Result<Content> {
    let mut flow = text::flow_text(
        spans,
        text_attrs,
        ctx.fonts,
        content_box.width,
        content_box.height,
    )?;
    let align_width = match attrs.width {
        Width::Auto => flow.width,
        Width::Fill | Width::Fixed(_) => content_box.width,
    };
    text::align_rows(&mut flow, text_attrs.text_align(), align_width);

    let (ox, oy) = (content_box.x, content_box.y);
    let mut objects = vec![RenderObject::Text {
        x: ox,
        y: oy,
        rows: flow.rows,
    }];
    objects.extend(flow.links.into_iter().map(|link| RenderObject::Link {
        x: ox + link.rect.x,
        y: oy + link.rect.y,
        width: link.rect.width,
        height: link.rect.height,
        url: link.url,
    }));

    Ok(Content {
        width: flow.width,
        height: flow.height,
        objects,
        children: Vec::new(),
        remainder: flow.remainder.map(|text| BlockKind::Text { text }),
    })
}

fn layout_image(
    name: &str,
    align: TextAlign,
    content_box: &Rect,
    attrs: &BlockAttrs,
    ctx: &LayoutContext,
) -> Result<Content> {
    let image = ctx.images.select_image(name)?;
    let intrinsic_w = image.width_px.max(1) as f64;
    let intrinsic_h = image.height_px.max(1) as f64;

    let x_scale = match attrs.width {
        Width::Fixed(_) => Some(content_box.width / intrinsic_w),
        Width::Fill | Width::Auto => None,
    };
    let y_scale = attrs.height.map(|_| content_box.height / intrinsic_h);
    let scale = match (x_scale, y_scale) {
        (Some(x), Some(y)) => x.min(y),
        (Some(x), None) => x,
        (None, Some(y)) => y,
        (None, None) => (content_box.width / intrinsic_w).min(1.0),
    };
    let (w, h) = (intrinsic_w * scale, intrinsic_h * scale);

    let align_width = match attrs.width {
        Width::Auto => w,
        Width::Fill | Width::Fixed(_) => content_box.width,
    };
    let x = content_box.x + (align_width - w).max(0.0) * align.offset_factor();

    Ok(Content {
        width: w,
        height: h,
        objects: vec![RenderObject::Image {
            x,
            y: content_box.y,
            width: w,
            height: h,
            image,
        }],
        children: Vec::new(),
        remainder: None,
    })
}

/// Path data in generated graphics must parse before anything is drawn.
fn check_shapes(shapes: &[Shape]) -> Result<()> {
    for shape in shapes {
        if let Shape::Path { d, .. } = shape {
            to_segments(&parse_svg_path(d)?)?;
        }
    }
    Ok(())
}

fn guide_shapes(width: f64, height: f64, padding: &Edges) -> Vec<Shape> {
    let frame = Shape::rect(0.0, 0.0, width, height)
        .with_stroke(Color::rgb(1.0, 0.0, 0.0), 0.25);
    let inner = subtract_edges(&Rect::new(0.0, 0.0, width, height), padding);
    let content = Shape::rect(inner.x, inner.y, inner.width, inner.height)
        .with_stroke(Color::rgb(0.0, 0.0, 1.0), 0.25)
        .with_dash(vec![2.0, 2.0]);
    vec![frame, content]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::font::FontRegistry;
    use crate::model::InsertAfterBreak;
    use crate::resource::InMemoryLoader;
    use crate::style::VerticalAlign;

    pub(crate) struct Stores {
        pub fonts: FontStore,
        pub images: ImageStore,
    }

    impl Stores {
        pub fn new() -> Self {
            Self::with_loader(InMemoryLoader::new())
        }

        pub fn with_loader(loader: InMemoryLoader) -> Self {
            let loader = Arc::new(loader);
            Stores {
                fonts: FontStore::new(&[], Arc::new(FontRegistry::new(loader.clone()))),
                images: ImageStore::new(loader),
            }
        }

        pub fn ctx(&self) -> LayoutContext<'_> {
            LayoutContext {
                fonts: &self.fonts,
                images: &self.images,
                guides: false,
            }
        }
    }

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 20, 30, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(encoder, img.as_raw(), width, height, image::ColorType::Rgba8)
            .unwrap();
        buf
    }

    fn layout(block: &Block, stores: &Stores, bounds: Rect) -> LayoutResult {
        layout_block(block, &bounds, &stores.ctx(), &TextAttrs::default()).unwrap()
    }

    fn image_frame(result: &LayoutResult) -> (f64, f64, f64) {
        match &result.frame.objects[0] {
            RenderObject::Image { x, width, height, .. } => (*x, *width, *height),
            other => panic!("expected image, got {:?}", other),
        }
    }

    #[test]
    fn test_margin_and_padding() {
        let stores = Stores::new();
        let block = Block::empty()
            .with_margin(Edges::uniform(10.0))
            .with_padding(Edges::uniform(5.0));
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 200.0, 300.0));
        let frame = &result.frame;
        assert_eq!((frame.x, frame.y), (10.0, 10.0));
        assert_eq!(frame.width, 180.0);
        assert_eq!(frame.height, 10.0);
        assert!(result.remainder.is_none());
    }

    #[test]
    fn test_auto_width_text_shrinks() {
        let stores = Stores::new();
        let block = Block::paragraph("Hi").with_width(Width::Auto);
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 400.0, 300.0));
        assert!(result.frame.width < 50.0);
        assert!(result.frame.width > 0.0);
    }

    #[test]
    fn test_fixed_height_vertical_align() {
        let stores = Stores::new();
        let mut block = Block::paragraph("x").with_height(100.0);
        block.attrs.vertical_align = Some(VerticalAlign::Bottom);
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 400.0, 300.0));
        match &result.frame.objects[0] {
            RenderObject::Text { y, rows, .. } => {
                assert!((y + rows[0].height - 100.0).abs() < 1e-9);
            }
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_anchor_and_graphics_order() {
        let stores = Stores::new();
        let block = Block::paragraph("x")
            .with_id("top")
            .with_graphics(|info| vec![Shape::rect(0.0, 0.0, info.width, info.height)]);
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 100.0, 100.0));
        let objects = &result.frame.objects;
        assert!(matches!(objects[0], RenderObject::Graphics { .. }));
        assert!(matches!(&objects[1], RenderObject::Anchor { name, .. } if name == "top"));
        assert!(matches!(objects[2], RenderObject::Text { .. }));
    }

    #[test]
    fn test_graphics_receive_final_size() {
        let stores = Stores::new();
        let block = Block::empty()
            .with_height(40.0)
            .with_padding(Edges::uniform(3.0))
            .with_graphics(|info| vec![Shape::rect(0.0, 0.0, info.width, info.height)]);
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 120.0, 500.0));
        match &result.frame.objects[0] {
            RenderObject::Graphics { shapes } => {
                assert_eq!(shapes[0], Shape::rect(0.0, 0.0, 120.0, 40.0));
            }
            other => panic!("expected graphics, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_graphics_path_fails() {
        let stores = Stores::new();
        let block = Block::empty().with_graphics(|_| vec![Shape::path("M 0 0 L x")]);
        let err = layout_block(
            &block,
            &Rect::new(0.0, 0.0, 10.0, 10.0),
            &stores.ctx(),
            &TextAttrs::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn test_guides_appended() {
        let stores = Stores::new();
        let ctx = LayoutContext {
            guides: true,
            ..stores.ctx()
        };
        let result = layout_block(
            &Block::empty(),
            &Rect::new(0.0, 0.0, 10.0, 10.0),
            &ctx,
            &TextAttrs::default(),
        )
        .unwrap();
        assert!(matches!(
            result.frame.objects.last(),
            Some(RenderObject::Graphics { shapes }) if shapes.len() == 2
        ));
    }

    #[test]
    fn test_image_never_upscales() {
        let stores = Stores::with_loader(InMemoryLoader::new().with("small", png_bytes(50, 20)));
        let result = layout(&Block::image("small"), &stores, Rect::new(0.0, 0.0, 400.0, 400.0));
        assert_eq!(image_frame(&result), (0.0, 50.0, 20.0));
        assert_eq!(result.frame.height, 20.0);
    }

    #[test]
    fn test_image_scales_down_to_width() {
        let stores = Stores::with_loader(InMemoryLoader::new().with("wide", png_bytes(800, 200)));
        let result = layout(&Block::image("wide"), &stores, Rect::new(0.0, 0.0, 400.0, 400.0));
        assert_eq!(image_frame(&result), (0.0, 400.0, 100.0));
    }

    #[test]
    fn test_image_fit_contain_and_align() {
        let stores = Stores::with_loader(InMemoryLoader::new().with("sq", png_bytes(100, 100)));
        let mut block = Block::image("sq")
            .with_width(Width::Fixed(200.0))
            .with_height(50.0);
        if let BlockKind::Image { image_align, .. } = &mut block.kind {
            *image_align = Some(TextAlign::Center);
        }
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 400.0, 400.0));
        assert_eq!(image_frame(&result), (75.0, 50.0, 50.0));
    }

    #[test]
    fn test_image_height_only() {
        let stores = Stores::with_loader(InMemoryLoader::new().with("tall", png_bytes(20, 40)));
        let block = Block::image("tall").with_height(80.0);
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 400.0, 400.0));
        assert_eq!(image_frame(&result), (0.0, 40.0, 80.0));
    }

    #[test]
    fn test_missing_image_fails() {
        let stores = Stores::new();
        let err = layout_block(
            &Block::image("nope"),
            &Rect::new(0.0, 0.0, 10.0, 10.0),
            &stores.ctx(),
            &TextAttrs::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "could not load image 'nope'");
    }

    #[test]
    fn test_text_remainder_drops_anchor() {
        let stores = Stores::new();
        let block = Block::paragraph("one two three four five six").with_id("p");
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 30.0, 20.0));
        let rest = result.remainder.expect("text should continue");
        assert!(rest.attrs.id.is_none());
        assert!(matches!(rest.kind, BlockKind::Text { .. }));
    }

    #[test]
    fn test_rows_remainder_gets_insert_after_break() {
        let stores = Stores::new();
        let rows: Vec<Block> = (0..4).map(|_| Block::empty().with_height(30.0)).collect();
        let header = Block::empty().with_height(5.0).with_id("hdr");
        let block = Block::rows(rows)
            .with_insert_after_break(InsertAfterBreak::Block(Box::new(header)));
        let result = layout(&block, &stores, Rect::new(0.0, 0.0, 100.0, 70.0));
        assert_eq!(result.frame.children.len(), 2);
        match result.remainder.map(|b| b.kind) {
            Some(BlockKind::Rows { rows, .. }) => {
                assert_eq!(rows.len(), 3);
                assert_eq!(rows[0].attrs.id.as_deref(), Some("hdr"));
            }
            other => panic!("expected rows remainder, got {:?}", other),
        }
    }

    #[test]
    fn test_page_json_dump() {
        let page = Page {
            size: Size::new(100.0, 200.0),
            content: Frame {
                width: 10.0,
                ..Default::default()
            },
            header: None,
            footer: None,
        };
        let json = page.to_json().unwrap();
        assert!(json.contains("\"content\""));
        assert!(!json.contains("header"));
    }
}
