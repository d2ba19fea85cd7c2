//! # Rendering
//!
//! Walks the laid-out pages and emits drawing primitives to a [`Backend`].
//!
//! Layout coordinates are top-left, y down; backends are bottom-left, y up.
//! Every point is flipped with `y_pdf = page_height - y` on the way out.
//! Shapes are the exception: they are emitted in frame coordinates under a
//! transform that performs the flip, so their own transforms compose in the
//! space they were authored in.

pub mod backend;

use crate::error::Result;
use crate::font::Font;
use crate::geometry::Rect;
use crate::image_loader::Image;
use crate::layout::{Frame, Page, RenderObject};
use crate::model::shapes::Shape;
use crate::model::Document;
use crate::style::Color;
use crate::svg::{ellipse_segments, parse_svg_path, to_segments, Matrix, PathSegment};
use crate::text::TextRow;
use backend::{Backend, FontRef, ImageRef, LinkTarget, Operator, PageRef};
use std::collections::HashMap;
use std::sync::Arc;

/// Emit `pages` to `backend`. Metadata goes first, then each page in order.
pub fn render<B: Backend + ?Sized>(doc: &Document, pages: &[Page], backend: &mut B) -> Result<()> {
    backend.set_metadata(&doc.info)?;
    let mut renderer = Renderer {
        backend,
        fonts: HashMap::new(),
        images: HashMap::new(),
        text: TextState::default(),
    };
    for page in pages {
        renderer.render_page(page)?;
    }
    log::debug!(
        "rendered {} pages, {} fonts, {} images",
        pages.len(),
        renderer.fonts.len(),
        renderer.images.len()
    );
    Ok(())
}

struct Renderer<'b, B: Backend + ?Sized> {
    backend: &'b mut B,
    fonts: HashMap<String, FontRef>,
    images: HashMap<String, ImageRef>,
    /// Text state of the page being rendered.
    text: TextState,
}

/// Where a frame's origin sits on the page, in layout coordinates.
struct Cursor {
    page: PageRef,
    page_height: f64,
    x: f64,
    y: f64,
}

impl Cursor {
    fn at(&self, x: f64, y: f64) -> Cursor {
        Cursor {
            page: self.page,
            page_height: self.page_height,
            x,
            y,
        }
    }

    fn flip(&self, y: f64) -> f64 {
        self.page_height - y
    }
}

impl<'b, B: Backend + ?Sized> Renderer<'b, B> {
    fn render_page(&mut self, page: &Page) -> Result<()> {
        let page_ref = self.backend.add_page(page.size)?;
        self.text = TextState::default();
        let root = Cursor {
            page: page_ref,
            page_height: page.size.height,
            x: 0.0,
            y: 0.0,
        };
        for frame in page.header.iter().chain([&page.content]).chain(page.footer.iter()) {
            self.render_frame(frame, &root)?;
        }
        Ok(())
    }

    fn render_frame(&mut self, frame: &Frame, parent: &Cursor) -> Result<()> {
        let here = parent.at(parent.x + frame.x, parent.y + frame.y);
        for object in &frame.objects {
            self.render_object(object, &here)?;
        }
        for child in &frame.children {
            self.render_frame(child, &here)?;
        }
        Ok(())
    }

    fn render_object(&mut self, object: &RenderObject, at: &Cursor) -> Result<()> {
        match object {
            RenderObject::Text { x, y, rows } => self.render_text(rows, &at.at(at.x + x, at.y + y)),
            RenderObject::Graphics { shapes } => {
                for shape in shapes {
                    self.render_shape(shape, at)?;
                }
                Ok(())
            }
            RenderObject::Image {
                x,
                y,
                width,
                height,
                image,
            } => {
                let image_ref = self.image_ref(image)?;
                let (left, top) = (at.x + x, at.y + y);
                self.emit(at.page, Operator::SaveState)?;
                self.emit(
                    at.page,
                    Operator::Transform(Matrix::new(
                        *width,
                        0.0,
                        0.0,
                        *height,
                        left,
                        at.flip(top + height),
                    )),
                )?;
                self.emit(at.page, Operator::DrawImage(image_ref))?;
                self.emit(at.page, Operator::RestoreState)
            }
            RenderObject::Link {
                x,
                y,
                width,
                height,
                url,
            } => {
                let (left, top) = (at.x + x, at.y + y);
                let rect = Rect::new(left, at.flip(top + height), *width, *height);
                self.backend.add_link(at.page, rect, LinkTarget::parse(url))
            }
            RenderObject::Anchor { name, x, y } => {
                self.backend
                    .add_destination(name, at.page, at.x + x, at.flip(at.y + y))
            }
        }
    }

    fn render_text(&mut self, rows: &[TextRow], at: &Cursor) -> Result<()> {
        if rows.iter().all(|r| r.segments.is_empty()) {
            return Ok(());
        }
        self.emit(at.page, Operator::BeginText)?;
        for row in rows {
            let baseline = at.flip(at.y + row.y + row.height - row.baseline);
            let mut x = at.x + row.x;
            for segment in &row.segments {
                let start = x;
                x += segment.width;
                if segment.text.is_empty() || segment.is_newline() {
                    continue;
                }
                let font_ref = self.font_ref(&segment.font)?;
                if self.text.font != Some((font_ref, segment.font_size)) {
                    self.emit(at.page, Operator::SetFont(font_ref, segment.font_size))?;
                    self.text.font = Some((font_ref, segment.font_size));
                }
                let color = segment.color.unwrap_or(Color::BLACK);
                if self.text.color != color {
                    self.emit(at.page, Operator::FillColor(color))?;
                    self.text.color = color;
                }
                let spacing = segment.letter_spacing.unwrap_or(0.0);
                if self.text.char_spacing != spacing {
                    self.emit(at.page, Operator::CharSpacing(spacing))?;
                    self.text.char_spacing = spacing;
                }
                let rise = segment.rise.unwrap_or(0.0);
                if self.text.rise != rise {
                    self.emit(at.page, Operator::TextRise(rise))?;
                    self.text.rise = rise;
                }
                self.emit(
                    at.page,
                    Operator::TextMatrix(Matrix::translate(start, baseline)),
                )?;
                self.emit(at.page, Operator::ShowText(segment.text.clone()))?;
            }
        }
        self.emit(at.page, Operator::EndText)
    }

    fn render_shape(&mut self, shape: &Shape, at: &Cursor) -> Result<()> {
        let attrs = shape.attrs();
        let page = at.page;
        let segments = shape_segments(shape)?;

        self.emit(page, Operator::SaveState)?;
        let flip = Matrix::new(1.0, 0.0, 0.0, -1.0, at.x, at.flip(at.y));
        self.emit(
            page,
            Operator::Transform(flip.multiply(&Matrix::from_ops(&attrs.transform))),
        )?;

        if let Some(color) = attrs.fill_color {
            self.emit(page, Operator::FillColor(color))?;
        }
        if let Some(color) = attrs.stroke_color {
            self.emit(page, Operator::StrokeColor(color))?;
        }
        if let Some(opacity) = attrs.fill_opacity {
            self.emit(page, Operator::FillOpacity(opacity))?;
        }
        if let Some(opacity) = attrs.stroke_opacity {
            self.emit(page, Operator::StrokeOpacity(opacity))?;
        }
        if let Some(width) = attrs.line_width {
            self.emit(page, Operator::LineWidth(width))?;
        }
        if let Some(cap) = attrs.line_cap {
            self.emit(page, Operator::LineCap(cap))?;
        }
        if let Some(join) = attrs.line_join {
            self.emit(page, Operator::LineJoin(join))?;
        }
        if let Some(dash) = &attrs.line_dash {
            self.emit(page, Operator::LineDash(dash.clone()))?;
        }

        match segments {
            ShapePath::Rect(x, y, w, h) => self.emit(page, Operator::Rect(x, y, w, h))?,
            ShapePath::Segments(segments) => {
                for segment in segments {
                    self.emit(page, segment_operator(segment))?;
                }
            }
        }

        let paint = match (attrs.fill_color.is_some(), attrs.stroke_color.is_some()) {
            (true, true) => Operator::FillAndStroke,
            (true, false) => Operator::Fill,
            (false, _) => Operator::Stroke,
        };
        self.emit(page, paint)?;
        self.emit(page, Operator::RestoreState)
    }

    fn font_ref(&mut self, font: &Arc<Font>) -> Result<FontRef> {
        let key = font.key();
        if let Some(font_ref) = self.fonts.get(&key) {
            return Ok(*font_ref);
        }
        let font_ref = self.backend.register_font(font)?;
        self.fonts.insert(key, font_ref);
        Ok(font_ref)
    }

    fn image_ref(&mut self, image: &Arc<Image>) -> Result<ImageRef> {
        if let Some(image_ref) = self.images.get(&image.name) {
            return Ok(*image_ref);
        }
        let image_ref = self.backend.register_image(image)?;
        self.images.insert(image.name.clone(), image_ref);
        Ok(image_ref)
    }

    fn emit(&mut self, page: PageRef, op: Operator) -> Result<()> {
        self.backend.draw(page, op)
    }
}

/// Text state carried across every text object on a page. Neither `BT` nor
/// a shape's save/restore pair resets it, so it starts at the page defaults
/// and only changes when a segment asks for a different value.
struct TextState {
    font: Option<(FontRef, f64)>,
    color: Color,
    char_spacing: f64,
    rise: f64,
}

impl Default for TextState {
    fn default() -> Self {
        TextState {
            font: None,
            color: Color::BLACK,
            char_spacing: 0.0,
            rise: 0.0,
        }
    }
}

enum ShapePath {
    Rect(f64, f64, f64, f64),
    Segments(Vec<PathSegment>),
}

fn shape_segments(shape: &Shape) -> Result<ShapePath> {
    let path = match shape {
        Shape::Rect {
            x, y, width, height, ..
        } => ShapePath::Rect(*x, *y, *width, *height),
        Shape::Circle { cx, cy, r, .. } => ShapePath::Segments(ellipse_segments(*cx, *cy, *r, *r)),
        Shape::Line { x1, y1, x2, y2, .. } => ShapePath::Segments(vec![
            PathSegment::MoveTo(*x1, *y1),
            PathSegment::LineTo(*x2, *y2),
        ]),
        Shape::Polyline { points, closed, .. } => {
            let mut segments: Vec<PathSegment> = points
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    if i == 0 {
                        PathSegment::MoveTo(p.x, p.y)
                    } else {
                        PathSegment::LineTo(p.x, p.y)
                    }
                })
                .collect();
            if *closed && !segments.is_empty() {
                segments.push(PathSegment::ClosePath);
            }
            ShapePath::Segments(segments)
        }
        Shape::Path { d, .. } => ShapePath::Segments(to_segments(&parse_svg_path(d)?)?),
    };
    Ok(path)
}

fn segment_operator(segment: PathSegment) -> Operator {
    match segment {
        PathSegment::MoveTo(x, y) => Operator::MoveTo(x, y),
        PathSegment::LineTo(x, y) => Operator::LineTo(x, y),
        PathSegment::CurveTo(x1, y1, x2, y2, x, y) => Operator::CurveTo(x1, y1, x2, y2, x, y),
        PathSegment::ClosePath => Operator::ClosePath,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Edges, Size};
    use crate::layout::pages::layout_pages;
    use crate::layout::tests::{png_bytes, Stores};
    use crate::model::shapes::TransformOp;
    use crate::model::{Block, PageBlock, TextSpan};
    use crate::resource::InMemoryLoader;
    use crate::style::TextAttrs;
    use backend::RecordingBackend;

    fn render_doc(doc: &Document, stores: &Stores) -> RecordingBackend {
        let pages = layout_pages(doc, &stores.ctx()).unwrap();
        let mut backend = RecordingBackend::new();
        render(doc, &pages, &mut backend).unwrap();
        backend
    }

    fn single_frame_page(objects: Vec<RenderObject>) -> Page {
        Page {
            size: Size::new(200.0, 100.0),
            content: Frame {
                x: 10.0,
                y: 20.0,
                width: 100.0,
                height: 50.0,
                objects,
                children: Vec::new(),
            },
            header: None,
            footer: None,
        }
    }

    fn render_page(page: Page) -> RecordingBackend {
        let mut backend = RecordingBackend::new();
        render(&Document::default(), &[page], &mut backend).unwrap();
        backend
    }

    #[test]
    fn test_metadata_before_pages() {
        let mut doc = Document::new(vec![Block::paragraph("x")]);
        doc.info.title = Some("Report".to_string());
        let backend = render_doc(&doc, &Stores::new());
        assert_eq!(backend.metadata.and_then(|m| m.title).as_deref(), Some("Report"));
        assert_eq!(backend.pages.len(), 1);
    }

    #[test]
    fn test_text_baseline_is_flipped() {
        let stores = Stores::new();
        let doc = Document::new(vec![Block::paragraph("Hello")]);
        let pages = layout_pages(&doc, &stores.ctx()).unwrap();
        let mut backend = RecordingBackend::new();
        render(&doc, &pages, &mut backend).unwrap();

        let ops = &backend.pages[0].ops;
        assert_eq!(ops.first(), Some(&Operator::BeginText));
        assert_eq!(ops.last(), Some(&Operator::EndText));
        assert!(ops.contains(&Operator::ShowText("Hello".to_string())));

        let size = doc.page_dimensions();
        let row = match &pages[0].content.children[0].objects[0] {
            RenderObject::Text { rows, .. } => rows[0].clone(),
            other => panic!("expected text, got {:?}", other),
        };
        let expected_y = size.height - (40.0 + row.height - row.baseline);
        let matrix = ops
            .iter()
            .find_map(|op| match op {
                Operator::TextMatrix(m) => Some(*m),
                _ => None,
            })
            .unwrap();
        assert_eq!(matrix.e, 40.0);
        assert!((matrix.f - expected_y).abs() < 1e-9);
    }

    #[test]
    fn test_text_state_only_on_change() {
        let stores = Stores::new();
        let red = TextAttrs {
            color: Some(Color::rgb(1.0, 0.0, 0.0)),
            ..Default::default()
        };
        let doc = Document::new(vec![Block::text(vec![
            TextSpan::plain("a "),
            TextSpan::plain("b "),
            TextSpan::styled("c", red),
        ])]);
        let backend = render_doc(&doc, &stores);
        let ops = &backend.pages[0].ops;
        let fonts = ops.iter().filter(|op| matches!(op, Operator::SetFont(..))).count();
        let colors = ops.iter().filter(|op| matches!(op, Operator::FillColor(_))).count();
        assert_eq!(fonts, 1);
        assert_eq!(colors, 1);
        assert_eq!(backend.fonts.len(), 1);
    }

    /// Replay the ops and report the colour and spacing each run is drawn with.
    fn effective_text_state(ops: &[Operator]) -> Vec<(String, Color, f64)> {
        let mut color = Color::BLACK;
        let mut spacing = 0.0;
        let mut shown = Vec::new();
        for op in ops {
            match op {
                Operator::FillColor(c) => color = *c,
                Operator::CharSpacing(s) => spacing = *s,
                Operator::ShowText(t) => shown.push((t.clone(), color, spacing)),
                _ => {}
            }
        }
        shown
    }

    #[test]
    fn test_text_state_runs_across_blocks() {
        let stores = Stores::new();
        let red = Color::rgb(1.0, 0.0, 0.0);
        let styled = TextAttrs {
            color: Some(red),
            letter_spacing: Some(2.0),
            ..Default::default()
        };
        let doc = Document::new(vec![
            Block::text(vec![TextSpan::styled("red", styled)]),
            Block::paragraph("black"),
        ]);
        let backend = render_doc(&doc, &stores);
        let ops = &backend.pages[0].ops;
        assert_eq!(
            effective_text_state(ops),
            vec![
                ("red".to_string(), red, 2.0),
                ("black".to_string(), Color::BLACK, 0.0),
            ]
        );
        let fonts = ops.iter().filter(|op| matches!(op, Operator::SetFont(..))).count();
        assert_eq!(fonts, 1);
    }

    #[test]
    fn test_text_state_restarts_on_each_page() {
        let stores = Stores::new();
        let red = TextAttrs {
            color: Some(Color::rgb(1.0, 0.0, 0.0)),
            ..Default::default()
        };
        let text = |word: &str| {
            let flow = crate::text::flow_text(
                &[TextSpan::styled(word, red.clone())],
                &TextAttrs::default(),
                &stores.fonts,
                100.0,
                50.0,
            )
            .unwrap();
            RenderObject::Text {
                x: 0.0,
                y: 0.0,
                rows: flow.rows,
            }
        };
        let pages = vec![
            single_frame_page(vec![text("one")]),
            single_frame_page(vec![text("two")]),
        ];
        let mut backend = RecordingBackend::new();
        render(&Document::default(), &pages, &mut backend).unwrap();
        for page in &backend.pages {
            let colors = page.ops.iter().filter(|op| matches!(op, Operator::FillColor(_))).count();
            let fonts = page.ops.iter().filter(|op| matches!(op, Operator::SetFont(..))).count();
            assert_eq!(colors, 1);
            assert_eq!(fonts, 1);
        }
    }

    #[test]
    fn test_rect_shape_with_flip_and_transform() {
        let shape = Shape::rect(1.0, 2.0, 3.0, 4.0)
            .with_fill(Color::WHITE)
            .with_transform(TransformOp::Translate { tx: 5.0, ty: 6.0 });
        let backend = render_page(single_frame_page(vec![RenderObject::Graphics {
            shapes: vec![shape],
        }]));
        let ops = &backend.pages[0].ops;
        assert_eq!(ops[0], Operator::SaveState);
        match &ops[1] {
            Operator::Transform(m) => {
                // frame origin (10, 20) on a 100pt page, then the shape's own translate
                assert_eq!(m.apply(0.0, 0.0), (15.0, 74.0));
                assert_eq!(m.d, -1.0);
            }
            other => panic!("expected transform, got {:?}", other),
        }
        assert!(ops.contains(&Operator::Rect(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(ops[ops.len() - 2], Operator::Fill);
        assert_eq!(ops[ops.len() - 1], Operator::RestoreState);
    }

    #[test]
    fn test_unstyled_shape_is_stroked() {
        let backend = render_page(single_frame_page(vec![RenderObject::Graphics {
            shapes: vec![Shape::line(0.0, 0.0, 10.0, 10.0)],
        }]));
        let ops = &backend.pages[0].ops;
        assert!(ops.contains(&Operator::MoveTo(0.0, 0.0)));
        assert!(ops.contains(&Operator::LineTo(10.0, 10.0)));
        assert!(ops.contains(&Operator::Stroke));
    }

    #[test]
    fn test_fill_and_stroke_together() {
        let shape = Shape::circle(5.0, 5.0, 5.0)
            .with_fill(Color::WHITE)
            .with_stroke(Color::BLACK, 2.0);
        let backend = render_page(single_frame_page(vec![RenderObject::Graphics {
            shapes: vec![shape],
        }]));
        let ops = &backend.pages[0].ops;
        assert!(ops.contains(&Operator::LineWidth(2.0)));
        let curves = ops.iter().filter(|op| matches!(op, Operator::CurveTo(..))).count();
        assert_eq!(curves, 4);
        assert!(ops.contains(&Operator::FillAndStroke));
    }

    #[test]
    fn test_image_placement_and_dedup() {
        let stores =
            Stores::with_loader(InMemoryLoader::new().with("logo", png_bytes(10, 10)));
        let doc = Document::new(vec![Block::image("logo"), Block::image("logo")]);
        let backend = render_doc(&doc, &stores);
        assert_eq!(backend.images, vec!["logo".to_string()]);

        let ops = &backend.pages[0].ops;
        let size = doc.page_dimensions();
        assert_eq!(
            ops[1],
            Operator::Transform(Matrix::new(10.0, 0.0, 0.0, 10.0, 40.0, size.height - 50.0))
        );
        assert_eq!(ops[2], Operator::DrawImage(ImageRef(0)));
    }

    #[test]
    fn test_links_and_anchors() {
        let backend = render_page(single_frame_page(vec![
            RenderObject::Anchor {
                name: "top".to_string(),
                x: 0.0,
                y: 0.0,
            },
            RenderObject::Link {
                x: 5.0,
                y: 5.0,
                width: 20.0,
                height: 10.0,
                url: "#top".to_string(),
            },
        ]));
        assert_eq!(
            backend.destinations,
            vec![("top".to_string(), PageRef(0), 10.0, 80.0)]
        );
        let (rect, target) = &backend.pages[0].links[0];
        assert_eq!(*rect, Rect::new(15.0, 65.0, 20.0, 10.0));
        assert_eq!(*target, LinkTarget::Internal("top".to_string()));
    }

    #[test]
    fn test_header_content_footer_order() {
        let stores = Stores::new();
        let mut doc = Document::new(vec![Block::paragraph("body")]);
        doc.margin = Edges::uniform(20.0);
        doc.header = Some(PageBlock::Static(Block::paragraph("head")));
        doc.footer = Some(PageBlock::Static(Block::paragraph("foot")));
        let backend = render_doc(&doc, &stores);
        let shown: Vec<String> = backend.pages[0]
            .ops
            .iter()
            .filter_map(|op| match op {
                Operator::ShowText(t) => Some(t.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(shown, vec!["head", "body", "foot"]);
    }

    #[test]
    fn test_bad_path_is_an_error() {
        let page = single_frame_page(vec![RenderObject::Graphics {
            shapes: vec![Shape::path("M 0 0 Q")],
        }]);
        let mut backend = RecordingBackend::new();
        assert!(render(&Document::default(), &[page], &mut backend).is_err());
    }
}
