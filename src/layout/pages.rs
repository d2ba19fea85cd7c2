//! # Pagination
//!
//! Lays the document content out page by page until nothing is left.
//!
//! Header and footer are laid out twice. The first pass only measures them
//! so the content box of each page can leave room; page numbers are known
//! but the total page count is not. Once all pages exist, the second pass
//! lays them out for real with the final [`PageInfo`], which is when
//! `{{pageCount}}` and page-count-dependent closures are resolved.
//!
//! The final header or footer can come out taller than the measured one,
//! e.g. when the real page count wraps onto another line. The content is
//! then paginated again with the taller reservations as a floor, for at
//! most [`MAX_PASSES`] passes.

use super::rows::layout_rows_content;
use super::{layout_block, Frame, LayoutContext, Page};
use crate::error::Result;
use crate::geometry::{subtract_edges, Rect};
use crate::model::{Block, BlockKind, Document, PageBlock, PageInfo, SpanContent, TextSpan};

/// Pagination passes before taller final headers or footers are accepted as overlap.
const MAX_PASSES: usize = 3;

const RESERVE_EPSILON: f64 = 1e-6;

/// Space kept free for header and footer on one page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Reserve {
    header: f64,
    footer: f64,
}

impl Reserve {
    fn max(self, other: Reserve) -> Reserve {
        Reserve {
            header: self.header.max(other.header),
            footer: self.footer.max(other.footer),
        }
    }

    fn exceeds(&self, other: &Reserve) -> bool {
        self.header > other.header + RESERVE_EPSILON || self.footer > other.footer + RESERVE_EPSILON
    }
}

pub fn layout_pages(doc: &Document, ctx: &LayoutContext) -> Result<Vec<Page>> {
    let size = doc.page_dimensions();
    let page_box = subtract_edges(&Rect::from_size(size), &doc.margin);
    let mut floors: Vec<Reserve> = Vec::new();
    let mut pass = 1;

    loop {
        let bodies = paginate(doc, ctx, &page_box, &floors)?;
        let page_count = bodies.len();
        log::debug!("layout pass {} produced {} pages", pass, page_count);

        let mut pages = Vec::with_capacity(page_count);
        let mut needed = Vec::with_capacity(page_count);
        for (i, (content, reserved)) in bodies.into_iter().enumerate() {
            let info = PageInfo {
                page_number: i + 1,
                page_count,
                page_size: size,
            };
            let (header, header_height) = match &doc.header {
                Some(h) => place_header(h, &info, &page_box, doc, ctx).map(|(f, r)| (Some(f), r))?,
                None => (None, 0.0),
            };
            let (footer, footer_height) = match &doc.footer {
                Some(f) => place_footer(f, &info, &page_box, doc, ctx).map(|(f, r)| (Some(f), r))?,
                None => (None, 0.0),
            };
            needed.push((
                reserved,
                Reserve {
                    header: header_height,
                    footer: footer_height,
                },
            ));
            pages.push(Page {
                size,
                content,
                header,
                footer,
            });
        }

        if !needed.iter().any(|(reserved, actual)| actual.exceeds(reserved)) {
            return Ok(pages);
        }
        if pass == MAX_PASSES {
            log::warn!("header/footer still taller than reserved after {} passes", pass);
            return Ok(pages);
        }
        floors = needed
            .iter()
            .enumerate()
            .map(|(i, (_, actual))| floors.get(i).copied().unwrap_or_default().max(*actual))
            .collect();
        pass += 1;
    }
}

/// Lay the content out page by page. Header and footer are only measured,
/// never less than the page's entry in `floors`.
fn paginate(
    doc: &Document,
    ctx: &LayoutContext,
    page_box: &Rect,
    floors: &[Reserve],
) -> Result<Vec<(Frame, Reserve)>> {
    let size = doc.page_dimensions();
    let mut bodies: Vec<(Frame, Reserve)> = Vec::new();
    let mut remaining: Vec<Block> = doc.content.clone();

    loop {
        let page_number = bodies.len() + 1;
        let provisional = PageInfo {
            page_number,
            page_count: page_number,
            page_size: size,
        };
        let measured = Reserve {
            header: match &doc.header {
                Some(header) => place_header(header, &provisional, page_box, doc, ctx)?.1,
                None => 0.0,
            },
            footer: match &doc.footer {
                Some(footer) => place_footer(footer, &provisional, page_box, doc, ctx)?.1,
                None => 0.0,
            },
        };
        let reserve = measured.max(floors.get(page_number - 1).copied().unwrap_or_default());
        let content_box = Rect::new(
            page_box.x,
            page_box.y + reserve.header,
            page_box.width,
            (page_box.height - reserve.header - reserve.footer).max(0.0),
        );

        let laid = layout_rows_content(
            &remaining,
            &Rect::new(0.0, 0.0, content_box.width, content_box.height),
            ctx,
            &doc.default_style,
        )?;
        bodies.push((
            Frame {
                x: content_box.x,
                y: content_box.y,
                width: content_box.width,
                height: content_box.height,
                objects: Vec::new(),
                children: laid.children,
            },
            reserve,
        ));

        match laid.remainder {
            Some(rest) => {
                log::debug!("page {} full, {} blocks continue", page_number, rest.len());
                remaining = rest;
            }
            None => return Ok(bodies),
        }
    }
}

/// Header frame at the top of the page box, with the height it reserves.
fn place_header(
    header: &PageBlock,
    info: &PageInfo,
    page_box: &Rect,
    doc: &Document,
    ctx: &LayoutContext,
) -> Result<(Frame, f64)> {
    let block = resolve_page_block(header, info);
    let frame = layout_page_block(&block, page_box, doc, ctx)?;
    let reserved = frame.height + block.attrs.margin.vertical();
    Ok((frame, reserved))
}

/// Footer frame anchored to the bottom of the page box, with the height it reserves.
fn place_footer(
    footer: &PageBlock,
    info: &PageInfo,
    page_box: &Rect,
    doc: &Document,
    ctx: &LayoutContext,
) -> Result<(Frame, f64)> {
    let block = resolve_page_block(footer, info);
    let mut frame = layout_page_block(&block, page_box, doc, ctx)?;
    frame.y = info.page_size.height - frame.height - doc.margin.bottom - block.attrs.margin.bottom;
    let reserved = frame.height + block.attrs.margin.vertical();
    Ok((frame, reserved))
}

fn layout_page_block(
    block: &Block,
    page_box: &Rect,
    doc: &Document,
    ctx: &LayoutContext,
) -> Result<Frame> {
    let result = layout_block(block, page_box, ctx, &doc.default_style)?;
    if result.remainder.is_some() {
        log::warn!("header/footer content does not fit on the page and was cut");
    }
    Ok(result.frame)
}

fn resolve_page_block(page_block: &PageBlock, info: &PageInfo) -> Block {
    match page_block {
        PageBlock::Static(block) => substitute_placeholders(block, info),
        PageBlock::Dynamic(generate) => generate(info),
    }
}

/// Replace `{{pageNumber}}` and `{{pageCount}}` in every text span.
pub fn substitute_placeholders(block: &Block, info: &PageInfo) -> Block {
    let kind = match &block.kind {
        BlockKind::Text { text } => BlockKind::Text {
            text: text.iter().map(|span| substitute_span(span, info)).collect(),
        },
        BlockKind::Columns { columns } => BlockKind::Columns {
            columns: columns
                .iter()
                .map(|b| substitute_placeholders(b, info))
                .collect(),
        },
        BlockKind::Rows {
            rows,
            insert_after_break,
        } => BlockKind::Rows {
            rows: rows.iter().map(|b| substitute_placeholders(b, info)).collect(),
            insert_after_break: insert_after_break.clone(),
        },
        other => other.clone(),
    };
    Block {
        kind,
        attrs: block.attrs.clone(),
    }
}

fn substitute_span(span: &TextSpan, info: &PageInfo) -> TextSpan {
    let text = match &span.text {
        SpanContent::Text(t) => SpanContent::Text(
            t.replace("{{pageNumber}}", &info.page_number.to_string())
                .replace("{{pageCount}}", &info.page_count.to_string()),
        ),
        SpanContent::Spans(children) => {
            SpanContent::Spans(children.iter().map(|c| substitute_span(c, info)).collect())
        }
    };
    TextSpan {
        text,
        attrs: span.attrs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Edges;
    use crate::layout::tests::Stores;
    use crate::layout::RenderObject;
    use crate::model::BreakPolicy;

    fn make_doc(content: Vec<Block>) -> Document {
        let mut doc = Document::new(content);
        doc.margin = Edges::uniform(40.0);
        doc
    }

    fn row_text(frame: &Frame) -> String {
        frame
            .objects
            .iter()
            .filter_map(|o| match o {
                RenderObject::Text { rows, .. } => Some(
                    rows.iter()
                        .flat_map(|r| r.segments.iter().map(|s| s.text.clone()))
                        .collect::<Vec<_>>()
                        .join(" "),
                ),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_document_has_one_page() {
        let stores = Stores::new();
        let pages = layout_pages(&make_doc(vec![]), &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].content.children.is_empty());
    }

    #[test]
    fn test_content_frame_is_inset_page() {
        let stores = Stores::new();
        let doc = make_doc(vec![Block::paragraph("Hello")]);
        let pages = layout_pages(&doc, &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 1);
        let size = doc.page_dimensions();
        let c = &pages[0].content;
        assert_eq!((c.x, c.y), (40.0, 40.0));
        assert_eq!((c.width, c.height), (size.width - 80.0, size.height - 80.0));
    }

    #[test]
    fn test_overflow_creates_pages_without_empty_ones() {
        let stores = Stores::new();
        let blocks: Vec<Block> = (0..30).map(|_| Block::empty().with_height(100.0)).collect();
        let pages = layout_pages(&make_doc(blocks), &stores.ctx()).unwrap();
        assert!(pages.len() > 1);
        assert!(pages.iter().all(|p| !p.content.children.is_empty()));
        let total: usize = pages.iter().map(|p| p.content.children.len()).sum();
        assert_eq!(total, 30);
    }

    #[test]
    fn test_page_break_always() {
        let stores = Stores::new();
        let mut second = Block::paragraph("b");
        second.attrs.break_before = BreakPolicy::Always;
        let pages =
            layout_pages(&make_doc(vec![Block::paragraph("a"), second]), &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn test_oversized_block_still_progresses() {
        let stores = Stores::new();
        let doc = make_doc(vec![Block::empty().with_height(5000.0), Block::paragraph("after")]);
        let pages = layout_pages(&doc, &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 2);
    }

    fn repeated_header_doc(rows: Vec<Block>) -> Document {
        let mut header = Block::empty().with_height(20.0).with_id("hdr");
        header.attrs.break_after = BreakPolicy::Always;
        let table = Block::rows(rows).with_insert_after_break(
            crate::model::InsertAfterBreak::Block(Box::new(header)),
        );
        let mut doc = make_doc(vec![table]);
        doc.margin = Edges::uniform(0.0);
        doc.page_size = crate::model::PageSize::Custom {
            width: 100.0,
            height: 150.0,
        };
        doc
    }

    fn table_rows(page: &Page) -> Vec<Option<String>> {
        page.content.children[0]
            .children
            .iter()
            .map(|f| {
                f.objects.iter().find_map(|o| match o {
                    RenderObject::Anchor { name, .. } => Some(name.clone()),
                    _ => None,
                })
            })
            .collect()
    }

    #[test]
    fn test_repeated_insert_with_forced_break_terminates() {
        let stores = Stores::new();
        let rows = (0..3).map(|_| Block::empty().with_height(100.0)).collect();
        let pages = layout_pages(&repeated_header_doc(rows), &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 3);
        assert_eq!(table_rows(&pages[0]), vec![None]);
        for page in &pages[1..] {
            assert_eq!(table_rows(page), vec![Some("hdr".to_string()), None]);
        }
    }

    #[test]
    fn test_repeated_insert_stays_with_forced_row() {
        let stores = Stores::new();
        let mut forced = Block::empty().with_height(10.0);
        forced.attrs.break_before = BreakPolicy::Always;
        let rows = vec![Block::empty().with_height(10.0), forced, Block::empty().with_height(10.0)];
        let pages = layout_pages(&repeated_header_doc(rows), &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(
            table_rows(&pages[1]),
            vec![Some("hdr".to_string()), None, None]
        );
    }

    #[test]
    fn test_header_growing_with_page_count_keeps_room() {
        let stores = Stores::new();
        let blocks = (0..3).map(|_| Block::empty().with_height(60.0)).collect();
        let mut doc = make_doc(blocks);
        doc.margin = Edges::uniform(0.0);
        doc.page_size = crate::model::PageSize::Custom {
            width: 100.0,
            height: 150.0,
        };
        doc.header = Some(PageBlock::dynamic(|info| {
            Block::empty().with_height(20.0 * info.page_count as f64)
        }));
        let pages = layout_pages(&doc, &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 3);
        for page in &pages {
            let header = page.header.as_ref().unwrap();
            assert_eq!(header.height, 60.0);
            assert!(page.content.y >= header.y + header.height - 1e-9);
            assert_eq!(page.content.children.len(), 1);
        }
    }

    #[test]
    fn test_footer_sees_page_count() {
        let stores = Stores::new();
        let mut doc = make_doc(vec![
            Block::paragraph("a"),
            {
                let mut b = Block::paragraph("b");
                b.attrs.break_before = BreakPolicy::Always;
                b
            },
        ]);
        doc.footer = Some(PageBlock::Static(Block::paragraph(
            "Page {{pageNumber}} of {{pageCount}}",
        )));
        doc.header = Some(PageBlock::dynamic(|info| {
            Block::paragraph(&format!("header {}/{}", info.page_number, info.page_count))
        }));
        let pages = layout_pages(&doc, &stores.ctx()).unwrap();
        assert_eq!(pages.len(), 2);

        let footer = pages[1].footer.as_ref().unwrap();
        assert_eq!(row_text(footer), "Page 2 of 2");
        let size = doc.page_dimensions();
        assert!((footer.y + footer.height - (size.height - 40.0)).abs() < 1e-9);

        let header = pages[0].header.as_ref().unwrap();
        assert_eq!(row_text(header), "header 1/2");
        assert_eq!(header.y, 40.0);
        assert!((pages[0].content.y - (40.0 + header.height)).abs() < 1e-9);
    }
}
