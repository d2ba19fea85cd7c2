//! # Row Layout
//!
//! Stacks blocks top to bottom inside a content box. This is the only place
//! where content is split between pages: pagination lays out the top-level
//! content list with the same function.
//!
//! Adjacent vertical margins collapse to the larger of the two. When a block
//! does not fit, [`decide_break`] picks the latest legal break at or before
//! it; if there is none the block is placed anyway so layout always makes
//! progress.

use super::page_break::{decide_break, is_break_forced, is_break_possible, BreakDecision};
use super::{layout_block, Frame, LayoutContext};
use crate::error::Result;
use crate::geometry::Rect;
use crate::model::{Block, BreakPolicy};
use crate::style::TextAttrs;

/// Tolerance for float rounding when checking whether a frame fits.
const FIT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct RowsLayout {
    pub children: Vec<Frame>,
    /// Widest child, margins included.
    pub width: f64,
    /// Height used inside the content box, including the last bottom margin.
    pub height: f64,
    /// Blocks that continue on the next page.
    pub remainder: Option<Vec<Block>>,
}

struct Placed {
    frame: Frame,
    bottom_margin: f64,
    outer_width: f64,
}

pub fn layout_rows_content(
    rows: &[Block],
    content: &Rect,
    ctx: &LayoutContext,
    inherited: &TextAttrs,
) -> Result<RowsLayout> {
    let limit = content.y + content.height;
    let mut placed: Vec<Placed> = Vec::with_capacity(rows.len());
    let mut remainder: Option<Vec<Block>> = None;

    for (i, row) in rows.iter().enumerate() {
        if i > 0 && is_break_forced(&rows[i - 1].attrs, &row.attrs) {
            remainder = Some(rows[i..].to_vec());
            break;
        }

        let margin = row.attrs.margin;
        let (cursor, gap) = match placed.last() {
            Some(prev) => (prev.frame.bottom(), prev.bottom_margin.max(margin.top)),
            None => (content.y, margin.top),
        };
        let top = cursor + gap - margin.top;
        let bounds = Rect::new(content.x, top, content.width, (limit - top).max(0.0));
        let result = layout_block(row, &bounds, ctx, inherited)?;

        if result.frame.bottom() > limit + FIT_EPSILON {
            if let BreakDecision::Split {
                items_on_current_page,
            } = decide_break(rows, i)
            {
                placed.truncate(items_on_current_page);
                remainder = Some(rows[items_on_current_page..].to_vec());
                break;
            }
        } else if result.remainder.is_some()
            && row.attrs.break_inside == BreakPolicy::Avoid
            && i > 0
            && is_break_possible(&rows[i - 1].attrs, &row.attrs)
        {
            remainder = Some(rows[i..].to_vec());
            break;
        }

        let split = result.remainder;
        placed.push(Placed {
            outer_width: result.frame.width + margin.horizontal(),
            bottom_margin: margin.bottom,
            frame: result.frame,
        });
        if let Some(rest) = split {
            let mut continued = Vec::with_capacity(rows.len() - i);
            continued.push(rest);
            continued.extend_from_slice(&rows[i + 1..]);
            remainder = Some(continued);
            break;
        }
    }

    let height = placed
        .last()
        .map_or(0.0, |p| p.frame.bottom() + p.bottom_margin - content.y);
    let width = placed.iter().map(|p| p.outer_width).fold(0.0, f64::max);
    if let Some(rest) = &remainder {
        log::trace!("rows placed {}, {} continue", placed.len(), rest.len());
    }

    Ok(RowsLayout {
        children: placed.into_iter().map(|p| p.frame).collect(),
        width,
        height,
        remainder,
    })
}
