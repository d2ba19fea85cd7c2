//! # Column Layout
//!
//! Children of a columns block sit side by side. Widths are settled in
//! three passes: fixed-width columns first, then auto-width columns sized
//! to their content from what is left, then the remaining width is shared
//! evenly by the fill columns. Measurement happens in that order, but
//! final x positions are assigned in document order afterwards.
//!
//! Columns are laid out with unbounded height and never split across pages.

use super::{layout_block, Frame, LayoutContext};
use crate::error::Result;
use crate::geometry::Rect;
use crate::model::{Block, Width};
use crate::style::TextAttrs;

#[derive(Debug, Clone)]
pub struct ColumnsLayout {
    pub children: Vec<Frame>,
    /// Sum of the columns' outer widths.
    pub width: f64,
    /// Tallest column, margins included.
    pub height: f64,
}

/// Share `remaining` evenly between `count` columns, never below zero.
pub fn distribute_even(remaining: f64, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    remaining.max(0.0) / count as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pass {
    Fixed,
    Auto,
    Fill,
}

fn pass_of(block: &Block) -> Pass {
    match block.attrs.width {
        Width::Fixed(_) => Pass::Fixed,
        Width::Auto => Pass::Auto,
        Width::Fill => Pass::Fill,
    }
}

pub fn layout_columns(
    columns: &[Block],
    content: &Rect,
    ctx: &LayoutContext,
    inherited: &TextAttrs,
) -> Result<ColumnsLayout> {
    let mut measured: Vec<Option<Frame>> = vec![None; columns.len()];
    let mut used = 0.0;

    for pass in [Pass::Fixed, Pass::Auto] {
        for (i, column) in columns.iter().enumerate() {
            if pass_of(column) != pass {
                continue;
            }
            let margin = column.attrs.margin.horizontal();
            let width = match column.attrs.width {
                Width::Fixed(w) => w + margin,
                _ => (content.width - used).max(0.0),
            };
            let frame = measure(column, width, ctx, inherited)?;
            used += frame.width + margin;
            measured[i] = Some(frame);
        }
    }

    let fill_count = columns.iter().filter(|c| pass_of(c) == Pass::Fill).count();
    let share = distribute_even(content.width - used, fill_count);
    for (i, column) in columns.iter().enumerate() {
        if pass_of(column) == Pass::Fill {
            measured[i] = Some(measure(column, share, ctx, inherited)?);
        }
    }

    let outer_heights: Vec<f64> = columns
        .iter()
        .zip(&measured)
        .map(|(c, f)| f.as_ref().map_or(0.0, |f| f.height + c.attrs.margin.vertical()))
        .collect();
    let height = outer_heights.iter().copied().fold(0.0, f64::max);

    let mut children = Vec::with_capacity(columns.len());
    let mut x = content.x;
    for ((column, frame), outer_height) in columns.iter().zip(measured).zip(outer_heights) {
        let Some(mut frame) = frame else { continue };
        let align = column.attrs.vertical_align.unwrap_or_default();
        frame.shift(x, content.y + (height - outer_height) * align.offset_factor());
        x += frame.width + column.attrs.margin.horizontal();
        children.push(frame);
    }

    Ok(ColumnsLayout {
        children,
        width: x - content.x,
        height,
    })
}

/// Lay out one column at the origin with unbounded height.
fn measure(column: &Block, width: f64, ctx: &LayoutContext, inherited: &TextAttrs) -> Result<Frame> {
    let bounds = Rect::new(0.0, 0.0, width, f64::INFINITY);
    Ok(layout_block(column, &bounds, ctx, inherited)?.frame)
}
