//! # Page Break Decisions
//!
//! Rules for where a run of stacked blocks may be split across pages.
//!
//! A break between two neighbours is allowed unless the upper one asks for
//! `breakAfter: avoid` or the lower one asks for `breakBefore: avoid`. An
//! `always` on either side forces the break and beats any `avoid`.

use crate::model::{Block, BlockAttrs, BreakPolicy};

/// What to do when the block at some index does not fit.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakDecision {
    /// No legal break exists; place the block anyway and overflow.
    Place,
    /// Keep the first `items_on_current_page` blocks, continue the rest on the next page.
    Split { items_on_current_page: usize },
}

/// True when either side demands a break between `before` and `after`.
pub fn is_break_forced(before: &BlockAttrs, after: &BlockAttrs) -> bool {
    before.break_after == BreakPolicy::Always || after.break_before == BreakPolicy::Always
}

/// True when a page break may separate `before` from `after`.
pub fn is_break_possible(before: &BlockAttrs, after: &BlockAttrs) -> bool {
    if is_break_forced(before, after) {
        return true;
    }
    before.break_after != BreakPolicy::Avoid && after.break_before != BreakPolicy::Avoid
}

/// `blocks[overflow_index]` does not fit. Find the latest legal break at or
/// before it. A break before index 0 is never offered, so at least one
/// block always stays on the page.
pub fn decide_break(blocks: &[Block], overflow_index: usize) -> BreakDecision {
    let last = overflow_index.min(blocks.len().saturating_sub(1));
    (1..=last)
        .rev()
        .find(|&i| is_break_possible(&blocks[i - 1].attrs, &blocks[i].attrs))
        .map(|i| BreakDecision::Split {
            items_on_current_page: i,
        })
        .unwrap_or(BreakDecision::Place)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_block(before: BreakPolicy, after: BreakPolicy) -> Block {
        let mut block = Block::empty().with_height(10.0);
        block.attrs.break_before = before;
        block.attrs.break_after = after;
        block
    }

    fn auto() -> Block {
        make_block(BreakPolicy::Auto, BreakPolicy::Auto)
    }

    #[test]
    fn test_break_between_plain_blocks() {
        let blocks = vec![auto(), auto(), auto()];
        assert_eq!(
            decide_break(&blocks, 2),
            BreakDecision::Split {
                items_on_current_page: 2
            }
        );
    }

    #[test]
    fn test_avoid_after_moves_break_back() {
        let blocks = vec![
            auto(),
            make_block(BreakPolicy::Auto, BreakPolicy::Avoid),
            auto(),
        ];
        assert_eq!(
            decide_break(&blocks, 2),
            BreakDecision::Split {
                items_on_current_page: 1
            }
        );
    }

    #[test]
    fn test_avoid_before_with_no_alternative_places() {
        let blocks = vec![auto(), make_block(BreakPolicy::Avoid, BreakPolicy::Auto)];
        assert_eq!(decide_break(&blocks, 1), BreakDecision::Place);
    }

    #[test]
    fn test_first_block_never_split_off() {
        let blocks = vec![auto(), auto()];
        assert_eq!(decide_break(&blocks, 0), BreakDecision::Place);
    }

    #[test]
    fn test_always_beats_avoid() {
        let before = make_block(BreakPolicy::Auto, BreakPolicy::Avoid);
        let after = make_block(BreakPolicy::Always, BreakPolicy::Auto);
        assert!(is_break_forced(&before.attrs, &after.attrs));
        assert!(is_break_possible(&before.attrs, &after.attrs));

        let after = make_block(BreakPolicy::Avoid, BreakPolicy::Auto);
        assert!(!is_break_possible(&auto().attrs, &after.attrs));
    }
}
