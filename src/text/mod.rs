//! # Text Flow
//!
//! Turns a tree of styled spans into positioned rows of text.
//!
//! 1. Spans are flattened into [`TextSegment`]s with fully resolved
//!    attributes and a font picked by the [`FontStore`].
//! 2. Every segment is split into whitespace, word and newline runs. Lines
//!    only break between runs, never inside a word.
//! 3. Runs are packed greedily into lines no wider than the available width.
//!    A word that is wider than a whole line is let through on its own line.
//! 4. Each line becomes a [`TextRow`]; compatible neighbouring segments are
//!    merged so the renderer emits fewer operators.
//! 5. Rows are stacked until the available height runs out. Whatever is
//!    left over comes back as spans so the next page can continue the flow.

use crate::error::Result;
use crate::font::{Font, FontSelector, FontStore};
use crate::geometry::Rect;
use crate::model::{SpanContent, TextSpan};
use crate::style::{Color, FontWeight, TextAlign, TextAttrs};
use serde::{Serialize, Serializer};
use std::ops::Range;
use std::sync::Arc;

/// A run of text with fully resolved style and measured geometry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSegment {
    pub text: String,
    /// Advance width in points, letter spacing included.
    pub width: f64,
    /// Ascent plus descent at `font_size`.
    pub height: f64,
    pub line_height: f64,
    #[serde(serialize_with = "serialize_font")]
    pub font: Arc<Font>,
    pub font_size: f64,
    pub color: Option<Color>,
    pub link: Option<String>,
    pub rise: Option<f64>,
    pub letter_spacing: Option<f64>,
}

fn serialize_font<S: Serializer>(font: &Arc<Font>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&font.key())
}

impl TextSegment {
    fn with_text(&self, text: &str) -> TextSegment {
        TextSegment {
            text: text.to_string(),
            width: self
                .font
                .measure(text, self.font_size, self.letter_spacing.unwrap_or(0.0)),
            ..self.clone()
        }
    }

    fn zero_width(mut self) -> Self {
        self.width = 0.0;
        self
    }

    pub fn is_newline(&self) -> bool {
        self.text == "\n"
    }

    /// Whitespace other than a line feed.
    pub fn is_whitespace(&self) -> bool {
        !self.text.is_empty() && !self.is_newline() && self.text.chars().all(char::is_whitespace)
    }

    /// Distance from the bottom of a row to this segment's baseline.
    pub fn baseline_offset(&self) -> f64 {
        let half_leading = (self.height * self.line_height - self.height) / 2.0;
        self.font.descent(self.font_size) + half_leading
    }

    fn row_height(&self) -> f64 {
        self.height * self.line_height
    }

    /// True when two segments can be drawn as a single run.
    fn compatible(&self, other: &TextSegment) -> bool {
        Arc::ptr_eq(&self.font, &other.font)
            && self.font_size == other.font_size
            && self.color == other.color
            && self.line_height == other.line_height
            && self.link == other.link
            && self.rise == other.rise
            && self.letter_spacing == other.letter_spacing
    }

    /// Attributes that reproduce this segment when it is laid out again.
    fn resolved_attrs(&self) -> TextAttrs {
        TextAttrs {
            font_family: Some(self.font.family.clone()),
            font_style: Some(self.font.style),
            font_weight: Some(FontWeight(self.font.weight)),
            font_size: Some(self.font_size),
            line_height: Some(self.line_height),
            color: self.color,
            link: self.link.clone(),
            rise: self.rise,
            letter_spacing: self.letter_spacing,
            text_align: None,
        }
    }
}

/// One line of laid-out text, relative to the text content origin.
#[derive(Debug, Clone, Serialize)]
pub struct TextRow {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Distance from the bottom of the row up to the baseline.
    pub baseline: f64,
    pub segments: Vec<TextSegment>,
}

/// A clickable region produced by a linked segment.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkArea {
    pub rect: Rect,
    pub url: String,
}

/// The result of flowing spans into a box.
#[derive(Debug, Clone)]
pub struct TextFlow {
    pub rows: Vec<TextRow>,
    pub links: Vec<LinkArea>,
    /// Widest row.
    pub width: f64,
    pub height: f64,
    /// Spans that did not fit, with their attributes fully resolved.
    pub remainder: Option<Vec<TextSpan>>,
}

/// Flatten a span tree into measured segments. Attributes inherit from
/// `inherited` downward; the innermost value wins.
pub fn extract_segments(
    spans: &[TextSpan],
    inherited: &TextAttrs,
    fonts: &FontStore,
) -> Result<Vec<TextSegment>> {
    let mut segments = Vec::new();
    for span in spans {
        collect_span(span, inherited, fonts, &mut segments)?;
    }
    Ok(segments)
}

fn collect_span(
    span: &TextSpan,
    inherited: &TextAttrs,
    fonts: &FontStore,
    out: &mut Vec<TextSegment>,
) -> Result<()> {
    let attrs = span.attrs.inherit(inherited);
    match &span.text {
        SpanContent::Spans(children) => {
            for child in children {
                collect_span(child, &attrs, fonts, out)?;
            }
        }
        SpanContent::Text(text) => {
            if text.is_empty() {
                return Ok(());
            }
            let font = fonts.select_font(&FontSelector {
                family: attrs.font_family.clone(),
                style: attrs.font_style(),
                weight: attrs.font_weight(),
            })?;
            let font_size = attrs.font_size();
            let segment = TextSegment {
                text: String::new(),
                width: 0.0,
                height: font.height(font_size),
                line_height: attrs.line_height(),
                font,
                font_size,
                color: attrs.color,
                link: attrs.link.clone(),
                rise: attrs.rise,
                letter_spacing: attrs.letter_spacing,
            };
            for run in split_runs(text) {
                out.push(if run == "\n" {
                    segment.with_text("\n").zero_width()
                } else {
                    segment.with_text(run)
                });
            }
        }
    }
    Ok(())
}

/// Split text into maximal whitespace and non-whitespace runs. Every line
/// feed is a run of its own.
pub fn split_runs(text: &str) -> Vec<&str> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;

    for (i, ch) in text.char_indices() {
        if ch == '\n' {
            if i > start {
                runs.push(&text[start..i]);
            }
            runs.push(&text[i..i + 1]);
            start = i + 1;
            current = None;
            continue;
        }
        let ws = ch.is_whitespace();
        match current {
            Some(kind) if kind != ws => {
                runs.push(&text[start..i]);
                start = i;
            }
            _ => {}
        }
        current = Some(ws);
    }
    if start < text.len() {
        runs.push(&text[start..]);
    }
    runs
}

/// One broken line as index ranges into the run list.
#[derive(Debug, Clone, PartialEq)]
struct LineRange {
    /// Segments drawn on this line.
    visible: Range<usize>,
    /// The runs the line was broken from, trailing whitespace included.
    whole: Range<usize>,
    /// The line feed that ended this line, if any.
    newline: Option<usize>,
}

impl LineRange {
    fn new(runs: &[TextSegment], whole: Range<usize>, newline: Option<usize>) -> Self {
        LineRange {
            visible: trim_end(runs, whole.clone()),
            whole,
            newline,
        }
    }
}

fn line_ranges(runs: &[TextSegment], max_width: f64) -> Vec<LineRange> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut width = 0.0;
    let mut last_space: Option<usize> = None;
    let mut wrapped = false;
    let mut i = 0;

    while i < runs.len() {
        let run = &runs[i];

        if run.is_newline() {
            lines.push(LineRange::new(runs, start..i, Some(i)));
            i += 1;
            start = i;
            width = 0.0;
            last_space = None;
            wrapped = false;
            continue;
        }

        if wrapped && start == i && run.is_whitespace() {
            i += 1;
            start = i;
            continue;
        }

        if width + run.width <= max_width {
            if run.is_whitespace() {
                last_space = Some(i);
            }
            width += run.width;
            i += 1;
            continue;
        }

        if run.is_whitespace() {
            if start < i {
                lines.push(LineRange::new(runs, start..i, None));
                wrapped = true;
            }
            i += 1;
            start = i;
            width = 0.0;
            last_space = None;
            continue;
        }

        match last_space.take() {
            Some(space) => {
                lines.push(LineRange::new(runs, start..space + 1, None));
                start = space + 1;
                width = runs[start..i].iter().map(|r| r.width).sum();
                wrapped = true;
            }
            None => {
                // Unbreakable run wider than the line.
                width += run.width;
                i += 1;
            }
        }
    }

    if start < runs.len() || lines.is_empty() {
        // Text made only of overlong whitespace still gets one sized row.
        let from = if start == runs.len() { 0 } else { start };
        lines.push(LineRange::new(runs, from..runs.len(), None));
    }
    lines
}

fn trim_end(runs: &[TextSegment], range: Range<usize>) -> Range<usize> {
    let mut end = range.end;
    while end > range.start && runs[end - 1].is_whitespace() {
        end -= 1;
    }
    range.start..end
}

/// Greedy line breaking. Breaks only at whitespace and line feeds; the
/// whitespace at a break is dropped. `break_line(&[], w)` is `[[]]`.
pub fn break_line(segments: &[TextSegment], max_width: f64) -> Vec<Vec<TextSegment>> {
    line_ranges(segments, max_width)
        .into_iter()
        .map(|line| segments[line.visible].to_vec())
        .collect()
}

/// Merge neighbouring segments that share every drawing attribute.
pub fn merge_segments(segments: Vec<TextSegment>) -> Vec<TextSegment> {
    let mut merged: Vec<TextSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        match merged.last_mut() {
            Some(last) if last.compatible(&seg) => {
                last.text.push_str(&seg.text);
                last.width += seg.width;
            }
            _ => merged.push(seg),
        }
    }
    merged
}

fn build_row(runs: &[TextSegment], line: &LineRange, y: f64) -> TextRow {
    let visible = &runs[line.visible.clone()];
    let metrics: Vec<&TextSegment> = if !visible.is_empty() {
        visible.iter().collect()
    } else if let Some(i) = line.newline {
        vec![&runs[i]]
    } else {
        runs[line.whole.clone()].iter().collect()
    };
    let height = metrics.iter().map(|s| s.row_height()).fold(0.0, f64::max);
    let baseline = metrics.iter().map(|s| s.baseline_offset()).fold(0.0, f64::max);
    let segments = merge_segments(visible.to_vec());
    TextRow {
        x: 0.0,
        y,
        width: segments.iter().map(|s| s.width).sum(),
        height,
        baseline,
        segments,
    }
}

/// Lay out `spans` in a box `max_width` wide and at most `max_height` tall.
/// The first row is always placed, even when it is taller than the box.
pub fn flow_text(
    spans: &[TextSpan],
    inherited: &TextAttrs,
    fonts: &FontStore,
    max_width: f64,
    max_height: f64,
) -> Result<TextFlow> {
    let runs = extract_segments(spans, inherited, fonts)?;
    let lines = line_ranges(&runs, max_width);

    let mut rows = Vec::with_capacity(lines.len());
    let mut y = 0.0;
    let mut deferred_from = None;
    for line in &lines {
        let row = build_row(&runs, line, y);
        if !rows.is_empty() && y + row.height > max_height {
            deferred_from = Some(line.visible.start);
            break;
        }
        y += row.height;
        rows.push(row);
    }

    let remainder = deferred_from.map(|from| remainder_spans(&runs[from..]));
    if let Some(rest) = &remainder {
        log::trace!("text flow deferred {} spans after {} rows", rest.len(), rows.len());
    }
    let links = collect_links(&rows);
    Ok(TextFlow {
        width: rows.iter().map(|r| r.width).fold(0.0, f64::max),
        height: y,
        rows,
        links,
        remainder,
    })
}

fn remainder_spans(runs: &[TextSegment]) -> Vec<TextSpan> {
    let skip = runs.iter().take_while(|r| r.is_whitespace()).count();
    merge_segments(runs[skip..].to_vec())
        .iter()
        .map(|seg| TextSpan::styled(&seg.text, seg.resolved_attrs()))
        .collect()
}

fn collect_links(rows: &[TextRow]) -> Vec<LinkArea> {
    let mut links = Vec::new();
    for row in rows {
        let mut x = row.x;
        for seg in &row.segments {
            if let Some(url) = &seg.link {
                links.push(LinkArea {
                    rect: Rect::new(x, row.y, seg.width, row.height),
                    url: url.clone(),
                });
            }
            x += seg.width;
        }
    }
    links
}

/// Shift rows (and the links on them) horizontally inside `content_width`.
pub fn align_rows(flow: &mut TextFlow, align: TextAlign, content_width: f64) {
    let factor = align.offset_factor();
    if factor == 0.0 {
        return;
    }
    for row in &mut flow.rows {
        row.x = (content_width - row.width).max(0.0) * factor;
    }
    flow.links = collect_links(&flow.rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontRegistry;
    use crate::resource::InMemoryLoader;

    fn make_store() -> FontStore {
        let registry = Arc::new(FontRegistry::new(Arc::new(InMemoryLoader::new())));
        FontStore::new(&[], registry)
    }

    fn make_segments(store: &FontStore, text: &str) -> Vec<TextSegment> {
        extract_segments(&[TextSpan::plain(text)], &TextAttrs::default(), store).unwrap()
    }

    fn line_texts(lines: &[Vec<TextSegment>]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.iter().map(|s| s.text.as_str()).collect::<String>())
            .collect()
    }

    #[test]
    fn test_split_runs() {
        assert_eq!(split_runs("ab  cd"), vec!["ab", "  ", "cd"]);
        assert_eq!(split_runs("a\n\nb "), vec!["a", "\n", "\n", "b", " "]);
        assert!(split_runs("").is_empty());
    }

    #[test]
    fn test_break_empty_input() {
        assert_eq!(break_line(&[], 100.0).len(), 1);
        assert!(break_line(&[], 0.0)[0].is_empty());
    }

    #[test]
    fn test_break_at_whitespace() {
        let store = make_store();
        let segs = make_segments(&store, "aaa bbb ccc");
        let word = segs[0].width;
        let space = segs[1].width;
        let lines = break_line(&segs, word * 2.0 + space + 0.01);
        assert_eq!(line_texts(&lines), vec!["aaa bbb", "ccc"]);
        for line in &lines {
            let w: f64 = line.iter().map(|s| s.width).sum();
            assert!(w <= word * 2.0 + space + 0.01);
        }
    }

    #[test]
    fn test_overlong_word_is_kept() {
        let store = make_store();
        let segs = make_segments(&store, "a incomprehensibilities b");
        let lines = break_line(&segs, 20.0);
        assert_eq!(line_texts(&lines), vec!["a", "incomprehensibilities", "b"]);
    }

    #[test]
    fn test_newlines_end_lines() {
        let store = make_store();
        let segs = make_segments(&store, "one\n\ntwo");
        let lines = break_line(&segs, 1000.0);
        assert_eq!(line_texts(&lines), vec!["one", "", "two"]);
    }

    #[test]
    fn test_merge_compatible_segments() {
        let store = make_store();
        let segs = make_segments(&store, "a b");
        let merged = merge_segments(segs.clone());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "a b");
        let total: f64 = segs.iter().map(|s| s.width).sum();
        assert!((merged[0].width - total).abs() < 1e-9);
    }

    #[test]
    fn test_nested_spans_inherit() {
        let store = make_store();
        let bold = TextAttrs {
            font_weight: Some(FontWeight::BOLD),
            ..Default::default()
        };
        let big = TextAttrs {
            font_size: Some(20.0),
            ..Default::default()
        };
        let spans = vec![TextSpan::nested(vec![TextSpan::styled("x", big)], bold)];
        let segs = extract_segments(&spans, &TextAttrs::default(), &store).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].font.weight, 700);
        assert_eq!(segs[0].font_size, 20.0);
    }

    #[test]
    fn test_row_metrics() {
        let store = make_store();
        let flow = flow_text(&[TextSpan::plain("Hi")], &TextAttrs::default(), &store, 500.0, 500.0)
            .unwrap();
        assert_eq!(flow.rows.len(), 1);
        let row = &flow.rows[0];
        let seg = &row.segments[0];
        assert!((row.height - seg.height * 1.2).abs() < 1e-9);
        let expected = seg.font.descent(12.0) + (seg.height * 1.2 - seg.height) / 2.0;
        assert!((row.baseline - expected).abs() < 1e-9);
        assert!(flow.remainder.is_none());
    }

    #[test]
    fn test_flow_defers_rows() {
        let store = make_store();
        let spans = [TextSpan::plain("one two three four")];
        let width = store
            .select_font(&FontSelector {
                family: None,
                style: Default::default(),
                weight: 400,
            })
            .unwrap()
            .measure("three", 12.0, 0.0)
            + 1.0;
        let one_row = 12.0 * 1.2;
        let flow = flow_text(&spans, &TextAttrs::default(), &store, width, one_row * 2.5).unwrap();
        assert_eq!(flow.rows.len(), 2);
        let rest = flow.remainder.unwrap();
        let text: String = rest
            .iter()
            .map(|s| match &s.text {
                SpanContent::Text(t) => t.clone(),
                SpanContent::Spans(_) => String::new(),
            })
            .collect();
        assert_eq!(text, "three four");
        assert_eq!(rest[0].attrs.font_size, Some(12.0));
    }

    #[test]
    fn test_whitespace_only_rows_keep_height() {
        let store = make_store();
        let one_row = 12.0 * 1.2;

        let flow = flow_text(&[TextSpan::plain("   ")], &TextAttrs::default(), &store, 1.0, 100.0)
            .unwrap();
        assert_eq!(flow.rows.len(), 1);
        assert!(flow.rows[0].segments.is_empty());
        assert!((flow.rows[0].height - one_row).abs() < 1e-9);

        let flow = flow_text(&[TextSpan::plain("  word")], &TextAttrs::default(), &store, 10.0, 100.0)
            .unwrap();
        assert_eq!(flow.rows.len(), 2);
        assert!(flow.rows[0].segments.is_empty());
        assert!((flow.rows[0].height - one_row).abs() < 1e-9);
        assert!((flow.rows[1].y - one_row).abs() < 1e-9);
    }

    #[test]
    fn test_first_row_always_placed() {
        let store = make_store();
        let flow = flow_text(&[TextSpan::plain("a b")], &TextAttrs::default(), &store, 5.0, 1.0)
            .unwrap();
        assert_eq!(flow.rows.len(), 1);
        assert!(flow.remainder.is_some());
    }

    #[test]
    fn test_alignment_moves_rows_and_links() {
        let store = make_store();
        let link = TextAttrs {
            link: Some("https://example.com".to_string()),
            ..Default::default()
        };
        let mut flow = flow_text(
            &[TextSpan::styled("go", link)],
            &TextAttrs::default(),
            &store,
            200.0,
            100.0,
        )
        .unwrap();
        assert_eq!(flow.links.len(), 1);
        align_rows(&mut flow, TextAlign::Right, 200.0);
        let row = &flow.rows[0];
        assert!((row.x + row.width - 200.0).abs() < 1e-9);
        assert!((flow.links[0].rect.x - row.x).abs() < 1e-9);
    }
}
