//! # PDF Writer
//!
//! A [`Backend`] that writes a PDF 1.7 file. Operators become content
//! stream text as they arrive; fonts, images and the object graph are
//! assembled in [`PdfWriter::finish`].
//!
//! ## PDF Structure (simplified)
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- objects (fonts, pages, content streams, etc.)
//! 2 0 obj ... endobj
//! ...
//! xref                <- cross-reference table (byte offsets of each object)
//! trailer             <- points to the root object
//! %%EOF
//! ```
//!
//! ## Font Embedding
//!
//! Standard fonts (Helvetica, Times, Courier) use simple Type1 references
//! with WinAnsiEncoding. Embedded TrueType fonts are written as
//! CIDFontType2 with Identity-H encoding, producing 5 PDF objects per font:
//! FontFile2, FontDescriptor, CIDFont, ToUnicode CMap, and the root Type0
//! dictionary.
//!
//! Output is deterministic: objects are numbered in registration order and
//! nothing is written from hash-map iteration order.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;
use std::sync::Arc;

use crate::error::{QuireError, Result};
use crate::font::{EmbeddedFace, Font, FontFace};
use crate::geometry::{Rect, Size};
use crate::image_loader::{Image, ImagePixelData, JpegColorSpace};
use crate::model::shapes::{LineCap, LineJoin};
use crate::model::Metadata;
use crate::render::backend::{Backend, FontRef, ImageRef, LinkTarget, Operator, PageRef};
use crate::style::{Color, FontStyle};
use miniz_oxide::deflate::compress_to_vec_zlib;

const PRODUCER: &str = concat!("quire ", env!("CARGO_PKG_VERSION"));

/// Writes one document. Create a new writer per render call.
#[derive(Debug, Default)]
pub struct PdfWriter {
    pages: Vec<PageState>,
    fonts: Vec<FontState>,
    images: Vec<Arc<Image>>,
    /// `(is_stroke, opacity bits)` to index in `ext_gstates`.
    gstate_index: HashMap<(bool, u64), usize>,
    ext_gstates: Vec<(bool, f64)>,
    destinations: Vec<Destination>,
    metadata: Metadata,
}

#[derive(Debug, Default)]
struct PageState {
    size: Size,
    content: String,
    links: Vec<(Rect, LinkTarget)>,
    /// Font selected by the last `Tf`, needed to encode `Tj` strings.
    current_font: Option<usize>,
}

#[derive(Debug)]
struct FontState {
    font: Arc<Font>,
    /// Characters shown with this font, for /W and ToUnicode.
    used: BTreeSet<char>,
}

#[derive(Debug)]
struct Destination {
    name: String,
    page: usize,
    x: f64,
    y: f64,
}

/// Tracks allocated PDF objects during serialization.
struct PdfBuilder {
    objects: Vec<PdfObject>,
}

struct PdfObject {
    data: Vec<u8>,
}

impl PdfBuilder {
    fn new() -> Self {
        // 0 = placeholder (PDF objects are 1-indexed), 1 = Catalog, 2 = Pages
        PdfBuilder {
            objects: (0..3).map(|_| PdfObject { data: Vec::new() }).collect(),
        }
    }

    fn next_id(&self) -> usize {
        self.objects.len()
    }

    fn push(&mut self, data: Vec<u8>) -> usize {
        let id = self.objects.len();
        self.objects.push(PdfObject { data });
        id
    }

    /// Reserve an id now and fill the object in later.
    fn reserve(&mut self) -> usize {
        self.push(Vec::new())
    }

    fn set(&mut self, id: usize, data: Vec<u8>) {
        self.objects[id].data = data;
    }

    fn push_stream(&mut self, dict: &str, raw: &[u8]) -> usize {
        let compressed = compress_to_vec_zlib(raw, 6);
        let mut data: Vec<u8> = Vec::new();
        let _ = write!(
            data,
            "<< {} /Length {} /Filter /FlateDecode >>\nstream\n",
            dict,
            compressed.len()
        );
        data.extend_from_slice(&compressed);
        data.extend_from_slice(b"\nendstream");
        self.push(data)
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn page_mut(&mut self, page: PageRef) -> Result<&mut PageState> {
        self.pages
            .get_mut(page.0)
            .ok_or_else(|| QuireError::Render(format!("unknown page {}", page.0)))
    }

    fn gstate(&mut self, stroke: bool, opacity: f64) -> usize {
        let opacity = opacity.clamp(0.0, 1.0);
        let next = self.ext_gstates.len();
        let index = *self
            .gstate_index
            .entry((stroke, opacity.to_bits()))
            .or_insert(next);
        if index == next {
            self.ext_gstates.push((stroke, opacity));
        }
        index
    }

    fn write_operator(&mut self, page: PageRef, op: Operator) -> Result<()> {
        let gstate = match op {
            Operator::FillOpacity(o) => Some(self.gstate(false, o)),
            Operator::StrokeOpacity(o) => Some(self.gstate(true, o)),
            _ => None,
        };
        let font_count = self.fonts.len();
        let image_count = self.images.len();

        let current_font = self.page_mut(page)?.current_font;
        let text = match &op {
            Operator::ShowText(text) => {
                let index = current_font
                    .ok_or_else(|| QuireError::Render("text shown before a font was set".into()))?;
                let state = &mut self.fonts[index];
                state.used.extend(text.chars().filter(|c| !c.is_control()));
                Some(encode_text(&state.font, text))
            }
            _ => None,
        };

        let state = self.page_mut(page)?;
        let s = &mut state.content;
        match op {
            Operator::SaveState => s.push_str("q\n"),
            Operator::RestoreState => s.push_str("Q\n"),
            Operator::Transform(m) => {
                let _ = writeln!(
                    s,
                    "{} {} {} {} {} {} cm",
                    num(m.a),
                    num(m.b),
                    num(m.c),
                    num(m.d),
                    num(m.e),
                    num(m.f)
                );
            }
            Operator::FillColor(c) => {
                let _ = writeln!(s, "{} rg", color(c));
            }
            Operator::StrokeColor(c) => {
                let _ = writeln!(s, "{} RG", color(c));
            }
            Operator::FillOpacity(_) | Operator::StrokeOpacity(_) => {
                if let Some(index) = gstate {
                    let _ = writeln!(s, "/GS{} gs", index);
                }
            }
            Operator::LineWidth(w) => {
                let _ = writeln!(s, "{} w", num(w));
            }
            Operator::LineCap(cap) => {
                let code = match cap {
                    LineCap::Butt => 0,
                    LineCap::Round => 1,
                    LineCap::Square => 2,
                };
                let _ = writeln!(s, "{} J", code);
            }
            Operator::LineJoin(join) => {
                let code = match join {
                    LineJoin::Miter => 0,
                    LineJoin::Round => 1,
                    LineJoin::Bevel => 2,
                };
                let _ = writeln!(s, "{} j", code);
            }
            Operator::LineDash(dash) => {
                let parts: Vec<String> = dash.iter().map(|d| num(*d)).collect();
                let _ = writeln!(s, "[{}] 0 d", parts.join(" "));
            }
            Operator::MoveTo(x, y) => {
                let _ = writeln!(s, "{} {} m", num(x), num(y));
            }
            Operator::LineTo(x, y) => {
                let _ = writeln!(s, "{} {} l", num(x), num(y));
            }
            Operator::CurveTo(x1, y1, x2, y2, x, y) => {
                let _ = writeln!(
                    s,
                    "{} {} {} {} {} {} c",
                    num(x1),
                    num(y1),
                    num(x2),
                    num(y2),
                    num(x),
                    num(y)
                );
            }
            Operator::Rect(x, y, w, h) => {
                let _ = writeln!(s, "{} {} {} {} re", num(x), num(y), num(w), num(h));
            }
            Operator::ClosePath => s.push_str("h\n"),
            Operator::Stroke => s.push_str("S\n"),
            Operator::Fill => s.push_str("f\n"),
            Operator::FillAndStroke => s.push_str("B\n"),
            Operator::BeginText => s.push_str("BT\n"),
            Operator::EndText => s.push_str("ET\n"),
            Operator::SetFont(FontRef(index), size) => {
                if index >= font_count {
                    return Err(QuireError::Render(format!("unknown font {}", index)));
                }
                state.current_font = Some(index);
                let _ = writeln!(s, "/F{} {} Tf", index, num(size));
            }
            Operator::CharSpacing(spacing) => {
                let _ = writeln!(s, "{} Tc", num(spacing));
            }
            Operator::TextRise(rise) => {
                let _ = writeln!(s, "{} Ts", num(rise));
            }
            Operator::TextMatrix(m) => {
                let _ = writeln!(
                    s,
                    "{} {} {} {} {} {} Tm",
                    num(m.a),
                    num(m.b),
                    num(m.c),
                    num(m.d),
                    num(m.e),
                    num(m.f)
                );
            }
            Operator::ShowText(_) => {
                if let Some(encoded) = text {
                    let _ = writeln!(s, "{} Tj", encoded);
                }
            }
            Operator::DrawImage(ImageRef(index)) => {
                if index >= image_count {
                    return Err(QuireError::Render(format!("unknown image {}", index)));
                }
                let _ = writeln!(s, "/Im{} Do", index);
            }
        }
        Ok(())
    }

    /// Serialize everything drawn so far into PDF bytes.
    pub fn finish(self) -> Vec<u8> {
        let mut builder = PdfBuilder::new();

        let font_ids: Vec<usize> = self
            .fonts
            .iter()
            .map(|state| match &state.font.face {
                FontFace::Standard(std_font) => builder.push(
                    format!(
                        "<< /Type /Font /Subtype /Type1 /BaseFont /{} \
                         /Encoding /WinAnsiEncoding >>",
                        std_font.pdf_name()
                    )
                    .into_bytes(),
                ),
                FontFace::Embedded(face) => {
                    write_embedded_font_objects(&mut builder, &state.font, face, &state.used)
                }
            })
            .collect();

        let image_ids: Vec<usize> = self
            .images
            .iter()
            .map(|image| write_image_xobject(&mut builder, image))
            .collect();

        let gstate_ids: Vec<usize> = self
            .ext_gstates
            .iter()
            .map(|&(stroke, opacity)| {
                let key = if stroke { "CA" } else { "ca" };
                builder.push(
                    format!("<< /Type /ExtGState /{} {} >>", key, num(opacity)).into_bytes(),
                )
            })
            .collect();

        let resources = resource_dict(&font_ids, &image_ids, &gstate_ids);

        // Page ids are needed by destinations and link annotations, so they
        // are reserved before any page object is written.
        let page_ids: Vec<usize> = self.pages.iter().map(|_| builder.reserve()).collect();

        for (page, &page_id) in self.pages.iter().zip(&page_ids) {
            let content_id = builder.push_stream("", page.content.as_bytes());
            let annot_ids: Vec<usize> = page
                .links
                .iter()
                .map(|(rect, target)| {
                    builder.push(link_annotation(rect, target, page_id).into_bytes())
                })
                .collect();
            let annots = if annot_ids.is_empty() {
                String::new()
            } else {
                format!(" /Annots [{}]", refs(&annot_ids))
            };
            let page_dict = format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Contents {} 0 R /Resources << {} >>{} >>",
                num(page.size.width),
                num(page.size.height),
                content_id,
                resources,
                annots
            );
            builder.set(page_id, page_dict.into_bytes());
        }

        let dests = if self.destinations.is_empty() {
            String::new()
        } else {
            let mut dict = String::from("<<");
            for dest in &self.destinations {
                if let Some(page_id) = page_ids.get(dest.page) {
                    let _ = write!(
                        dict,
                        " /{} [{} 0 R /XYZ {} {} null]",
                        pdf_name(&dest.name),
                        page_id,
                        num(dest.x),
                        num(dest.y)
                    );
                }
            }
            dict.push_str(" >>");
            let id = builder.push(dict.into_bytes());
            format!(" /Dests {} 0 R", id)
        };

        builder.set(
            1,
            format!("<< /Type /Catalog /Pages 2 0 R{} >>", dests).into_bytes(),
        );
        builder.set(
            2,
            format!(
                "<< /Type /Pages /Kids [{}] /Count {} >>",
                refs(&page_ids),
                page_ids.len()
            )
            .into_bytes(),
        );

        let info_id = builder.push(info_dict(&self.metadata).into_bytes());
        log::debug!(
            "pdf: {} pages, {} objects",
            self.pages.len(),
            builder.next_id() - 1
        );
        serialize(&builder, info_id)
    }
}

impl Backend for PdfWriter {
    fn add_page(&mut self, size: Size) -> Result<PageRef> {
        self.pages.push(PageState {
            size,
            ..Default::default()
        });
        Ok(PageRef(self.pages.len() - 1))
    }

    fn register_font(&mut self, font: &Arc<Font>) -> Result<FontRef> {
        self.fonts.push(FontState {
            font: font.clone(),
            used: BTreeSet::new(),
        });
        Ok(FontRef(self.fonts.len() - 1))
    }

    fn register_image(&mut self, image: &Arc<Image>) -> Result<ImageRef> {
        self.images.push(image.clone());
        Ok(ImageRef(self.images.len() - 1))
    }

    fn draw(&mut self, page: PageRef, op: Operator) -> Result<()> {
        self.write_operator(page, op)
    }

    fn add_link(&mut self, page: PageRef, rect: Rect, target: LinkTarget) -> Result<()> {
        self.page_mut(page)?.links.push((rect, target));
        Ok(())
    }

    fn add_destination(&mut self, name: &str, page: PageRef, x: f64, y: f64) -> Result<()> {
        if page.0 >= self.pages.len() {
            return Err(QuireError::Render(format!("unknown page {}", page.0)));
        }
        self.destinations.push(Destination {
            name: name.to_string(),
            page: page.0,
            x,
            y,
        });
        Ok(())
    }

    fn set_metadata(&mut self, info: &Metadata) -> Result<()> {
        self.metadata = info.clone();
        Ok(())
    }
}

/// Format a number for content streams: at most 4 decimals, no trailing zeros.
fn num(v: f64) -> String {
    let v = if v.is_finite() { v } else { 0.0 };
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

fn color(c: Color) -> String {
    format!("{} {} {}", num(c.r), num(c.g), num(c.b))
}

fn refs(ids: &[usize]) -> String {
    ids.iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ")
}

fn resource_dict(fonts: &[usize], images: &[usize], gstates: &[usize]) -> String {
    let entries = |prefix: &str, ids: &[usize]| {
        ids.iter()
            .enumerate()
            .map(|(i, id)| format!("/{}{} {} 0 R", prefix, i, id))
            .collect::<Vec<_>>()
            .join(" ")
    };
    let mut dict = String::new();
    if !fonts.is_empty() {
        let _ = write!(dict, "/Font << {} >> ", entries("F", fonts));
    }
    if !images.is_empty() {
        let _ = write!(dict, "/XObject << {} >> ", entries("Im", images));
    }
    if !gstates.is_empty() {
        let _ = write!(dict, "/ExtGState << {} >> ", entries("GS", gstates));
    }
    dict.trim_end().to_string()
}

fn link_annotation(rect: &Rect, target: &LinkTarget, page_id: usize) -> String {
    let action = match target {
        LinkTarget::Uri(uri) => format!("/A << /S /URI /URI ({}) >>", escape_pdf_string(uri)),
        LinkTarget::Internal(name) => format!("/Dest /{}", pdf_name(name)),
    };
    format!(
        "<< /Type /Annot /Subtype /Link /P {} 0 R /Rect [{} {} {} {}] /Border [0 0 0] {} >>",
        page_id,
        num(rect.x),
        num(rect.y),
        num(rect.x + rect.width),
        num(rect.y + rect.height),
        action
    )
}

fn info_dict(metadata: &Metadata) -> String {
    let mut info = String::from("<< ");
    let fields = [
        ("Title", &metadata.title),
        ("Author", &metadata.author),
        ("Subject", &metadata.subject),
        ("Keywords", &metadata.keywords),
        ("Creator", &metadata.creator),
        ("CreationDate", &metadata.creation_date),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            let _ = write!(info, "/{} {} ", key, pdf_text_string(value));
        }
    }
    let producer = metadata.producer.as_deref().unwrap_or(PRODUCER);
    let _ = write!(info, "/Producer {} >>", pdf_text_string(producer));
    info
}

/// Encode text for a `Tj` operand in the given font.
fn encode_text(font: &Font, text: &str) -> String {
    match &font.face {
        FontFace::Standard(_) => {
            let bytes: Vec<u8> = text
                .chars()
                .map(|ch| unicode_to_winansi(ch).unwrap_or(b'?'))
                .collect();
            let mut out = String::from("(");
            for b in bytes {
                match b {
                    b'\\' | b'(' | b')' => {
                        out.push('\\');
                        out.push(b as char);
                    }
                    0x20..=0x7E => out.push(b as char),
                    _ => {
                        let _ = write!(out, "\\{:03o}", b);
                    }
                }
            }
            out.push(')');
            out
        }
        FontFace::Embedded(face) => {
            let mut out = String::from("<");
            for ch in text.chars() {
                let _ = write!(out, "{:04X}", face.glyph_id(ch).unwrap_or(0));
            }
            out.push('>');
            out
        }
    }
}

/// Escape special characters in a PDF string.
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// A text string for the Info dictionary: literal when ASCII, UTF-16BE otherwise.
fn pdf_text_string(s: &str) -> String {
    if s.is_ascii() {
        return format!("({})", escape_pdf_string(s));
    }
    let mut out = String::from("<FEFF");
    for unit in s.encode_utf16() {
        let _ = write!(out, "{:04X}", unit);
    }
    out.push('>');
    out
}

/// Encode a name object body: regular characters pass, the rest become `#xx`.
fn pdf_name(name: &str) -> String {
    let mut out = String::new();
    for b in name.bytes() {
        let regular = b.is_ascii_graphic()
            && !matches!(
                b,
                b'#' | b'/' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'%'
            );
        if regular {
            out.push(b as char);
        } else {
            let _ = write!(out, "#{:02X}", b);
        }
    }
    out
}

/// Map a Unicode codepoint to a WinAnsiEncoding byte value.
///
/// WinAnsiEncoding is based on Windows-1252. Most codepoints in
/// 0x20..=0x7E and 0xA0..=0xFF map directly. The 0x80..=0x9F range
/// contains special mappings for smart quotes, bullets, dashes, etc.
fn unicode_to_winansi(ch: char) -> Option<u8> {
    let cp = ch as u32;
    if (0x20..=0x7E).contains(&cp) || (0xA0..=0xFF).contains(&cp) {
        return Some(cp as u8);
    }
    match cp {
        0x20AC => Some(0x80), // Euro sign
        0x201A => Some(0x82), // Single low-9 quotation mark
        0x0192 => Some(0x83), // Latin small letter f with hook
        0x201E => Some(0x84), // Double low-9 quotation mark
        0x2026 => Some(0x85), // Horizontal ellipsis
        0x2020 => Some(0x86), // Dagger
        0x2021 => Some(0x87), // Double dagger
        0x02C6 => Some(0x88), // Modifier letter circumflex accent
        0x2030 => Some(0x89), // Per mille sign
        0x0160 => Some(0x8A), // Latin capital letter S with caron
        0x2039 => Some(0x8B), // Single left-pointing angle quotation
        0x0152 => Some(0x8C), // Latin capital ligature OE
        0x017D => Some(0x8E), // Latin capital letter Z with caron
        0x2018 => Some(0x91), // Left single quotation mark
        0x2019 => Some(0x92), // Right single quotation mark
        0x201C => Some(0x93), // Left double quotation mark
        0x201D => Some(0x94), // Right double quotation mark
        0x2022 => Some(0x95), // Bullet
        0x2013 => Some(0x96), // En dash
        0x2014 => Some(0x97), // Em dash
        0x02DC => Some(0x98), // Small tilde
        0x2122 => Some(0x99), // Trade mark sign
        0x0161 => Some(0x9A), // Latin small letter s with caron
        0x203A => Some(0x9B), // Single right-pointing angle quotation
        0x0153 => Some(0x9C), // Latin small ligature oe
        0x017E => Some(0x9E), // Latin small letter z with caron
        0x0178 => Some(0x9F), // Latin capital letter Y with diaeresis
        _ => None,
    }
}

/// Write a single image as one or two XObject PDF objects.
/// Returns the main XObject ID.
fn write_image_xobject(builder: &mut PdfBuilder, image: &Image) -> usize {
    match &image.pixel_data {
        ImagePixelData::Jpeg { data, color_space } => {
            let color_space_str = match color_space {
                JpegColorSpace::DeviceRGB => "/DeviceRGB",
                JpegColorSpace::DeviceGray => "/DeviceGray",
            };
            let mut obj_data: Vec<u8> = Vec::new();
            let _ = write!(
                obj_data,
                "<< /Type /XObject /Subtype /Image \
                 /Width {} /Height {} \
                 /ColorSpace {} \
                 /BitsPerComponent 8 \
                 /Filter /DCTDecode \
                 /Length {} >>\nstream\n",
                image.width_px,
                image.height_px,
                color_space_str,
                data.len()
            );
            obj_data.extend_from_slice(data);
            obj_data.extend_from_slice(b"\nendstream");
            builder.push(obj_data)
        }

        ImagePixelData::Decoded { rgb, alpha } => {
            let smask = alpha.as_ref().map(|alpha_data| {
                let dict = format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} \
                     /ColorSpace /DeviceGray /BitsPerComponent 8",
                    image.width_px, image.height_px
                );
                builder.push_stream(&dict, alpha_data)
            });
            let smask_ref = smask
                .map(|id| format!(" /SMask {} 0 R", id))
                .unwrap_or_default();
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8{}",
                image.width_px, image.height_px, smask_ref
            );
            builder.push_stream(&dict, rgb)
        }
    }
}

/// Write the 5 CIDFont PDF objects for an embedded TrueType font.
/// Returns the object ID of the Type0 root font dictionary.
fn write_embedded_font_objects(
    builder: &mut PdfBuilder,
    font: &Font,
    face: &EmbeddedFace,
    used: &BTreeSet<char>,
) -> usize {
    let italic = matches!(font.style, FontStyle::Italic | FontStyle::Oblique);
    let pdf_font_name = sanitize_font_name(&font.family, font.weight, italic);
    let scale = 1000.0 / face.units_per_em as f64;

    // 1. FontFile2 stream
    let fontfile2_id = builder.push_stream(&format!("/Length1 {}", face.data.len()), &face.data);

    // 2. FontDescriptor
    let [x_min, y_min, x_max, y_max] = face.bbox;
    let font_descriptor = format!(
        "<< /Type /FontDescriptor /FontName /{} /Flags 4 \
         /FontBBox [{} {} {} {}] /ItalicAngle {} \
         /Ascent {} /Descent {} /CapHeight {} /StemV {} \
         /FontFile2 {} 0 R >>",
        pdf_font_name,
        (x_min as f64 * scale) as i32,
        (y_min as f64 * scale) as i32,
        (x_max as f64 * scale) as i32,
        (y_max as f64 * scale) as i32,
        if italic { -12 } else { 0 },
        (face.ascender as f64 * scale) as i32,
        (face.descender as f64 * scale) as i32,
        (face.cap_height as f64 * scale) as i32,
        if font.weight >= 700 { 120 } else { 80 },
        fontfile2_id,
    );
    let font_descriptor_id = builder.push(font_descriptor.into_bytes());

    // 3. CIDFont dictionary (DescendantFont)
    let glyphs: Vec<(u16, char, u32)> = used
        .iter()
        .filter_map(|&ch| {
            face.glyph_id(ch)
                .map(|gid| (gid, ch, (face.advance(ch) as f64 * scale) as u32))
        })
        .collect();
    let cidfont = format!(
        "<< /Type /Font /Subtype /CIDFontType2 /BaseFont /{} \
         /CIDSystemInfo << /Registry (Adobe) /Ordering (Identity) /Supplement 0 >> \
         /FontDescriptor {} 0 R /DW 1000 /W {} \
         /CIDToGIDMap /Identity >>",
        pdf_font_name,
        font_descriptor_id,
        build_w_array(&glyphs),
    );
    let cidfont_id = builder.push(cidfont.into_bytes());

    // 4. ToUnicode CMap
    let cmap = build_tounicode_cmap(&glyphs, &pdf_font_name);
    let tounicode_id = builder.push_stream("", cmap.as_bytes());

    // 5. Type0 font dictionary (the root, referenced by /Resources)
    let type0 = format!(
        "<< /Type /Font /Subtype /Type0 /BaseFont /{} \
         /Encoding /Identity-H \
         /DescendantFonts [{} 0 R] \
         /ToUnicode {} 0 R >>",
        pdf_font_name, cidfont_id, tounicode_id,
    );
    builder.push(type0.into_bytes())
}

/// Build the /W array for per-glyph widths in CIDFont.
/// Format: [gid [width] gid [width] ...]
fn build_w_array(glyphs: &[(u16, char, u32)]) -> String {
    let mut entries: Vec<(u16, u32)> = glyphs.iter().map(|&(gid, _, w)| (gid, w)).collect();
    entries.sort_by_key(|(gid, _)| *gid);
    entries.dedup_by_key(|(gid, _)| *gid);

    let mut result = String::from("[");
    for (gid, width) in &entries {
        let _ = write!(result, " {} [{}]", gid, width);
    }
    result.push_str(" ]");
    result
}

/// Build a ToUnicode CMap for text extraction/copy-paste support.
fn build_tounicode_cmap(glyphs: &[(u16, char, u32)], font_name: &str) -> String {
    let mut gid_to_unicode: Vec<(u16, char)> = glyphs.iter().map(|&(gid, ch, _)| (gid, ch)).collect();
    gid_to_unicode.sort();
    gid_to_unicode.dedup_by_key(|(gid, _)| *gid);

    let mut cmap = String::new();
    cmap.push_str("/CIDInit /ProcSet findresource begin\n");
    cmap.push_str("12 dict begin\n");
    cmap.push_str("begincmap\n");
    cmap.push_str("/CIDSystemInfo\n");
    cmap.push_str("<< /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n");
    let _ = writeln!(cmap, "/CMapName /{}-UTF16 def", font_name);
    cmap.push_str("/CMapType 2 def\n");
    cmap.push_str("1 begincodespacerange\n");
    cmap.push_str("<0000> <FFFF>\n");
    cmap.push_str("endcodespacerange\n");

    // At most 100 entries per beginbfchar block
    for chunk in gid_to_unicode.chunks(100) {
        let _ = writeln!(cmap, "{} beginbfchar", chunk.len());
        for &(gid, ch) in chunk {
            let mut utf16 = [0u16; 2];
            let units: String = ch
                .encode_utf16(&mut utf16)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            let _ = writeln!(cmap, "<{:04X}> <{}>", gid, units);
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\n");
    cmap.push_str("CMapName currentdict /CMap defineresource pop\n");
    cmap.push_str("end\n");
    cmap.push_str("end\n");
    cmap
}

/// Sanitize a font name for use as a PDF name object.
/// Strips spaces and special characters, appends weight/style suffixes.
fn sanitize_font_name(family: &str, weight: u16, italic: bool) -> String {
    let mut name: String = family
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();

    if name.is_empty() {
        name = "CustomFont".to_string();
    }
    if weight != 400 {
        let _ = write!(name, "-W{}", weight);
    }
    if italic {
        name.push_str("-Italic");
    }
    name
}

/// Serialize all objects into the final PDF byte stream.
fn serialize(builder: &PdfBuilder, info_obj_id: usize) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = vec![0; builder.objects.len()];

    output.extend_from_slice(b"%PDF-1.7\n");
    output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

    for (i, obj) in builder.objects.iter().enumerate().skip(1) {
        offsets[i] = output.len();
        let _ = write!(output, "{} 0 obj\n", i);
        output.extend_from_slice(&obj.data);
        output.extend_from_slice(b"\nendobj\n\n");
    }

    let xref_offset = output.len();
    let _ = write!(output, "xref\n0 {}\n", builder.objects.len());
    let _ = write!(output, "0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        let _ = write!(output, "{:010} 00000 n \n", offset);
    }

    let _ = write!(
        output,
        "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
        builder.objects.len(),
        info_obj_id,
        xref_offset
    );
    output
}
