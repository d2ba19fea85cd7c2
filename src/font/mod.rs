//! # Font Selection
//!
//! Resolves a `(family, style, weight)` request to a concrete [`Font`].
//!
//! Candidates are the document's own font definitions followed by the
//! built-in standard fonts (Helvetica and Courier). Selection narrows by
//! family, then by style (italic and oblique stand in for each other), then
//! picks a weight with CSS-style nearest matching.
//!
//! Two caches sit behind [`FontStore::select_font`]:
//! - a per-store selector cache, so repeated and concurrent identical
//!   requests resolve once;
//! - a [`FontRegistry`] of parsed font files, keyed by resource name, which
//!   an engine may keep alive across generation calls.

pub mod metrics;

pub use metrics::{StandardFont, StandardFontMetrics};

use crate::error::{QuireError, ResourceError, Result};
use crate::resource::{LoadCache, ResourceLoader, SharedResourceData};
use crate::style::{FontStyle, FontWeight};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A font the document may use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontDef {
    pub family: String,
    #[serde(default)]
    pub style: FontStyle,
    #[serde(default)]
    pub weight: FontWeight,
    #[serde(rename = "src")]
    pub source: FontSource,
}

/// Where a font's glyph data comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FontSource {
    /// A TrueType/OpenType file fetched through the resource loader.
    Resource(String),
    /// One of the standard PDF fonts; nothing to load.
    Standard { standard: StandardFont },
}

impl FontDef {
    pub fn resource(family: &str, style: FontStyle, weight: u16, name: &str) -> Self {
        Self {
            family: family.to_string(),
            style,
            weight: FontWeight(weight),
            source: FontSource::Resource(name.to_string()),
        }
    }

    fn standard(family: &str, style: FontStyle, weight: u16, standard: StandardFont) -> Self {
        Self {
            family: family.to_string(),
            style,
            weight: FontWeight(weight),
            source: FontSource::Standard { standard },
        }
    }

    /// The built-in fonts, available in every document.
    pub fn standard_fonts() -> Vec<FontDef> {
        use FontStyle::{Normal, Oblique};
        vec![
            Self::standard("Helvetica", Normal, 400, StandardFont::Helvetica),
            Self::standard("Helvetica", Normal, 700, StandardFont::HelveticaBold),
            Self::standard("Helvetica", Oblique, 400, StandardFont::HelveticaOblique),
            Self::standard("Helvetica", Oblique, 700, StandardFont::HelveticaBoldOblique),
            Self::standard("Courier", Normal, 400, StandardFont::Courier),
            Self::standard("Courier", Normal, 700, StandardFont::CourierBold),
            Self::standard("Courier", Oblique, 400, StandardFont::CourierOblique),
            Self::standard("Courier", Oblique, 700, StandardFont::CourierBoldOblique),
        ]
    }
}

/// A font request. A missing family means the document's default family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FontSelector {
    pub family: Option<String>,
    pub style: FontStyle,
    pub weight: u16,
}

impl fmt::Display for FontSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}', style={}, weight={}",
            self.family.as_deref().unwrap_or(""),
            self.style,
            self.weight
        )
    }
}

/// A resolved font. Immutable once created; shared by every text segment
/// that uses it.
#[derive(Debug)]
pub struct Font {
    pub family: String,
    pub style: FontStyle,
    pub weight: u16,
    pub face: FontFace,
}

#[derive(Debug, Clone)]
pub enum FontFace {
    Standard(StandardFont),
    Embedded(Arc<EmbeddedFace>),
}

impl Font {
    /// Identifier unique per `(family, style, weight)`.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.family, self.style, self.weight)
    }

    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        match &self.face {
            FontFace::Standard(std_font) => std_font.metrics().char_width(ch, font_size),
            FontFace::Embedded(face) => face.char_width(ch, font_size),
        }
    }

    /// Width of `text` in points, with `letter_spacing` added after every character.
    pub fn measure(&self, text: &str, font_size: f64, letter_spacing: f64) -> f64 {
        text.chars()
            .map(|ch| self.char_width(ch, font_size) + letter_spacing)
            .sum()
    }

    /// Distance from the baseline to the top of the em box, in points.
    pub fn ascent(&self, font_size: f64) -> f64 {
        let (ascender, _, upm) = self.vertical_metrics();
        ascender as f64 / upm * font_size
    }

    /// Distance from the baseline to the bottom of the em box, as a positive number.
    pub fn descent(&self, font_size: f64) -> f64 {
        let (_, descender, upm) = self.vertical_metrics();
        -(descender as f64) / upm * font_size
    }

    pub fn height(&self, font_size: f64) -> f64 {
        self.ascent(font_size) + self.descent(font_size)
    }

    fn vertical_metrics(&self) -> (i16, i16, f64) {
        match &self.face {
            FontFace::Standard(std_font) => {
                let m = std_font.metrics();
                (m.ascender, m.descender, 1000.0)
            }
            FontFace::Embedded(face) => (face.ascender, face.descender, face.units_per_em as f64),
        }
    }
}

/// A parsed TrueType/OpenType file.
pub struct EmbeddedFace {
    pub name: String,
    pub data: SharedResourceData,
    pub units_per_em: u16,
    pub ascender: i16,
    pub descender: i16,
    pub cap_height: i16,
    /// `[x_min, y_min, x_max, y_max]` in font units.
    pub bbox: [i16; 4],
    /// Character to `(glyph id, advance width)`.
    glyphs: HashMap<char, (u16, u16)>,
    default_advance: u16,
}

impl fmt::Debug for EmbeddedFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedFace")
            .field("name", &self.name)
            .field("bytes", &self.data.len())
            .field("glyphs", &self.glyphs.len())
            .finish()
    }
}

impl EmbeddedFace {
    pub fn parse(name: &str, data: SharedResourceData) -> std::result::Result<Self, ResourceError> {
        let face = ttf_parser::Face::parse(&data, 0)
            .map_err(|e| ResourceError::InvalidFormat(format!("{}: {}", name, e)))?;
        let units_per_em = face.units_per_em();

        let mut glyphs = HashMap::new();
        let mut default_advance = 0u16;
        for code in 32u32..=0xFFFF {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            if let Some(glyph_id) = face.glyph_index(ch) {
                let advance = face.glyph_hor_advance(glyph_id).unwrap_or(0);
                glyphs.insert(ch, (glyph_id.0, advance));
                if ch == ' ' {
                    default_advance = advance;
                }
            }
        }
        if default_advance == 0 {
            default_advance = units_per_em / 2;
        }

        let bbox = face.global_bounding_box();
        log::debug!(
            "parsed font '{}': {} glyphs, {} units/em",
            name,
            glyphs.len(),
            units_per_em
        );

        Ok(Self {
            name: name.to_string(),
            units_per_em,
            ascender: face.ascender(),
            descender: face.descender(),
            cap_height: face.capital_height().unwrap_or_else(|| face.ascender()),
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            glyphs,
            default_advance,
            data,
        })
    }

    pub fn glyph_id(&self, ch: char) -> Option<u16> {
        self.glyphs.get(&ch).map(|(gid, _)| *gid)
    }

    /// Advance width of a glyph in font units.
    pub fn advance(&self, ch: char) -> u16 {
        self.glyphs
            .get(&ch)
            .map(|(_, adv)| *adv)
            .unwrap_or(self.default_advance)
    }

    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        self.advance(ch) as f64 / self.units_per_em as f64 * font_size
    }
}

/// Parsed font files, keyed by resource name. Each file is fetched and
/// parsed at most once for the registry's lifetime.
#[derive(Debug)]
pub struct FontRegistry {
    loader: Arc<dyn ResourceLoader>,
    faces: LoadCache<String, Arc<EmbeddedFace>, ResourceError>,
}

impl FontRegistry {
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            faces: LoadCache::new(),
        }
    }

    pub fn face(&self, name: &str) -> std::result::Result<Arc<EmbeddedFace>, ResourceError> {
        self.faces.get_or_load(&name.to_string(), || {
            log::debug!("loading font resource '{}'", name);
            let data = self.loader.load(name)?;
            EmbeddedFace::parse(name, data).map(Arc::new)
        })
    }

    /// Number of distinct font files requested so far.
    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// Font selection for one document.
#[derive(Debug)]
pub struct FontStore {
    defs: Vec<FontDef>,
    default_family: String,
    registry: Arc<FontRegistry>,
    instances: LoadCache<usize, Arc<Font>, ResourceError>,
    selections: LoadCache<FontSelector, Arc<Font>>,
}

impl FontStore {
    pub fn new(document_fonts: &[FontDef], registry: Arc<FontRegistry>) -> Self {
        let mut defs = document_fonts.to_vec();
        defs.extend(FontDef::standard_fonts());
        let default_family = defs
            .first()
            .map(|d| d.family.clone())
            .unwrap_or_else(|| "Helvetica".to_string());
        Self {
            defs,
            default_family,
            registry,
            instances: LoadCache::new(),
            selections: LoadCache::new(),
        }
    }

    pub fn default_family(&self) -> &str {
        &self.default_family
    }

    /// Resolve a request to a font. Failures are cached per selector and
    /// reported with the selector and the underlying cause.
    pub fn select_font(&self, selector: &FontSelector) -> Result<Arc<Font>> {
        let key = FontSelector {
            family: Some(
                selector
                    .family
                    .clone()
                    .unwrap_or_else(|| self.default_family.clone()),
            ),
            ..selector.clone()
        };
        self.selections.get_or_load(&key, || {
            let wrap = |source| QuireError::Font {
                selector: key.to_string(),
                source,
            };
            let family = key.family.as_deref().unwrap_or_default();
            let index = select_font_def(&self.defs, family, key.style, key.weight).map_err(wrap)?;
            self.instances
                .get_or_load(&index, || self.instantiate(index))
                .map_err(wrap)
        })
    }

    fn instantiate(&self, index: usize) -> std::result::Result<Arc<Font>, ResourceError> {
        let def = self
            .defs
            .get(index)
            .ok_or_else(|| ResourceError::NotFound(format!("font definition #{}", index)))?;
        let face = match &def.source {
            FontSource::Standard { standard } => FontFace::Standard(*standard),
            FontSource::Resource(name) => FontFace::Embedded(self.registry.face(name)?),
        };
        Ok(Arc::new(Font {
            family: def.family.clone(),
            style: def.style,
            weight: def.weight.0,
            face,
        }))
    }
}

/// Pick the definition matching `family`, `style` and `weight`, returning its index.
pub fn select_font_def(
    defs: &[FontDef],
    family: &str,
    style: FontStyle,
    weight: u16,
) -> std::result::Result<usize, ResourceError> {
    let by_family: Vec<(usize, &FontDef)> = defs
        .iter()
        .enumerate()
        .filter(|(_, d)| d.family == family)
        .collect();
    if by_family.is_empty() {
        return Err(ResourceError::NotFound(format!(
            "no font defined for family '{}'",
            family
        )));
    }

    let with_style = |s: FontStyle| -> Vec<(usize, &FontDef)> {
        by_family
            .iter()
            .filter(|(_, d)| d.style == s)
            .copied()
            .collect()
    };
    let mut by_style = with_style(style);
    if by_style.is_empty() {
        if let Some(fallback) = style.fallback() {
            by_style = with_style(fallback);
        }
    }
    if by_style.is_empty() {
        return Err(ResourceError::NotFound(format!(
            "no {} font defined for family '{}'",
            style, family
        )));
    }

    let weights: Vec<u16> = by_style.iter().map(|(_, d)| d.weight.0).collect();
    let chosen = select_weight(&weights, weight).ok_or_else(|| {
        ResourceError::NotFound(format!("no weight {} for family '{}'", weight, family))
    })?;
    by_style
        .iter()
        .find(|(_, d)| d.weight.0 == chosen)
        .map(|(i, _)| *i)
        .ok_or_else(|| ResourceError::NotFound(format!("no weight {} for family '{}'", weight, family)))
}

/// CSS-style nearest weight match.
///
/// - exact match wins
/// - below 400: lighter weights descending, then heavier ascending
/// - 400 up to (not including) 500: heavier weights up to 500, then lighter
///   descending, then heavier than 500 ascending
/// - 500 and above: heavier ascending, then lighter descending
pub fn select_weight(available: &[u16], requested: u16) -> Option<u16> {
    if available.contains(&requested) {
        return Some(requested);
    }
    let lighter = available.iter().copied().filter(|&w| w < requested).max();
    let heavier = available.iter().copied().filter(|&w| w > requested).min();

    if requested < 400 {
        lighter.or(heavier)
    } else if requested < 500 {
        available
            .iter()
            .copied()
            .filter(|&w| w > requested && w <= 500)
            .min()
            .or(lighter)
            .or_else(|| available.iter().copied().filter(|&w| w > 500).min())
    } else {
        heavier.or(lighter)
    }
}
