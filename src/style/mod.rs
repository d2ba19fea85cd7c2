//! # Text Style
//!
//! Text attributes cascade from the document default style, through every
//! enclosing block, down into nested text spans. Each level only states what
//! it overrides; [`TextAttrs::inherit`] merges a child over its parent so the
//! innermost value wins.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

pub const DEFAULT_FONT_SIZE: f64 = 12.0;
pub const DEFAULT_LINE_HEIGHT: f64 = 1.2;

/// Inheritable text attributes. Every field is optional; unset fields take
/// the parent's value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_style: Option<FontStyle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<FontWeight>,
    /// Font size in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Line height as a multiplier of the font height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
    /// Link target. `#name` links to an anchor in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Baseline shift in points (positive raises the text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rise: Option<f64>,
    /// Extra space after every character, in points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter_spacing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_align: Option<TextAlign>,
}

impl TextAttrs {
    /// Merge `self` over `parent`. Values set on `self` win.
    pub fn inherit(&self, parent: &TextAttrs) -> TextAttrs {
        TextAttrs {
            font_family: self.font_family.clone().or_else(|| parent.font_family.clone()),
            font_style: self.font_style.or(parent.font_style),
            font_weight: self.font_weight.or(parent.font_weight),
            font_size: self.font_size.or(parent.font_size),
            line_height: self.line_height.or(parent.line_height),
            color: self.color.or(parent.color),
            link: self.link.clone().or_else(|| parent.link.clone()),
            rise: self.rise.or(parent.rise),
            letter_spacing: self.letter_spacing.or(parent.letter_spacing),
            text_align: self.text_align.or(parent.text_align),
        }
    }

    pub fn font_size(&self) -> f64 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn line_height(&self) -> f64 {
        self.line_height.unwrap_or(DEFAULT_LINE_HEIGHT)
    }

    pub fn font_style(&self) -> FontStyle {
        self.font_style.unwrap_or_default()
    }

    pub fn font_weight(&self) -> u16 {
        self.font_weight.unwrap_or_default().0
    }

    pub fn text_align(&self) -> TextAlign {
        self.text_align.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Oblique,
}

impl FontStyle {
    /// The style tried when this exact style is not available.
    pub fn fallback(self) -> Option<FontStyle> {
        match self {
            FontStyle::Italic => Some(FontStyle::Oblique),
            FontStyle::Oblique => Some(FontStyle::Italic),
            FontStyle::Normal => None,
        }
    }
}

impl fmt::Display for FontStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
            FontStyle::Oblique => "oblique",
        })
    }
}

/// A numeric font weight (100-900). Deserializes from a number or from the
/// keywords `normal` (400) and `bold` (700).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FontWeight(pub u16);

impl FontWeight {
    pub const NORMAL: FontWeight = FontWeight(400);
    pub const BOLD: FontWeight = FontWeight(700);
}

impl Default for FontWeight {
    fn default() -> Self {
        FontWeight::NORMAL
    }
}

impl<'de> Deserialize<'de> for FontWeight {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u16),
            Keyword(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(FontWeight(n)),
            Raw::Keyword(k) => match k.as_str() {
                "normal" => Ok(FontWeight::NORMAL),
                "bold" => Ok(FontWeight::BOLD),
                other => Err(serde::de::Error::custom(format!(
                    "unknown font weight '{}'",
                    other
                ))),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Right,
    Center,
}

impl TextAlign {
    /// Fraction of the free space placed before the content.
    pub fn offset_factor(self) -> f64 {
        match self {
            TextAlign::Left => 0.0,
            TextAlign::Center => 0.5,
            TextAlign::Right => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAlign {
    #[default]
    Top,
    Middle,
    Bottom,
}

impl VerticalAlign {
    pub fn offset_factor(self) -> f64 {
        match self {
            VerticalAlign::Top => 0.0,
            VerticalAlign::Middle => 0.5,
            VerticalAlign::Bottom => 1.0,
        }
    }
}

/// An RGB color with components in 0.0 - 1.0. Deserializes from `#rgb`,
/// `#rrggbb`, a handful of CSS names, or an `{r, g, b}` object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b }
    }

    /// Parse a hex color. Returns `None` for anything that isn't 3 or 6 hex digits.
    pub fn hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').filter(|h| h.is_ascii())?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f64 / 255.0);
        match hex.len() {
            3 => Some(Self {
                r: channel(&hex[0..1].repeat(2))?,
                g: channel(&hex[1..2].repeat(2))?,
                b: channel(&hex[2..3].repeat(2))?,
            }),
            6 => Some(Self {
                r: channel(hex.get(0..2)?)?,
                g: channel(hex.get(2..4)?)?,
                b: channel(hex.get(4..6)?)?,
            }),
            _ => None,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.starts_with('#') {
            return Self::hex(input);
        }
        let (r, g, b) = match input.to_ascii_lowercase().as_str() {
            "black" => (0, 0, 0),
            "white" => (255, 255, 255),
            "red" => (255, 0, 0),
            "green" => (0, 128, 0),
            "blue" => (0, 0, 255),
            "yellow" => (255, 255, 0),
            "orange" => (255, 165, 0),
            "gray" | "grey" => (128, 128, 128),
            "lightgray" | "lightgrey" => (211, 211, 211),
            "darkgray" | "darkgrey" => (169, 169, 169),
            "navy" => (0, 0, 128),
            "purple" => (128, 0, 128),
            _ => return None,
        };
        Some(Self::rgb(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0))
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Rgb { r: f64, g: f64, b: f64 },
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Color::parse(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid color '{}'", s))),
            Raw::Rgb { r, g, b } => Ok(Color::rgb(r, g, b)),
        }
    }
}
