//! # Box Geometry
//!
//! Points are the only unit the layout engine works in. Everything else
//! (inches, millimetres, centimetres) is converted on the way in, and edge
//! insets are resolved to four concrete sides before layout starts.
//!
//! Coordinates are top-left origin, y growing downward. The render step is
//! the only place that flips into a bottom-left page space.

use crate::error::{QuireError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// A point in layout space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pos {
    pub x: f64,
    pub y: f64,
}

impl Pos {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A box in points, relative to its parent's content origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }
}

/// Resolved inset values used for margin and padding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Edges {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Edges {
    pub const ZERO: Edges = Edges {
        left: 0.0,
        right: 0.0,
        top: 0.0,
        bottom: 0.0,
    };

    pub fn uniform(v: f64) -> Self {
        Self {
            left: v,
            right: v,
            top: v,
            bottom: v,
        }
    }

    pub fn symmetric(vertical: f64, horizontal: f64) -> Self {
        Self {
            left: horizontal,
            right: horizontal,
            top: vertical,
            bottom: vertical,
        }
    }

    pub fn horizontal(&self) -> f64 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f64 {
        self.top + self.bottom
    }
}

/// A length as written in a definition: a bare number of points, or a string
/// with a two-letter unit suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LengthInput {
    Number(f64),
    Text(String),
}

impl From<f64> for LengthInput {
    fn from(v: f64) -> Self {
        LengthInput::Number(v)
    }
}

impl From<&str> for LengthInput {
    fn from(v: &str) -> Self {
        LengthInput::Text(v.to_string())
    }
}

/// Edge insets as written in a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgesInput {
    /// One length for all four sides.
    Uniform(LengthInput),
    /// Per-side values; `x`/`y` are shorthands that explicit sides override.
    Sides {
        #[serde(default)]
        x: Option<LengthInput>,
        #[serde(default)]
        y: Option<LengthInput>,
        #[serde(default)]
        left: Option<LengthInput>,
        #[serde(default)]
        right: Option<LengthInput>,
        #[serde(default)]
        top: Option<LengthInput>,
        #[serde(default)]
        bottom: Option<LengthInput>,
    },
}

/// Convert a length to points.
///
/// Supported units are `pt`, `in` (72pt), `mm` and `cm` (72/2.54pt per cm).
pub fn parse_length(input: &LengthInput) -> Result<f64> {
    match input {
        LengthInput::Number(n) => {
            if n.is_finite() {
                Ok(*n)
            } else {
                Err(invalid_length(&n.to_string(), "not a finite number"))
            }
        }
        LengthInput::Text(s) => parse_length_str(s),
    }
}

/// Parse a length string such as `"72pt"` or `"2.54cm"`.
pub fn parse_length_str(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let split = trimmed
        .char_indices()
        .rev()
        .nth(1)
        .map(|(i, _)| i)
        .ok_or_else(|| invalid_length(input, "expected a number followed by a unit"))?;
    let (number, unit) = trimmed.split_at(split);
    let factor = match unit {
        "pt" => 1.0,
        "in" => 72.0,
        "mm" => 72.0 / 25.4,
        "cm" => 72.0 / 2.54,
        _ => return Err(invalid_length(input, "unrecognized unit")),
    };
    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| invalid_length(input, "malformed number"))?;
    if !value.is_finite() {
        return Err(invalid_length(input, "not a finite number"));
    }
    Ok(value * factor)
}

fn invalid_length(input: &str, reason: &str) -> QuireError {
    QuireError::InvalidLength {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// Resolve edge input to four concrete sides. Missing input means zero insets.
pub fn parse_edges(input: Option<&EdgesInput>) -> Result<Edges> {
    let Some(input) = input else {
        return Ok(Edges::ZERO);
    };
    match input {
        EdgesInput::Uniform(len) => Ok(Edges::uniform(parse_length(len)?)),
        EdgesInput::Sides {
            x,
            y,
            left,
            right,
            top,
            bottom,
        } => {
            let opt = |v: &Option<LengthInput>| v.as_ref().map(parse_length).transpose();
            let x = opt(x)?.unwrap_or(0.0);
            let y = opt(y)?.unwrap_or(0.0);
            Ok(Edges {
                left: opt(left)?.unwrap_or(x),
                right: opt(right)?.unwrap_or(x),
                top: opt(top)?.unwrap_or(y),
                bottom: opt(bottom)?.unwrap_or(y),
            })
        }
    }
}

/// Inset a box by the given edges. Width and height never go below zero.
pub fn subtract_edges(rect: &Rect, edges: &Edges) -> Rect {
    Rect {
        x: rect.x + edges.left,
        y: rect.y + edges.top,
        width: (rect.width - edges.horizontal()).max(0.0),
        height: (rect.height - edges.vertical()).max(0.0),
    }
}

/// `deserialize_with` hook for resolved edges.
pub fn deserialize_edges<'de, D>(deserializer: D) -> std::result::Result<Edges, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<EdgesInput>::deserialize(deserializer)?;
    parse_edges(input.as_ref()).map_err(serde::de::Error::custom)
}

/// `deserialize_with` hook for an optional length.
pub fn deserialize_length<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<LengthInput>::deserialize(deserializer)?;
    input
        .as_ref()
        .map(parse_length)
        .transpose()
        .map_err(serde::de::Error::custom)
}
