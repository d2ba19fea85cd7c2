//! Vector shapes produced by block graphics generators.
//!
//! Coordinates are relative to the block's frame origin (top-left, y down).

use crate::geometry::Pos;
use crate::style::Color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(flatten)]
        attrs: ShapeAttrs,
    },
    Circle {
        cx: f64,
        cy: f64,
        r: f64,
        #[serde(flatten)]
        attrs: ShapeAttrs,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        #[serde(flatten)]
        attrs: ShapeAttrs,
    },
    Polyline {
        points: Vec<Pos>,
        #[serde(default)]
        closed: bool,
        #[serde(flatten)]
        attrs: ShapeAttrs,
    },
    /// SVG path data (`M`, `L`, `C`, `A`, ... commands).
    Path {
        d: String,
        #[serde(flatten)]
        attrs: ShapeAttrs,
    },
}

/// Stroke, fill and transform settings. A shape with neither color set is
/// stroked in black.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_cap: Option<LineCap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_join: Option<LineJoin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_dash: Option<Vec<f64>>,
    /// Applied left to right.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transform: Vec<TransformOp>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// One step of a shape transform. Angles are in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransformOp {
    Translate {
        tx: f64,
        ty: f64,
    },
    Scale {
        sx: f64,
        sy: f64,
    },
    /// Rotation about `(cx, cy)`, the origin by default.
    Rotate {
        angle: f64,
        #[serde(default)]
        cx: f64,
        #[serde(default)]
        cy: f64,
    },
    SkewX {
        angle: f64,
    },
    SkewY {
        angle: f64,
    },
    Matrix {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        e: f64,
        f: f64,
    },
}

impl Shape {
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Shape::Rect {
            x,
            y,
            width,
            height,
            attrs: ShapeAttrs::default(),
        }
    }

    pub fn circle(cx: f64, cy: f64, r: f64) -> Self {
        Shape::Circle {
            cx,
            cy,
            r,
            attrs: ShapeAttrs::default(),
        }
    }

    pub fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Shape::Line {
            x1,
            y1,
            x2,
            y2,
            attrs: ShapeAttrs::default(),
        }
    }

    pub fn polyline(points: Vec<Pos>, closed: bool) -> Self {
        Shape::Polyline {
            points,
            closed,
            attrs: ShapeAttrs::default(),
        }
    }

    pub fn path(d: &str) -> Self {
        Shape::Path {
            d: d.to_string(),
            attrs: ShapeAttrs::default(),
        }
    }

    pub fn attrs(&self) -> &ShapeAttrs {
        match self {
            Shape::Rect { attrs, .. }
            | Shape::Circle { attrs, .. }
            | Shape::Line { attrs, .. }
            | Shape::Polyline { attrs, .. }
            | Shape::Path { attrs, .. } => attrs,
        }
    }

    pub fn attrs_mut(&mut self) -> &mut ShapeAttrs {
        match self {
            Shape::Rect { attrs, .. }
            | Shape::Circle { attrs, .. }
            | Shape::Line { attrs, .. }
            | Shape::Polyline { attrs, .. }
            | Shape::Path { attrs, .. } => attrs,
        }
    }

    pub fn with_fill(mut self, color: Color) -> Self {
        self.attrs_mut().fill_color = Some(color);
        self
    }

    pub fn with_stroke(mut self, color: Color, width: f64) -> Self {
        let attrs = self.attrs_mut();
        attrs.stroke_color = Some(color);
        attrs.line_width = Some(width);
        self
    }

    pub fn with_dash(mut self, dash: Vec<f64>) -> Self {
        self.attrs_mut().line_dash = Some(dash);
        self
    }

    pub fn with_transform(mut self, op: TransformOp) -> Self {
        self.attrs_mut().transform.push(op);
        self
    }
}
