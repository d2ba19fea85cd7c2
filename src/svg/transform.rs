//! Affine matrices in the `[a b c d e f]` form used by PDF `cm`:
//! `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.

use crate::model::shapes::TransformOp;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    pub fn rotate_about(degrees: f64, cx: f64, cy: f64) -> Self {
        Self::translate(cx, cy)
            .multiply(&Self::rotate(degrees))
            .multiply(&Self::translate(-cx, -cy))
    }

    pub fn skew_x(degrees: f64) -> Self {
        Self::new(1.0, 0.0, degrees.to_radians().tan(), 1.0, 0.0, 0.0)
    }

    pub fn skew_y(degrees: f64) -> Self {
        Self::new(1.0, degrees.to_radians().tan(), 0.0, 1.0, 0.0, 0.0)
    }

    /// `self · other`: the result applies `other` first, then `self`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Compose a transform list left to right into one matrix, the way an
    /// SVG `transform` attribute reads.
    pub fn from_ops(ops: &[TransformOp]) -> Matrix {
        ops.iter()
            .fold(Matrix::IDENTITY, |m, op| m.multiply(&Matrix::from(*op)))
    }
}

impl From<TransformOp> for Matrix {
    fn from(op: TransformOp) -> Self {
        match op {
            TransformOp::Translate { tx, ty } => Matrix::translate(tx, ty),
            TransformOp::Scale { sx, sy } => Matrix::scale(sx, sy),
            TransformOp::Rotate { angle, cx, cy } => Matrix::rotate_about(angle, cx, cy),
            TransformOp::SkewX { angle } => Matrix::skew_x(angle),
            TransformOp::SkewY { angle } => Matrix::skew_y(angle),
            TransformOp::Matrix { a, b, c, d, e, f } => Matrix::new(a, b, c, d, e, f),
        }
    }
}
