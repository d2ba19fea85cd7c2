//! Conversion of parsed path commands into absolute segments that a page
//! backend can draw directly: move, line, cubic curve, close.

use super::{arity, PathCommand};
use crate::error::{QuireError, Result};
use std::f64::consts::PI;

/// Circle approximation constant, `4(√2−1)/3`.
pub const KAPPA: f64 = 0.5522847498;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(f64, f64, f64, f64, f64, f64),
    ClosePath,
}

/// Convert commands to absolute segments.
///
/// Quadratic curves are raised to cubics, smooth curves mirror the previous
/// control point, and arcs are split into segments of at most 90 degrees.
pub fn to_segments(commands: &[PathCommand]) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let (mut cur_x, mut cur_y) = (0.0f64, 0.0f64);
    let (mut start_x, mut start_y) = (0.0f64, 0.0f64);
    let mut last_cubic_ctrl: Option<(f64, f64)> = None;
    let mut last_quad_ctrl: Option<(f64, f64)> = None;

    for (index, command) in commands.iter().enumerate() {
        let op = command.op;
        let expected = arity(op).ok_or_else(|| QuireError::InvalidPath {
            position: index,
            message: format!("unknown command '{}'", op),
        })?;
        if command.params.len() != expected {
            return Err(QuireError::InvalidPath {
                position: index,
                message: format!(
                    "command '{}' expects {} parameters, found {}",
                    op,
                    expected,
                    command.params.len()
                ),
            });
        }

        let p = &command.params;
        let relative = op.is_ascii_lowercase();
        let (ox, oy) = if relative { (cur_x, cur_y) } else { (0.0, 0.0) };
        let mut next_cubic_ctrl = None;
        let mut next_quad_ctrl = None;

        match op.to_ascii_uppercase() {
            'M' => {
                cur_x = ox + p[0];
                cur_y = oy + p[1];
                start_x = cur_x;
                start_y = cur_y;
                segments.push(PathSegment::MoveTo(cur_x, cur_y));
            }
            'L' => {
                cur_x = ox + p[0];
                cur_y = oy + p[1];
                segments.push(PathSegment::LineTo(cur_x, cur_y));
            }
            'H' => {
                cur_x = ox + p[0];
                segments.push(PathSegment::LineTo(cur_x, cur_y));
            }
            'V' => {
                cur_y = oy + p[0];
                segments.push(PathSegment::LineTo(cur_x, cur_y));
            }
            'C' => {
                let (x1, y1) = (ox + p[0], oy + p[1]);
                let (x2, y2) = (ox + p[2], oy + p[3]);
                cur_x = ox + p[4];
                cur_y = oy + p[5];
                segments.push(PathSegment::CurveTo(x1, y1, x2, y2, cur_x, cur_y));
                next_cubic_ctrl = Some((x2, y2));
            }
            'S' => {
                let (x1, y1) = reflect(last_cubic_ctrl, cur_x, cur_y);
                let (x2, y2) = (ox + p[0], oy + p[1]);
                cur_x = ox + p[2];
                cur_y = oy + p[3];
                segments.push(PathSegment::CurveTo(x1, y1, x2, y2, cur_x, cur_y));
                next_cubic_ctrl = Some((x2, y2));
            }
            'Q' => {
                let (qx, qy) = (ox + p[0], oy + p[1]);
                let (ex, ey) = (ox + p[2], oy + p[3]);
                segments.push(quad_to_cubic(cur_x, cur_y, qx, qy, ex, ey));
                cur_x = ex;
                cur_y = ey;
                next_quad_ctrl = Some((qx, qy));
            }
            'T' => {
                let (qx, qy) = reflect(last_quad_ctrl, cur_x, cur_y);
                let (ex, ey) = (ox + p[0], oy + p[1]);
                segments.push(quad_to_cubic(cur_x, cur_y, qx, qy, ex, ey));
                cur_x = ex;
                cur_y = ey;
                next_quad_ctrl = Some((qx, qy));
            }
            'A' => {
                let (ex, ey) = (ox + p[5], oy + p[6]);
                segments.extend(arc_to_cubics(
                    cur_x,
                    cur_y,
                    p[0],
                    p[1],
                    p[2],
                    p[3] != 0.0,
                    p[4] != 0.0,
                    ex,
                    ey,
                ));
                cur_x = ex;
                cur_y = ey;
            }
            _ => {
                segments.push(PathSegment::ClosePath);
                cur_x = start_x;
                cur_y = start_y;
            }
        }

        last_cubic_ctrl = next_cubic_ctrl;
        last_quad_ctrl = next_quad_ctrl;
    }

    Ok(segments)
}

/// Mirror a control point across the current point, or use the current point
/// itself when the previous command was not a compatible curve.
fn reflect(ctrl: Option<(f64, f64)>, cur_x: f64, cur_y: f64) -> (f64, f64) {
    match ctrl {
        Some((x, y)) => (2.0 * cur_x - x, 2.0 * cur_y - y),
        None => (cur_x, cur_y),
    }
}

fn quad_to_cubic(x0: f64, y0: f64, qx: f64, qy: f64, x: f64, y: f64) -> PathSegment {
    let c1x = x0 + (2.0 / 3.0) * (qx - x0);
    let c1y = y0 + (2.0 / 3.0) * (qy - y0);
    let c2x = x + (2.0 / 3.0) * (qx - x);
    let c2y = y + (2.0 / 3.0) * (qy - y);
    PathSegment::CurveTo(c1x, c1y, c2x, c2y, x, y)
}

/// Elliptical arc from the current point to `(x1, y1)`, using the center
/// parameterization from the SVG implementation notes.
#[allow(clippy::too_many_arguments)]
fn arc_to_cubics(
    x0: f64,
    y0: f64,
    rx: f64,
    ry: f64,
    x_axis_rotation_deg: f64,
    large_arc: bool,
    sweep: bool,
    x1: f64,
    y1: f64,
) -> Vec<PathSegment> {
    let mut rx = rx.abs();
    let mut ry = ry.abs();
    if rx == 0.0 || ry == 0.0 {
        return vec![PathSegment::LineTo(x1, y1)];
    }
    if x0 == x1 && y0 == y1 {
        return Vec::new();
    }

    let phi = x_axis_rotation_deg.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();

    let dx2 = (x0 - x1) / 2.0;
    let dy2 = (y0 - y1) / 2.0;
    let x1p = cos_phi * dx2 + sin_phi * dy2;
    let y1p = -sin_phi * dx2 + cos_phi * dy2;

    // Scale radii up when the endpoints are too far apart.
    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let s = lambda.sqrt();
        rx *= s;
        ry *= s;
    }

    let rx2 = rx * rx;
    let ry2 = ry * ry;
    let num = rx2 * ry2 - rx2 * y1p * y1p - ry2 * x1p * x1p;
    let den = rx2 * y1p * y1p + ry2 * x1p * x1p;
    let coef = if den == 0.0 {
        0.0
    } else {
        let sign = if large_arc == sweep { -1.0 } else { 1.0 };
        sign * (num / den).max(0.0).sqrt()
    };
    let cxp = coef * (rx * y1p / ry);
    let cyp = coef * (-ry * x1p / rx);

    let cx = cos_phi * cxp - sin_phi * cyp + (x0 + x1) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (y0 + y1) / 2.0;

    let angle = |ux: f64, uy: f64, vx: f64, vy: f64| (ux * vy - uy * vx).atan2(ux * vx + uy * vy);
    let ux = (x1p - cxp) / rx;
    let uy = (y1p - cyp) / ry;
    let vx = (-x1p - cxp) / rx;
    let vy = (-y1p - cyp) / ry;

    let mut theta = angle(1.0, 0.0, ux, uy);
    let mut sweep_angle = angle(ux, uy, vx, vy);
    if !sweep && sweep_angle > 0.0 {
        sweep_angle -= 2.0 * PI;
    } else if sweep && sweep_angle < 0.0 {
        sweep_angle += 2.0 * PI;
    }

    let count = (sweep_angle.abs() / (PI / 2.0) - 1e-9).ceil().max(1.0) as usize;
    let delta = sweep_angle / count as f64;

    let map = |x: f64, y: f64| {
        let x = rx * x;
        let y = ry * y;
        (cx + cos_phi * x - sin_phi * y, cy + sin_phi * x + cos_phi * y)
    };

    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let t1 = theta;
        let t2 = theta + delta;
        let k = (4.0 / 3.0) * (delta / 4.0).tan();
        let (s1, c1) = t1.sin_cos();
        let (s2, c2) = t2.sin_cos();
        let (c1x, c1y) = map(c1 - k * s1, s1 + k * c1);
        let (c2x, c2y) = map(c2 + k * s2, s2 - k * c2);
        let (ex, ey) = map(c2, s2);
        out.push(PathSegment::CurveTo(c1x, c1y, c2x, c2y, ex, ey));
        theta = t2;
    }

    // Land exactly on the requested endpoint.
    if let Some(PathSegment::CurveTo(_, _, _, _, ex, ey)) = out.last_mut() {
        *ex = x1;
        *ey = y1;
    }
    out
}

/// A full ellipse as four cubic segments, starting at the rightmost point.
pub fn ellipse_segments(cx: f64, cy: f64, rx: f64, ry: f64) -> Vec<PathSegment> {
    let kx = rx * KAPPA;
    let ky = ry * KAPPA;

    vec![
        PathSegment::MoveTo(cx + rx, cy),
        PathSegment::CurveTo(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry),
        PathSegment::CurveTo(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy),
        PathSegment::CurveTo(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry),
        PathSegment::CurveTo(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy),
        PathSegment::ClosePath,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::svg::parse_svg_path;

    fn segments(d: &str) -> Vec<PathSegment> {
        to_segments(&parse_svg_path(d).unwrap()).unwrap()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_relative_and_close() {
        let segs = segments("m 10 10 l 5 0 v 5 h -5 z l 1 1");
        assert_eq!(
            segs,
            vec![
                PathSegment::MoveTo(10.0, 10.0),
                PathSegment::LineTo(15.0, 10.0),
                PathSegment::LineTo(15.0, 15.0),
                PathSegment::LineTo(10.0, 15.0),
                PathSegment::ClosePath,
                PathSegment::LineTo(11.0, 11.0),
            ]
        );
    }

    #[test]
    fn test_smooth_cubic_mirrors_previous_control() {
        let segs = segments("M 0 0 C 0 10 10 10 10 0 S 20 -10 20 0");
        assert_eq!(
            segs[2],
            PathSegment::CurveTo(10.0, -10.0, 20.0, -10.0, 20.0, 0.0)
        );
    }

    #[test]
    fn test_smooth_without_previous_curve_uses_current_point() {
        let segs = segments("M 5 5 S 10 10 15 5");
        assert_eq!(segs[1], PathSegment::CurveTo(5.0, 5.0, 10.0, 10.0, 15.0, 5.0));

        let segs = segments("M 0 0 L 3 0 T 6 0");
        match segs[2] {
            PathSegment::CurveTo(x1, y1, x2, y2, x, y) => {
                assert!(approx(x1, 3.0) && approx(y1, 0.0));
                assert!(approx(x2, 4.0) && approx(y2, 0.0));
                assert_eq!((x, y), (6.0, 0.0));
            }
            other => panic!("expected curve, got {:?}", other),
        }
    }

    #[test]
    fn test_quadratic_raised_to_cubic() {
        let segs = segments("M 0 0 Q 3 3 6 0 T 12 0");
        match segs[1] {
            PathSegment::CurveTo(x1, y1, x2, y2, x, y) => {
                assert!(approx(x1, 2.0) && approx(y1, 2.0));
                assert!(approx(x2, 4.0) && approx(y2, 2.0));
                assert_eq!((x, y), (6.0, 0.0));
            }
            other => panic!("expected curve, got {:?}", other),
        }
        // Reflected control point is (9, -3).
        match segs[2] {
            PathSegment::CurveTo(x1, y1, x2, y2, x, y) => {
                assert!(approx(x1, 8.0) && approx(y1, -2.0));
                assert!(approx(x2, 10.0) && approx(y2, -2.0));
                assert_eq!((x, y), (12.0, 0.0));
            }
            other => panic!("expected curve, got {:?}", other),
        }
    }

    #[test]
    fn test_semicircle_arc_splits_into_two_curves() {
        let segs = segments("M 0 0 A 10 10 0 0 1 20 0");
        assert_eq!(segs.len(), 3, "segments: {:?}", segs);
        match segs[1] {
            PathSegment::CurveTo(_, _, _, _, x, y) => {
                // Sweep flag 1 in y-down space passes through (10, -10).
                assert!(approx(x, 10.0), "x = {}", x);
                assert!(approx(y.abs(), 10.0), "y = {}", y);
            }
            other => panic!("expected curve, got {:?}", other),
        }
        assert!(matches!(segs[2], PathSegment::CurveTo(_, _, _, _, x, y) if x == 20.0 && y == 0.0));
    }

    #[test]
    fn test_quarter_arc_uses_circle_constant() {
        let segs = segments("M 10 0 A 10 10 0 0 1 0 10");
        assert_eq!(segs.len(), 2);
        match segs[1] {
            PathSegment::CurveTo(x1, y1, x2, y2, x, y) => {
                assert!(approx(x1, 10.0) && approx(y1, 10.0 * KAPPA));
                assert!(approx(x2, 10.0 * KAPPA) && approx(y2, 10.0));
                assert_eq!((x, y), (0.0, 10.0));
            }
            other => panic!("expected curve, got {:?}", other),
        }
    }

    #[test]
    fn test_degenerate_arcs() {
        let segs = segments("M 0 0 A 0 5 0 0 1 10 10");
        assert_eq!(segs[1], PathSegment::LineTo(10.0, 10.0));
        let segs = segments("M 3 3 A 5 5 0 0 1 3 3");
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn test_arity_mismatch_is_rejected() {
        let err = to_segments(&[PathCommand::new('L', vec![1.0])]).unwrap_err();
        assert!(matches!(err, QuireError::InvalidPath { position: 0, .. }));
    }

    #[test]
    fn test_ellipse_closes_on_start() {
        let segs = ellipse_segments(0.0, 0.0, 4.0, 2.0);
        assert_eq!(segs.first(), Some(&PathSegment::MoveTo(4.0, 0.0)));
        assert_eq!(segs.last(), Some(&PathSegment::ClosePath));
        assert_eq!(segs.len(), 6);
    }
}
