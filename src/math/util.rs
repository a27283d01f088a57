use super::{Point2d, Vector2d};
use cgmath::prelude::*;

/// Rotates a vector 90 degrees anti-clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// The angle of a vector measured anti-clockwise from the positive x-axis,
/// normalised into `[0, 2π)`.
pub fn heading(vec: Vector2d) -> f64 {
    let angle = vec.y.atan2(vec.x);
    if angle < 0.0 {
        angle + std::f64::consts::TAU
    } else {
        angle
    }
}

/// Linearly interpolates along a polyline of equidistant points.
///
/// # Parameters
/// * `points` - The points, `step` apart
/// * `step` - The distance between consecutive points
/// * `dist` - The distance along the polyline to sample
pub fn sample_polyline(points: &[Point2d], step: f64, dist: f64) -> Option<Point2d> {
    let first = *points.first()?;
    if points.len() == 1 || step <= 0.0 || dist <= 0.0 {
        return Some(first);
    }
    let idx = (dist / step).floor() as usize;
    if idx + 1 >= points.len() {
        return points.last().copied();
    }
    // The final point may be closer than `step` to its predecessor
    let (a, b) = (points[idx], points[idx + 1]);
    let span = a.distance(b);
    if span <= 0.0 {
        return Some(b);
    }
    let t = f64::min((dist - idx as f64 * step) / span, 1.0);
    Some(a + (b - a) * t)
}
