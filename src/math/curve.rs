use super::{Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector2d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }
}

impl<T: ParametricCurve2d + ?Sized> ParametricCurve2d for &T {
    fn sample(&self, t: f64) -> Point2d {
        (**self).sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        (**self).bounds()
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        (**self).sample_dt(t)
    }
}

/// A straight line between two points.
#[derive(Copy, Clone, Debug)]
pub struct LineSegment2d {
    start: Point2d,
    end: Point2d,
}

impl LineSegment2d {
    /// Creates a line segment from its end points.
    pub const fn from_ends(start: Point2d, end: Point2d) -> Self {
        Self { start, end }
    }

    /// The length of the line segment.
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

impl ParametricCurve2d for LineSegment2d {
    fn sample(&self, t: f64) -> Point2d {
        self.start + (self.end - self.start) * t
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }

    fn sample_dt(&self, _t: f64) -> Vector2d {
        self.end - self.start
    }
}

/// Samples points `dist` apart along the curve, and measures the curve's length.
/// The final point may be closer than `dist` to its predecessor.
pub fn equidistant_points_along_curve(
    curve: &impl ParametricCurve2d,
    dist: f64,
) -> (Vec<Point2d>, f64) {
    let end_ts = curve.bounds();
    let end_ps = [curve.sample(end_ts.min), curve.sample(end_ts.max)];

    let mut ts = end_ts;
    let mut ps = end_ps;
    let mut dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());

    let mut points = vec![end_ps[0]];
    let mut last_p = end_ps[0];
    let mut length = 0.0;

    while dists.max > dist {
        let mut iterations = 0;
        loop {
            iterations += 1;
            let new_t = ts.lerp(dists.inv_lerp(dist));
            let new_p = curve.sample(new_t);
            let new_dist = (new_p - last_p).magnitude();
            let f = new_dist / dist;

            if f < 0.99 && iterations < 64 {
                ts.min = new_t;
                ps[0] = new_p;
                dists.min = new_dist;
            } else if f > 1.01 && iterations < 64 {
                ts.max = new_t;
                ps[1] = new_p;
                dists.max = new_dist;
            } else {
                // Append the point
                points.push(new_p);
                length += new_dist;
                last_p = new_p;

                // Setup for the next iteration
                ts = Interval::new(new_t, end_ts.max);
                ps = [new_p, end_ps[1]];
                dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());

                break;
            }
        }
    }

    let end_magnitude = (end_ps[1] - last_p).magnitude();
    if end_magnitude > 0.001 * dist {
        length += end_magnitude;
        points.push(end_ps[1]);
    }

    (points, length)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::QuadraticBezier2d;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn straight_line_length() {
        let line = LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(10.0, 0.0));
        let (points, length) = equidistant_points_along_curve(&line, 0.5);
        assert_approx_eq!(length, 10.0, 0.05);
        assert_eq!(points.len(), 21);
    }

    #[test]
    fn quarter_turn_length() {
        // Approximates a quarter circle of radius 10
        let curve = QuadraticBezier2d::new(&[
            Point2d::new(10.0, 0.0),
            Point2d::new(10.0, 10.0),
            Point2d::new(0.0, 10.0),
        ]);
        let (_, length) = equidistant_points_along_curve(&curve, 0.25);
        assert!(length > 15.5 && length < 16.5, "length was {}", length);
    }

    #[test]
    fn degenerate_curve() {
        let p = Point2d::new(3.0, 4.0);
        let line = LineSegment2d::from_ends(p, p);
        let (points, length) = equidistant_points_along_curve(&line, 0.5);
        assert_eq!(points.len(), 1);
        assert_eq!(length, 0.0);
    }
}
