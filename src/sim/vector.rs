//! Planar vector helpers
//!
//! `glam::DVec2` already covers arithmetic, dot products and normalization.
//! This module adds the angle conventions the collision math relies on:
//! screen space with y growing downward, angles measured clockwise from +x
//! in `[0, 2π)`.

use glam::DVec2;
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Extra operations on `DVec2` used by the geometry code
pub trait VectorExt {
    /// Direction of the vector in radians (`atan2`)
    fn radian(self) -> f64;
    /// Direction of the vector in degrees
    fn degrees(self) -> f64;
    /// 2D cross product (z component of the 3D cross product)
    fn cross(self, other: DVec2) -> f64;
    /// Same direction, new length
    fn with_length(self, length: f64) -> DVec2;
}

impl VectorExt for DVec2 {
    #[inline]
    fn radian(self) -> f64 {
        self.y.atan2(self.x)
    }

    #[inline]
    fn degrees(self) -> f64 {
        self.radian().to_degrees()
    }

    #[inline]
    fn cross(self, other: DVec2) -> f64 {
        self.perp_dot(other)
    }

    fn with_length(self, length: f64) -> DVec2 {
        from_polar(self.radian(), length)
    }
}

/// Angle between two vectors in `[0, π]`
pub fn radian_between(v1: DVec2, v2: DVec2) -> f64 {
    let dot = v1.normalize_or_zero().dot(v2.normalize_or_zero());
    dot.clamp(-1.0, 1.0).acos()
}

/// Vector of the given length pointing along `radian`
#[inline]
pub fn from_polar(radian: f64, length: f64) -> DVec2 {
    DVec2::new(radian.cos() * length, radian.sin() * length)
}

/// Rotate a vector by `radian`
#[inline]
pub fn rotate(v: DVec2, radian: f64) -> DVec2 {
    DVec2::from_angle(radian).rotate(v)
}

/// Angle of the direction `from → to`, normalized to `[0, 2π)`
///
/// Axis-aligned directions are resolved exactly. Coincident points have no
/// direction and resolve to 0.
pub fn compute_angle(from: DVec2, to: DVec2) -> f64 {
    if from == to {
        return 0.0;
    }
    if to.x == from.x {
        return if to.y > from.y { FRAC_PI_2 } else { 1.5 * PI };
    }
    if to.y == from.y {
        return if to.x > from.x { 0.0 } else { PI };
    }
    let angle = (to - from).radian();
    if angle < 0.0 { angle + TAU } else { angle }
}

/// Axis angle from `p1` to `p2` built from `atan(dy / dx)`
///
/// Used for the centre line between two balls. A degenerate slope (0/0)
/// resolves to 0.
pub fn compute_radian(p1: DVec2, p2: DVec2) -> f64 {
    let radian = ((p2.y - p1.y) / (p2.x - p1.x)).atan();
    if radian.is_nan() {
        return 0.0;
    }
    if p1.x < p2.x { radian } else { radian + PI }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_compute_angle_axes() {
        let o = DVec2::ZERO;
        assert_eq!(compute_angle(o, DVec2::new(1.0, 0.0)), 0.0);
        assert_eq!(compute_angle(o, DVec2::new(0.0, 1.0)), FRAC_PI_2);
        assert_eq!(compute_angle(o, DVec2::new(-1.0, 0.0)), PI);
        assert_eq!(compute_angle(o, DVec2::new(0.0, -1.0)), 1.5 * PI);
    }

    #[test]
    fn test_compute_angle_coincident_is_zero() {
        let p = DVec2::new(3.0, 4.0);
        assert_eq!(compute_angle(p, p), 0.0);
    }

    #[test]
    fn test_compute_radian_degenerate_is_zero() {
        let p = DVec2::new(5.0, 5.0);
        assert_eq!(compute_radian(p, p), 0.0);
    }

    #[test]
    fn test_compute_radian_points_from_p1_to_p2() {
        let p1 = DVec2::new(10.0, 10.0);
        let p2 = DVec2::new(0.0, 10.0);
        let axis = from_polar(compute_radian(p1, p2), 1.0);
        assert!((axis - DVec2::new(-1.0, 0.0)).length() < EPS);
    }

    #[test]
    fn test_with_length_keeps_direction() {
        let v = DVec2::new(3.0, 4.0).with_length(10.0);
        assert!((v - DVec2::new(6.0, 8.0)).length() < EPS);
    }

    #[test]
    fn test_cross_and_radian_between() {
        let x = DVec2::X;
        let y = DVec2::Y;
        assert_eq!(x.cross(y), 1.0);
        assert!((radian_between(x, y) - FRAC_PI_2).abs() < EPS);
        assert!((rotate(x, FRAC_PI_2) - y).length() < EPS);
    }

    proptest! {
        #[test]
        fn prop_compute_angle_in_range(
            ax in -500.0f64..500.0, ay in -500.0f64..500.0,
            bx in -500.0f64..500.0, by in -500.0f64..500.0,
        ) {
            let angle = compute_angle(DVec2::new(ax, ay), DVec2::new(bx, by));
            prop_assert!((0.0..TAU).contains(&angle));
        }

        #[test]
        fn prop_compute_angle_matches_direction(
            ax in -500.0f64..500.0, ay in -500.0f64..500.0,
            dx in 1.0f64..100.0, dy in 1.0f64..100.0,
            sx in prop::bool::ANY, sy in prop::bool::ANY,
        ) {
            let from = DVec2::new(ax, ay);
            let delta = DVec2::new(if sx { dx } else { -dx }, if sy { dy } else { -dy });
            let dir = from_polar(compute_angle(from, from + delta), 1.0);
            prop_assert!((dir - delta.normalize()).length() < 1e-6);
        }
    }
}
