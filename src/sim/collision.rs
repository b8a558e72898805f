//! Collision detection for a ball against the table
//!
//! Every obstacle is treated as a circle. Pillars are real circles; walls and
//! roof segments are modelled as huge virtual circles (`WALL_RADIUS`) placed
//! just behind the surface, so the engine can resolve every hit with the same
//! normal/tangent decomposition.

use glam::DVec2;

use super::state::{Pillar, RoofShape, TableConfig};
use super::vector::{compute_angle, from_polar};
use crate::consts::WALL_RADIUS;

/// What the ball touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Pillar(u32),
    Wall,
}

/// Result of a collision check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub kind: ContactKind,
    /// Centre of the struck circle (virtual for walls)
    pub center: DVec2,
    /// Radius of the struck circle
    pub radius: f64,
    /// Unit surface normal pointing from the obstacle toward the ball
    pub normal: DVec2,
    /// Overlap depth (for position correction)
    pub penetration: f64,
}

impl Contact {
    /// Contact between the ball and a circle, normal along the centre line
    pub fn circle(kind: ContactKind, ball_pos: DVec2, ball_radius: f64, center: DVec2, radius: f64) -> Self {
        Self {
            kind,
            center,
            radius,
            normal: from_polar(compute_angle(center, ball_pos), 1.0),
            penetration: ball_radius + radius - center.distance(ball_pos),
        }
    }

    /// A hit only counts as an impact when the ball moves into the obstacle.
    /// A ball already separating is left alone so an unresolved overlap does
    /// not bounce it back and forth.
    #[inline]
    pub fn is_approaching(&self, velocity: DVec2) -> bool {
        self.normal.dot(velocity) < 0.0
    }
}

/// Two circles touch or overlap
#[inline]
pub fn is_two_circle_hit(p1: DVec2, p2: DVec2, r1: f64, r2: f64) -> bool {
    let radius_sum = r1 + r2;
    p1.distance_squared(p2) <= radius_sum * radius_sum
}

/// First pillar overlapping the ball, in list order
pub fn pillar_hit(ball_pos: DVec2, ball_radius: f64, pillars: &[Pillar]) -> Option<Contact> {
    pillars
        .iter()
        .find(|p| is_two_circle_hit(ball_pos, p.position, ball_radius, p.radius))
        .map(|p| Contact::circle(ContactKind::Pillar(p.id), ball_pos, ball_radius, p.position, p.radius))
}

/// Normalized ellipse equation: < 1 inside, 1 on the curve, > 1 outside
#[inline]
fn ellipse_level(p: DVec2, center: DVec2, a: f64, b: f64) -> f64 {
    let d = p - center;
    (d.x * d.x) / (a * a) + (d.y * d.y) / (b * b)
}

/// Elliptic roof whose semi-axes are `center.x` and `center.y`
///
/// The ball touches the curve when its centre lies between the ellipse
/// inflated by the ball radius and the one deflated by it. Only the upper
/// half of the ellipse is a wall.
pub fn ellipse_roof_hit(ball_pos: DVec2, ball_radius: f64, center: DVec2) -> Option<Contact> {
    let (a, b) = (center.x, center.y);
    let outer = ellipse_level(ball_pos, center, a + ball_radius, b + ball_radius);
    let inner = ellipse_level(ball_pos, center, a - ball_radius, b - ball_radius);
    let angle = compute_angle(ball_pos, center);
    if !(inner >= 1.0 && outer <= 1.0 && (0.0..std::f64::consts::PI).contains(&angle)) {
        return None;
    }

    // Point where the centre→ball ray meets the ellipse: tan(t) = tan(p)·a/b
    let d = ball_pos - center;
    let t = (d.y * a).atan2(d.x * b);
    let tangent_point = center + DVec2::new(a * t.cos(), b * t.sin());

    // Gradient of the implicit equation is the outward normal of the tangent line
    let outward = DVec2::new(
        (tangent_point.x - center.x) / (a * a),
        (tangent_point.y - center.y) / (b * b),
    )
    .normalize_or_zero();
    if outward == DVec2::ZERO {
        return None;
    }

    let inside_distance = (tangent_point - ball_pos).dot(outward);
    Some(Contact {
        kind: ContactKind::Wall,
        center: tangent_point + outward * WALL_RADIUS,
        radius: WALL_RADIUS,
        normal: -outward,
        penetration: (ball_radius - inside_distance).max(0.0),
    })
}

/// Slanted left wall from `line[0]` to `line[1]`
///
/// `field_center` decides which side of the line is the playing field.
pub fn trapezoid_roof_hit(
    ball_pos: DVec2,
    ball_radius: f64,
    line: [DVec2; 2],
    field_center: DVec2,
) -> Option<Contact> {
    let [start, end] = line;
    let span = end - start;
    let length = span.length();
    if length <= f64::EPSILON {
        return None;
    }
    let dir = span / length;

    let along = (ball_pos - start).dot(dir) / length;
    if !(0.0..=1.0).contains(&along) {
        return None;
    }

    let perp = dir.perp();
    let inward = if perp.dot(field_center - start) >= 0.0 { perp } else { -perp };
    let distance = (ball_pos - start).dot(inward);
    if distance > ball_radius {
        return None;
    }

    let foot = ball_pos - inward * distance;
    Some(Contact {
        kind: ContactKind::Wall,
        center: foot - inward * WALL_RADIUS,
        radius: WALL_RADIUS,
        normal: inward,
        penetration: ball_radius - distance,
    })
}

/// Rounded top-left corner centred at `(corner_radius, corner_radius)`
pub fn quarter_circle_hit(ball_pos: DVec2, ball_radius: f64, corner_radius: f64) -> Option<Contact> {
    let corner = DVec2::splat(corner_radius);
    let distance = ball_pos.distance(corner);
    let angle = compute_angle(ball_pos, corner);
    let in_quadrant = (0.0..=std::f64::consts::FRAC_PI_2).contains(&angle);
    let in_band = distance <= corner_radius + ball_radius && distance >= corner_radius - ball_radius;
    if !(in_quadrant && in_band) {
        return None;
    }

    let virtual_center = corner - from_polar(angle, WALL_RADIUS + corner_radius);
    Some(Contact::circle(ContactKind::Wall, ball_pos, ball_radius, virtual_center, WALL_RADIUS))
}

/// Axis-aligned left, right and top edges of the field
pub fn rectangle_wall_hit(ball_pos: DVec2, ball_radius: f64, width: f64) -> Option<Contact> {
    let virtual_center = if ball_pos.x - ball_radius <= 0.0 {
        DVec2::new(-WALL_RADIUS, ball_pos.y)
    } else if ball_pos.x + ball_radius >= width {
        DVec2::new(width + WALL_RADIUS, ball_pos.y)
    } else if ball_pos.y - ball_radius <= 0.0 {
        DVec2::new(ball_pos.x, -WALL_RADIUS)
    } else {
        return None;
    };
    Some(Contact::circle(ContactKind::Wall, ball_pos, ball_radius, virtual_center, WALL_RADIUS))
}

/// First-priority contact for a ball at `ball_pos`
///
/// Pillars win over walls. The roof shape is tested next; the rectangular
/// edges bound every table and are checked last.
pub fn detect(ball_pos: DVec2, ball_radius: f64, table: &TableConfig) -> Option<Contact> {
    if let Some(contact) = pillar_hit(ball_pos, ball_radius, &table.pillars) {
        return Some(contact);
    }

    let roof = match table.roof {
        RoofShape::Rectangle => None,
        RoofShape::Ellipse { center } => ellipse_roof_hit(ball_pos, ball_radius, center),
        RoofShape::Trapezoid { left_line } => {
            trapezoid_roof_hit(ball_pos, ball_radius, left_line, table.field_center())
        }
        RoofShape::QuarterCircle { corner_radius } => quarter_circle_hit(ball_pos, ball_radius, corner_radius),
    };

    roof.or_else(|| rectangle_wall_hit(ball_pos, ball_radius, table.collision_zone_width))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn table_with(roof: RoofShape, pillars: Vec<Pillar>) -> TableConfig {
        TableConfig {
            pillars,
            roof,
            ..Default::default()
        }
    }

    #[test]
    fn test_pillar_normal_points_at_ball() {
        let pillars = vec![Pillar::new(7, 100.0, 100.0, 10.0)];
        let ball = DVec2::new(100.0, 85.0);
        let contact = pillar_hit(ball, 10.0, &pillars).unwrap();
        assert_eq!(contact.kind, ContactKind::Pillar(7));
        assert!((contact.normal - DVec2::new(0.0, -1.0)).length() < EPS);
        assert!((contact.penetration - 5.0).abs() < EPS);
    }

    #[test]
    fn test_first_pillar_wins() {
        let pillars = vec![Pillar::new(1, 100.0, 100.0, 10.0), Pillar::new(2, 100.0, 100.0, 10.0)];
        let contact = detect(DVec2::new(100.0, 90.0), 5.0, &table_with(RoofShape::Rectangle, pillars)).unwrap();
        assert_eq!(contact.kind, ContactKind::Pillar(1));
    }

    #[test]
    fn test_rectangle_walls() {
        let table = table_with(RoofShape::Rectangle, vec![]);
        let left = detect(DVec2::new(4.0, 300.0), 10.0, &table).unwrap();
        assert!((left.normal - DVec2::X).length() < EPS);
        assert!((left.penetration - 6.0).abs() < 1e-6);

        let right = detect(DVec2::new(355.0, 300.0), 10.0, &table).unwrap();
        assert!((right.normal + DVec2::X).length() < EPS);

        let top = detect(DVec2::new(180.0, 3.0), 10.0, &table).unwrap();
        assert!((top.normal - DVec2::Y).length() < EPS);

        assert!(detect(DVec2::new(180.0, 300.0), 10.0, &table).is_none());
    }

    #[test]
    fn test_ellipse_roof_upper_half_only() {
        let center = DVec2::new(155.0, 52.0);
        // Near the top of the curve
        let top = ellipse_roof_hit(DVec2::new(155.0, 5.0), 10.0, center).unwrap();
        assert!(top.normal.y > 0.99);
        assert!((top.penetration - 5.0).abs() < 1e-6);
        // Near the bottom of the curve: not a wall
        assert!(ellipse_roof_hit(DVec2::new(155.0, 99.0), 10.0, center).is_none());
        // Deep inside the ellipse
        assert!(ellipse_roof_hit(center, 10.0, center).is_none());
    }

    #[test]
    fn test_ellipse_roof_right_shoulder_normal_points_inward() {
        let center = DVec2::new(155.0, 52.0);
        let t: f64 = -0.6;
        let on_curve = center + DVec2::new(155.0 * t.cos(), 52.0 * t.sin());
        let ball = on_curve + (center - on_curve).normalize() * 4.0;
        let contact = ellipse_roof_hit(ball, 10.0, center).unwrap();
        assert!(contact.normal.dot(center - ball) > 0.0);
    }

    #[test]
    fn test_trapezoid_wall() {
        let line = [DVec2::new(30.0, 0.0), DVec2::new(0.0, 200.0)];
        let table = table_with(RoofShape::Trapezoid { left_line: line }, vec![]);
        // Point on the line at y=100 is x=15; ball just right of it
        let contact = detect(DVec2::new(20.0, 100.0), 10.0, &table).unwrap();
        assert!(contact.normal.x > 0.0);
        assert!(contact.penetration > 0.0);
        assert!(detect(DVec2::new(60.0, 100.0), 10.0, &table).is_none());
    }

    #[test]
    fn test_quarter_circle_corner() {
        let contact = quarter_circle_hit(DVec2::new(35.0, 35.0), 10.0, 100.0).unwrap();
        // Normal points back toward the corner centre
        assert!(contact.normal.x > 0.0 && contact.normal.y > 0.0);
        // Inside the rounded area: no contact
        assert!(quarter_circle_hit(DVec2::new(60.0, 60.0), 10.0, 100.0).is_none());
        // Outside the first quadrant (below the corner centre)
        assert!(quarter_circle_hit(DVec2::new(5.0, 150.0), 10.0, 100.0).is_none());
    }

    #[test]
    fn test_approaching() {
        let contact = Contact::circle(ContactKind::Wall, DVec2::new(5.0, 0.0), 10.0, DVec2::ZERO, 1.0);
        assert!(contact.is_approaching(DVec2::new(-1.0, 0.0)));
        assert!(!contact.is_approaching(DVec2::new(1.0, 0.0)));
    }

    proptest! {
        #[test]
        fn prop_two_circle_hit_matches_distance(
            x1 in -1000.0f64..1000.0, y1 in -1000.0f64..1000.0,
            x2 in -1000.0f64..1000.0, y2 in -1000.0f64..1000.0,
            r1 in 0.0f64..100.0, r2 in 0.0f64..100.0,
        ) {
            let (p1, p2) = (DVec2::new(x1, y1), DVec2::new(x2, y2));
            let distance = p1.distance(p2);
            // Skip the razor-thin boundary where sqrt rounding decides
            prop_assume!((distance - (r1 + r2)).abs() > 1e-9);
            prop_assert_eq!(is_two_circle_hit(p1, p2, r1, r2), distance <= r1 + r2);
        }

        #[test]
        fn prop_circle_contact_normal_is_unit(
            bx in -100.0f64..100.0, by in -100.0f64..100.0,
            cx in -100.0f64..100.0, cy in -100.0f64..100.0,
        ) {
            let c = Contact::circle(ContactKind::Wall, DVec2::new(bx, by), 5.0, DVec2::new(cx, cy), 5.0);
            prop_assert!((c.normal.length() - 1.0).abs() < 1e-9);
        }
    }
}
