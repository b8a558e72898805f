//! Engine-owned ball with anchored closed-form motion
//!
//! Position and velocity are never accumulated tick by tick. Each ball keeps
//! an anchor (position, velocity, acceleration) and the number of ticks since
//! that anchor, and evaluates the kinematic equations from scratch. The
//! anchor is moved whenever the motion law changes (a bounce, an overlap
//! push-out, a new acceleration).

use glam::DVec2;

use super::state::BallConfig;

/// A ball entity inside one simulation run
#[derive(Debug, Clone)]
pub struct Ball {
    pub id: u32,
    pub radius: f64,
    pub mass: f64,
    pub collision_decay: f64,
    pub gravity_scale: f64,
    pub position: DVec2,
    pub velocity: DVec2,
    /// Touched an obstacle on the previous tick (edge-triggers collision reports)
    pub is_colliding: bool,
    ticks: u32,
    anchor_position: DVec2,
    anchor_velocity: DVec2,
    acceleration: DVec2,
}

impl Ball {
    pub fn new(id: u32, config: &BallConfig) -> Self {
        Self {
            id,
            radius: config.radius,
            mass: config.mass,
            collision_decay: config.collision_decay,
            gravity_scale: config.gravity_scale,
            position: config.position,
            velocity: config.velocity,
            is_colliding: false,
            ticks: 0,
            anchor_position: config.position,
            anchor_velocity: config.velocity,
            acceleration: DVec2::new(0.0, config.gravity_scale),
        }
    }

    /// Downward gravity for this ball
    #[inline]
    pub fn gravity(&self) -> DVec2 {
        DVec2::new(0.0, self.gravity_scale)
    }

    /// Re-anchor the motion at the given state
    pub fn reset_verlet(&mut self, position: DVec2, velocity: DVec2, acceleration: DVec2) {
        self.ticks = 0;
        self.position = position;
        self.velocity = velocity;
        self.anchor_position = position;
        self.anchor_velocity = velocity;
        self.acceleration = acceleration;
    }

    /// Re-anchor keeping gravity as the acceleration
    pub fn rebase(&mut self, position: DVec2, velocity: DVec2) {
        self.reset_verlet(position, velocity, self.gravity());
    }

    /// Advance one tick and return the new position and velocity
    pub fn next_frame(&mut self, time_scale: f64) -> (DVec2, DVec2) {
        self.ticks += 1;
        let t = f64::from(self.ticks) * time_scale;
        self.position = self.anchor_position + self.anchor_velocity * t + 0.5 * self.acceleration * t * t;
        self.velocity = self.anchor_velocity + self.acceleration * t;
        (self.position, self.velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ball_at(position: DVec2, velocity: DVec2, gravity_scale: f64) -> Ball {
        Ball::new(
            0,
            &BallConfig {
                position,
                velocity,
                gravity_scale,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_closed_form_matches_kinematics() {
        let mut ball = ball_at(DVec2::new(10.0, 20.0), DVec2::new(2.0, -3.0), 0.5);
        for _ in 0..10 {
            ball.next_frame(1.0);
        }
        // p = p0 + v0 t + a t² / 2 at t = 10
        assert!((ball.position - DVec2::new(30.0, 15.0)).length() < 1e-9);
        assert!((ball.velocity - DVec2::new(2.0, 2.0)).length() < 1e-9);
    }

    #[test]
    fn test_reset_restarts_clock() {
        let mut ball = ball_at(DVec2::ZERO, DVec2::ZERO, 1.0);
        ball.next_frame(1.0);
        ball.next_frame(1.0);
        ball.rebase(DVec2::new(5.0, 5.0), DVec2::new(1.0, 0.0));
        let (p, v) = ball.next_frame(1.0);
        assert!((p - DVec2::new(6.0, 5.5)).length() < 1e-9);
        assert!((v - DVec2::new(1.0, 1.0)).length() < 1e-9);
    }

    #[test]
    fn test_time_scale() {
        let mut ball = ball_at(DVec2::ZERO, DVec2::new(1.0, 0.0), 0.0);
        ball.next_frame(0.5);
        assert!((ball.position.x - 0.5).abs() < 1e-12);
    }
}
