//! Fixed-tick ball simulation
//!
//! `Engine` only holds immutable configuration. Every call builds a fresh
//! simulation context, so an engine can be shared freely between the live
//! game, speculative searches and offline analysis.

use glam::DVec2;

use super::ball::Ball;
use super::collision::{self, Contact, ContactKind, is_two_circle_hit};
use super::state::{BallConfig, BallLifetime, Collision, EngineConfig, Frame, FrameBall, SimulateRecord};
use super::vector::{compute_radian, from_polar};
use crate::error::EngineError;

/// Most balls a single run can hold
pub const MAX_BALLS: usize = 2;

/// Velocity after bouncing off a surface with the given unit normal
///
/// The normal component is reversed and scaled by `decay`, the tangential
/// component is kept.
pub fn collision_response(velocity: DVec2, normal: DVec2, decay: f64) -> DVec2 {
    let tangent = DVec2::new(normal.y, -normal.x);
    normal * (-normal.dot(velocity) * decay) + tangent * tangent.dot(velocity)
}

/// Velocities of two balls after a collision
///
/// Components along the centre line are exchanged (equal masses) or follow
/// the 1-D elastic collision formula; perpendicular components are kept.
pub fn two_ball_response(b1: &Ball, b2: &Ball) -> (DVec2, DVec2) {
    let radian = compute_radian(b1.position, b2.position);
    let axis = from_polar(radian, 1.0);
    let perp = from_polar(radian + std::f64::consts::FRAC_PI_2, 1.0);

    let u1 = b1.velocity.dot(axis);
    let u2 = b2.velocity.dot(axis);
    let (m1, m2) = (b1.mass, b2.mass);

    let (w1, w2) = if m1 == m2 {
        (u2, u1)
    } else {
        (
            (u1 * (m1 - m2) + 2.0 * m2 * u2) / (m1 + m2),
            (u2 * (m2 - m1) + 2.0 * m1 * u1) / (m1 + m2),
        )
    };

    (
        axis * w1 + perp * b1.velocity.dot(perp),
        axis * w2 + perp * b2.velocity.dot(perp),
    )
}

fn contact_to_collision(contact: &Contact, ball_id: u32) -> Collision {
    match contact.kind {
        ContactKind::Pillar(pillar_id) => Collision::Pillar { ball_id, pillar_id },
        ContactKind::Wall => Collision::Wall { ball_id },
    }
}

fn bounce_off_landed(ball: &mut Ball, landed: &Ball) {
    let normal = (ball.position - landed.position).normalize_or_zero();
    if normal.dot(ball.velocity) < 0.0 {
        let velocity = collision_response(ball.velocity, normal, ball.collision_decay);
        ball.rebase(ball.position, velocity);
    }
}

/// Mutable state of one `simulate` run
struct SimulationContext<'a> {
    config: &'a EngineConfig,
    frames: Vec<Frame>,
    /// (ball id, first active frame, frame it landed)
    life_times: Vec<(u32, usize, Option<usize>)>,
    balls_touching: bool,
}

impl<'a> SimulationContext<'a> {
    fn new(config: &'a EngineConfig, max_ticks: usize) -> Self {
        Self {
            config,
            frames: Vec::with_capacity(max_ticks.min(4096)),
            life_times: Vec::new(),
            balls_touching: false,
        }
    }

    fn has_ended(&self, id: u32) -> bool {
        self.life_times
            .iter()
            .any(|(ball_id, _, end)| *ball_id == id && end.is_some())
    }

    fn ended_count(&self) -> usize {
        self.life_times.iter().filter(|(_, _, end)| end.is_some()).count()
    }

    fn mark_active(&mut self, id: u32, frame: usize) {
        if !self.life_times.iter().any(|(ball_id, _, _)| *ball_id == id) {
            self.life_times.push((id, frame, None));
        }
    }

    fn mark_ended(&mut self, id: u32, frame: usize) {
        if let Some(entry) = self.life_times.iter_mut().find(|(ball_id, _, _)| *ball_id == id) {
            entry.2 = Some(frame);
        }
    }

    /// Advance one ball and resolve its contact with the table
    fn step_ball(&self, ball: &mut Ball) -> Option<Collision> {
        let (mut position, mut velocity) = ball.next_frame(self.config.time_scale);
        let contact = collision::detect(position, ball.radius, &self.config.table);
        let was_colliding = ball.is_colliding;

        if let Some(contact) = &contact {
            let mut moved = false;
            if contact.is_approaching(velocity) && (!self.config.allow_overlap || !was_colliding) {
                velocity = collision_response(velocity, contact.normal, ball.collision_decay);
                moved = true;
            }
            if !self.config.allow_overlap {
                position += contact.normal * contact.penetration;
                moved = true;
            }
            if moved {
                ball.rebase(position, velocity);
            }
        }

        ball.is_colliding = contact.is_some();
        if was_colliding {
            None
        } else {
            contact.map(|c| contact_to_collision(&c, ball.id))
        }
    }

    /// Ball-ball contact, resolved once per contact while the balls touch
    ///
    /// A landed ball stays where it stopped and acts as a fixed obstacle.
    fn step_pair(&mut self, balls: &mut [Ball]) -> Option<Collision> {
        let [b1, b2] = balls else {
            return None;
        };
        let (ended1, ended2) = (self.has_ended(b1.id), self.has_ended(b2.id));
        if ended1 && ended2 {
            self.balls_touching = false;
            return None;
        }
        let hit = is_two_circle_hit(b1.position, b2.position, b1.radius, b2.radius);
        let first_contact = hit && !self.balls_touching;
        if first_contact {
            match (ended1, ended2) {
                (true, _) => bounce_off_landed(b2, b1),
                (_, true) => bounce_off_landed(b1, b2),
                _ => {
                    let (v1, v2) = two_ball_response(b1, b2);
                    b1.rebase(b1.position, v1);
                    b2.rebase(b2.position, v2);
                }
            }
        }
        self.balls_touching = hit;
        first_contact.then(|| Collision::Ball {
            ball_ids: [b1.id, b2.id],
        })
    }

    fn step(&mut self, balls: &mut [Ball]) {
        let index = self.frames.len();
        let reward_line = self.config.table.reward_line();
        let mut collisions = Vec::new();

        for ball in balls.iter_mut() {
            if self.has_ended(ball.id) {
                continue;
            }
            self.mark_active(ball.id, index);
            if let Some(collision) = self.step_ball(ball) {
                collisions.push(collision);
            }
            if ball.position.y > reward_line {
                self.mark_ended(ball.id, index);
            }
        }

        if balls.len() == MAX_BALLS
            && let Some(collision) = self.step_pair(balls)
        {
            collisions.push(collision);
        }

        let record_velocity = self.config.record_velocity;
        self.frames.push(Frame {
            balls: balls
                .iter()
                .map(|b| FrameBall {
                    id: b.id,
                    position: b.position,
                    velocity: record_velocity.then_some(b.velocity),
                })
                .collect(),
            collisions,
        });
    }

    fn finish(self, ball_count: usize) -> SimulateRecord {
        let last = self.frames.len().saturating_sub(1);
        let is_end = self.ended_count() >= ball_count;
        SimulateRecord {
            balls_life_time: self
                .life_times
                .iter()
                .map(|&(id, start, end)| BallLifetime {
                    id,
                    start,
                    end: end.unwrap_or(last),
                })
                .collect(),
            frames: self.frames,
            is_end,
        }
    }
}

/// Deterministic table simulator
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    /// Create an engine, rejecting unusable geometry
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ball config with this engine's default decay and gravity
    pub fn default_ball(&self) -> BallConfig {
        BallConfig {
            collision_decay: self.config.default_collision_decay,
            gravity_scale: self.config.default_gravity_scale,
            ..BallConfig::default()
        }
    }

    /// Where the ball rests on the spring, compressed by `spring_compress`
    pub fn launch_start_position(&self, spring_compress: f64, ball_radius: f64) -> DVec2 {
        let t = &self.config.table;
        DVec2::new(
            t.collision_zone_width + t.baffle_width + t.track_zone_width / 2.0,
            t.view_height - t.spring_height + spring_compress - ball_radius,
        )
    }

    /// Where the ball enters the obstacle field after leaving the track
    pub fn launch_end_position(&self, ball_radius: f64) -> DVec2 {
        let t = &self.config.table;
        DVec2::new(
            t.collision_zone_width - ball_radius,
            t.view_height - t.track_zone_height + t.track_zone_width / 2.0,
        )
    }

    /// Simulate one or two balls until all land or `max_ticks` frames exist
    pub fn simulate(&self, configs: &[BallConfig], max_ticks: usize) -> Result<SimulateRecord, EngineError> {
        match configs.len() {
            0 => return Err(EngineError::NoBalls),
            n if n > MAX_BALLS => return Err(EngineError::TooManyBalls(n)),
            _ => {}
        }
        for config in configs {
            config.validate()?;
        }

        let mut balls: Vec<Ball> = configs
            .iter()
            .zip(0u32..)
            .map(|(config, id)| Ball::new(id, config))
            .collect();

        let mut ctx = SimulationContext::new(&self.config, max_ticks);
        while ctx.frames.len() < max_ticks && ctx.ended_count() < balls.len() {
            ctx.step(&mut balls);
        }
        Ok(ctx.finish(balls.len()))
    }

    /// Frames of the ball travelling from the spring into the field
    ///
    /// Integrated backward in time from the launch end position: leaving the
    /// field along the top, then folding down the launch track after one
    /// reflection off the baffle, until the spring is reached. Frames are
    /// returned in playback order.
    pub fn simulate_ball_launch(
        &self,
        config: &BallConfig,
        final_x_velocity: f64,
        spring_compress: f64,
        max_ticks: usize,
    ) -> SimulateRecord {
        let time_scale = self.config.time_scale;
        let record_velocity = self.config.record_velocity;
        let mut ball = Ball::new(0, config);
        let end = self.launch_end_position(ball.radius);
        let start = self.launch_start_position(spring_compress, ball.radius);
        let fold_x = start.x;
        let reverse_gravity = DVec2::new(ball.gravity_scale, 0.0);

        ball.reset_verlet(end, DVec2::new(-final_x_velocity, 0.0), reverse_gravity);

        let mut frames = Vec::new();
        let mut reached_spring = false;
        while frames.len() < max_ticks {
            let (position, velocity) = ball.next_frame(time_scale);
            let folded = position.x > fold_x;
            let on_screen = if folded {
                DVec2::new(fold_x, end.y + position.x - fold_x)
            } else {
                DVec2::new(position.x, end.y)
            };
            if on_screen.y > start.y {
                reached_spring = true;
                break;
            }

            let mut collisions = Vec::new();
            if folded && !ball.is_colliding {
                // Undo the baffle decay: going backward the ball speeds up
                let decay = if ball.collision_decay > 0.0 { ball.collision_decay } else { 1.0 };
                ball.reset_verlet(position, velocity / decay, reverse_gravity);
                ball.is_colliding = true;
                collisions.push(Collision::Baffle { ball_id: ball.id });
            }

            let forward_velocity = if folded {
                DVec2::new(0.0, -velocity.x)
            } else {
                DVec2::new(-velocity.x, 0.0)
            };
            frames.push(Frame {
                balls: vec![FrameBall {
                    id: ball.id,
                    position: on_screen,
                    velocity: record_velocity.then_some(forward_velocity),
                }],
                collisions,
            });
        }
        frames.reverse();

        let end_index = frames.len().saturating_sub(1);
        SimulateRecord {
            frames,
            balls_life_time: vec![BallLifetime {
                id: ball.id,
                start: 0,
                end: end_index,
            }],
            is_end: reached_spring,
        }
    }

    /// Frames of an under-powered launch that falls back onto the spring
    ///
    /// `start_y_velocity_ratio` in `0..=1` interpolates the launch speed
    /// between a weak hop and just below what clears the track.
    pub fn simulate_ball_launch_fail(
        &self,
        config: &BallConfig,
        start_y_velocity_ratio: f64,
        spring_compress: f64,
        max_collision_time: u32,
        max_ticks: usize,
    ) -> Vec<Frame> {
        let t = &self.config.table;
        let time_scale = self.config.time_scale;
        let record_velocity = self.config.record_velocity;
        let mut ball = Ball::new(0, config);
        let g = ball.gravity_scale;

        let max_speed = 0.9 * (2.0 * (t.track_zone_height - t.spring_height - 2.0 * ball.radius) * g).max(0.0).sqrt();
        let min_speed = 1.2 * (2.0 * spring_compress * g).max(0.0).sqrt();
        let floor_y = t.view_height - t.spring_height - ball.radius;
        let start = self.launch_start_position(spring_compress, ball.radius);

        ball.rebase(
            start,
            DVec2::new(0.0, -(min_speed + start_y_velocity_ratio * (max_speed - min_speed))),
        );

        let mut frames = Vec::new();
        let mut bounces = 0;
        while frames.len() < max_ticks && bounces < max_collision_time {
            let incoming_velocity = ball.next_frame(time_scale).1;
            let (mut position, mut velocity) = (ball.position, incoming_velocity);
            let mut collisions = Vec::new();

            if position.y >= floor_y && velocity.y > 0.0 {
                bounces += 1;
                position = DVec2::new(start.x, floor_y);
                velocity = DVec2::new(0.0, -velocity.y * ball.collision_decay);
                collisions.push(Collision::Wall { ball_id: ball.id });

                let settled = velocity.y.abs() < crate::consts::REST_SPEED
                    || incoming_velocity.y * velocity.y >= 0.0;
                if settled {
                    frames.push(Frame {
                        balls: vec![FrameBall {
                            id: ball.id,
                            position,
                            velocity: record_velocity.then_some(velocity),
                        }],
                        collisions: Vec::new(),
                    });
                    break;
                }
            }

            ball.is_colliding = !collisions.is_empty();
            if ball.is_colliding {
                ball.rebase(position, velocity);
            }

            frames.push(Frame {
                balls: vec![FrameBall {
                    id: ball.id,
                    position,
                    velocity: record_velocity.then_some(velocity),
                }],
                collisions,
            });
        }
        frames
    }
}
