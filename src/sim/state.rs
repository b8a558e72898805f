//! Simulation data model
//!
//! Table geometry, ball parameters and the recorded output of a run. All of
//! it is plain serializable data; the behaviour lives in `engine`.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A static round obstacle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pillar {
    pub id: u32,
    pub position: DVec2,
    pub radius: f64,
}

impl Pillar {
    pub fn new(id: u32, x: f64, y: f64, radius: f64) -> Self {
        Self {
            id,
            position: DVec2::new(x, y),
            radius,
        }
    }
}

/// Shape of the upper-left boundary of the table
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RoofShape {
    /// Plain axis-aligned walls
    #[default]
    Rectangle,
    /// Slanted left wall through two points
    Trapezoid { left_line: [DVec2; 2] },
    /// Rounded top-left corner of the given radius
    QuarterCircle { corner_radius: f64 },
    /// Elliptic roof; the semi-axes equal `center.x` and `center.y` so the
    /// ellipse touches the left and top edges
    Ellipse { center: DVec2 },
}

/// Table geometry, immutable for the lifetime of an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Total table height
    pub view_height: f64,
    /// Height of the reward strip; a ball crossing into it is finished
    pub reward_height: f64,
    /// Width of the obstacle field
    pub collision_zone_width: f64,
    /// Width of the baffle between the field and the launch track
    pub baffle_width: f64,
    /// Width of the launch track
    pub track_zone_width: f64,
    /// Height of the launch track
    pub track_zone_height: f64,
    /// Uncompressed spring height
    pub spring_height: f64,
    pub pillars: Vec<Pillar>,
    pub roof: RoofShape,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            view_height: 580.0,
            reward_height: 0.0,
            collision_zone_width: 360.0,
            baffle_width: 0.0,
            track_zone_width: 40.0,
            track_zone_height: 580.0,
            spring_height: 80.0,
            pillars: Vec::new(),
            roof: RoofShape::Ellipse {
                center: DVec2::new(155.0, 52.0),
            },
        }
    }
}

impl TableConfig {
    /// y coordinate past which a ball counts as landed
    #[inline]
    pub fn reward_line(&self) -> f64 {
        self.view_height - self.reward_height
    }

    /// Full drawable width (field + baffle + launch track)
    pub fn total_width(&self) -> f64 {
        self.collision_zone_width + self.baffle_width + self.track_zone_width
    }

    /// Centre of the obstacle field
    pub fn field_center(&self) -> DVec2 {
        DVec2::new(self.collision_zone_width / 2.0, self.view_height / 2.0)
    }

    /// Reject non-numeric or negative geometry
    pub fn validate(&self) -> Result<(), EngineError> {
        EngineError::check_length("view_height", self.view_height)?;
        EngineError::check_length("reward_height", self.reward_height)?;
        EngineError::check_length("collision_zone_width", self.collision_zone_width)?;
        EngineError::check_length("baffle_width", self.baffle_width)?;
        EngineError::check_length("track_zone_width", self.track_zone_width)?;
        EngineError::check_length("track_zone_height", self.track_zone_height)?;
        EngineError::check_length("spring_height", self.spring_height)?;
        for pillar in &self.pillars {
            EngineError::check_finite("pillar.position.x", pillar.position.x)?;
            EngineError::check_finite("pillar.position.y", pillar.position.y)?;
            EngineError::check_length("pillar.radius", pillar.radius)?;
        }
        match self.roof {
            RoofShape::Rectangle => {}
            RoofShape::Trapezoid { left_line } => {
                for p in left_line {
                    EngineError::check_finite("roof.left_line", p.x)?;
                    EngineError::check_finite("roof.left_line", p.y)?;
                }
                if left_line[0] == left_line[1] {
                    return Err(EngineError::InvalidGeometry {
                        field: "roof.left_line",
                        value: 0.0,
                    });
                }
            }
            RoofShape::QuarterCircle { corner_radius } => {
                EngineError::check_length("roof.corner_radius", corner_radius)?;
            }
            RoofShape::Ellipse { center } => {
                EngineError::check_positive("roof.center.x", center.x)?;
                EngineError::check_positive("roof.center.y", center.y)?;
            }
        }
        Ok(())
    }
}

/// Engine-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub table: TableConfig,
    pub default_collision_decay: f64,
    pub default_gravity_scale: f64,
    /// Skip the push-out after an overlap and only bounce on first contact
    pub allow_overlap: bool,
    /// Simulated time per tick
    pub time_scale: f64,
    /// Store ball velocities in frames (debug rendering)
    pub record_velocity: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            table: TableConfig::default(),
            default_collision_decay: 0.6,
            default_gravity_scale: 0.3,
            allow_overlap: false,
            time_scale: 1.0,
            record_velocity: false,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        self.table.validate()?;
        EngineError::check_ratio("default_collision_decay", self.default_collision_decay)?;
        EngineError::check_length("default_gravity_scale", self.default_gravity_scale)?;
        EngineError::check_length("time_scale", self.time_scale)?;
        Ok(())
    }

    /// Ball config with this engine's defaults
    pub fn ball(&self, physics: BallPhysics) -> BallConfig {
        BallConfig {
            radius: physics.radius,
            collision_decay: physics.collision_decay,
            gravity_scale: physics.gravity_scale,
            ..BallConfig::default()
        }
    }
}

/// Physical parameters of a ball that influence its trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallPhysics {
    pub radius: f64,
    /// Restitution along the contact normal, 0..=1
    pub collision_decay: f64,
    /// Downward acceleration per tick²
    pub gravity_scale: f64,
}

impl Default for BallPhysics {
    fn default() -> Self {
        Self {
            radius: 10.0,
            collision_decay: 0.6,
            gravity_scale: 0.3,
        }
    }
}

/// Initial state of a simulated ball
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallConfig {
    pub position: DVec2,
    pub velocity: DVec2,
    pub radius: f64,
    pub collision_decay: f64,
    pub gravity_scale: f64,
    pub mass: f64,
}

impl Default for BallConfig {
    fn default() -> Self {
        let physics = BallPhysics::default();
        Self {
            position: DVec2::ZERO,
            velocity: DVec2::ZERO,
            radius: physics.radius,
            collision_decay: physics.collision_decay,
            gravity_scale: physics.gravity_scale,
            mass: 1.0,
        }
    }
}

impl BallConfig {
    pub fn physics(&self) -> BallPhysics {
        BallPhysics {
            radius: self.radius,
            collision_decay: self.collision_decay,
            gravity_scale: self.gravity_scale,
        }
    }

    pub fn at(mut self, position: DVec2, velocity: DVec2) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        EngineError::check_finite("ball.position.x", self.position.x)?;
        EngineError::check_finite("ball.position.y", self.position.y)?;
        EngineError::check_finite("ball.velocity.x", self.velocity.x)?;
        EngineError::check_finite("ball.velocity.y", self.velocity.y)?;
        EngineError::check_length("ball.radius", self.radius)?;
        EngineError::check_ratio("ball.collision_decay", self.collision_decay)?;
        EngineError::check_length("ball.gravity_scale", self.gravity_scale)?;
        if !(self.mass.is_finite() && self.mass > 0.0) {
            return Err(EngineError::InvalidGeometry {
                field: "ball.mass",
                value: self.mass,
            });
        }
        Ok(())
    }
}

/// A contact event, reported once per physical contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Collision {
    Pillar { ball_id: u32, pillar_id: u32 },
    Wall { ball_id: u32 },
    Ball { ball_ids: [u32; 2] },
    Baffle { ball_id: u32 },
}

impl Collision {
    pub fn is_pillar(&self) -> bool {
        matches!(self, Collision::Pillar { .. })
    }
}

/// One ball inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameBall {
    pub id: u32,
    pub position: DVec2,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<DVec2>,
}

/// Snapshot of one simulation tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub balls: Vec<FrameBall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collisions: Vec<Collision>,
}

impl Frame {
    /// Frame with no balls, used to terminate a playback sequence
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ball(&self, id: u32) -> Option<&FrameBall> {
        self.balls.iter().find(|b| b.id == id)
    }
}

/// Frame indices during which a ball was active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallLifetime {
    pub id: u32,
    pub start: usize,
    pub end: usize,
}

/// Output of one simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulateRecord {
    pub frames: Vec<Frame>,
    pub balls_life_time: Vec<BallLifetime>,
    /// Every ball reached the reward line before the tick budget ran out
    pub is_end: bool,
}

impl SimulateRecord {
    /// All collisions in frame order
    pub fn collisions(&self) -> impl Iterator<Item = &Collision> {
        self.frames.iter().flat_map(|f| f.collisions.iter())
    }

    /// Number of pillar hits during the run
    pub fn pillar_hit_count(&self) -> usize {
        self.collisions().filter(|c| c.is_pillar()).count()
    }

    /// Final two recorded positions of every ball, `(second_to_last, last)`
    pub fn end_positions(&self) -> Vec<(Option<DVec2>, Option<DVec2>)> {
        self.balls_life_time
            .iter()
            .map(|life| {
                let before = life
                    .end
                    .checked_sub(1)
                    .and_then(|i| self.frames.get(i))
                    .and_then(|f| f.ball(life.id))
                    .map(|b| b.position);
                let last = self
                    .frames
                    .get(life.end)
                    .and_then(|f| f.ball(life.id))
                    .map(|b| b.position);
                (before, last)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_is_valid() {
        assert!(TableConfig::default().validate().is_ok());
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_nan_geometry_rejected() {
        let table = TableConfig {
            view_height: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            table.validate(),
            Err(EngineError::InvalidGeometry { field: "view_height", .. })
        ));
    }

    #[test]
    fn test_flat_ellipse_rejected() {
        for center in [DVec2::new(0.0, 52.0), DVec2::new(155.0, 0.0)] {
            let table = TableConfig {
                roof: RoofShape::Ellipse { center },
                ..Default::default()
            };
            assert!(table.validate().is_err(), "center {center:?}");
        }
    }

    #[test]
    fn test_collision_decay_bounded() {
        let ball = BallConfig {
            collision_decay: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            ball.validate(),
            Err(EngineError::InvalidGeometry { field: "ball.collision_decay", .. })
        ));
        let ball = BallConfig {
            collision_decay: 1.0,
            ..Default::default()
        };
        assert!(ball.validate().is_ok());
        let config = EngineConfig {
            default_collision_decay: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roof_shape_serde_tag() {
        let roof = RoofShape::QuarterCircle { corner_radius: 100.0 };
        let json = serde_json::to_string(&roof).unwrap();
        assert!(json.contains("\"shape\":\"quarter_circle\""));
        let back: RoofShape = serde_json::from_str(&json).unwrap();
        assert_eq!(back, roof);
    }

    #[test]
    fn test_pillar_hit_count() {
        let record = SimulateRecord {
            frames: vec![
                Frame {
                    balls: vec![],
                    collisions: vec![
                        Collision::Pillar { ball_id: 0, pillar_id: 2 },
                        Collision::Wall { ball_id: 0 },
                    ],
                },
                Frame {
                    balls: vec![],
                    collisions: vec![Collision::Pillar { ball_id: 0, pillar_id: 3 }],
                },
            ],
            balls_life_time: vec![],
            is_end: true,
        };
        assert_eq!(record.pillar_hit_count(), 2);
    }
}
