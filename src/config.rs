//! Game configuration
//!
//! Everything the game needs is plain serde data with defaults, so a JSON
//! document only has to name the values it changes.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_FPS, DEFAULT_MAX_TRY_COUNT, DEFAULT_SPEED_STEP};
use crate::error::ConfigError;
use crate::sim::{BallPhysics, EngineConfig, Pillar, Range, RoofShape, TableConfig};

/// Ball flavours offered by the game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(not(target_arch = "wasm32"), derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum BallKind {
    #[default]
    Common,
    /// Bouncier, lighter ball
    #[serde(alias = "collision")]
    #[cfg_attr(not(target_arch = "wasm32"), value(alias = "collision"))]
    Elastic,
    /// Common physics with a longer trail
    Double,
}

impl BallKind {
    pub const ALL: [BallKind; 3] = [BallKind::Common, BallKind::Elastic, BallKind::Double];
}

/// Physics and rendering parameters of a launched ball
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallSpec {
    pub physics: BallPhysics,
    /// Trail length in frames at 60 fps
    pub motion_frame_count: usize,
}

impl Default for BallSpec {
    fn default() -> Self {
        Self {
            physics: BallPhysics::default(),
            motion_frame_count: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BallPreset {
    pub ball: BallSpec,
    pub speed_range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallPresets {
    pub common: BallPreset,
    pub elastic: BallPreset,
    pub double: BallPreset,
}

impl Default for BallPresets {
    fn default() -> Self {
        let preset = |radius, gravity_scale, collision_decay, speed_range, motion_frame_count| BallPreset {
            ball: BallSpec {
                physics: BallPhysics {
                    radius,
                    collision_decay,
                    gravity_scale,
                },
                motion_frame_count,
            },
            speed_range,
        };
        Self {
            common: preset(9.0, 0.25, 0.6, [10.0, 14.0], 12),
            elastic: preset(9.0, 0.1, 0.9, [15.0, 18.0], 14),
            double: preset(9.0, 0.25, 0.6, [10.0, 14.0], 18),
        }
    }
}

impl BallPresets {
    pub fn get(&self, kind: BallKind) -> &BallPreset {
        match kind {
            BallKind::Common => &self.common,
            BallKind::Elastic => &self.elastic,
            BallKind::Double => &self.double,
        }
    }
}

/// Prize layout and launch thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Number of prize sections across the field
    pub section_count: usize,
    /// Default launch speed range for the search
    pub speed_range: Range,
    /// Default prize section, 1-based
    pub destination_index: usize,
    /// Spring compression, as a share of the spring height, needed to clear
    /// the track
    pub min_distance_ratio: f64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            section_count: 6,
            speed_range: [10.0, 17.0],
            destination_index: 1,
            min_distance_ratio: 0.3,
        }
    }
}

impl LaunchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.section_count == 0 {
            return Err(ConfigError::Launch("section_count must be at least 1".into()));
        }
        if !self.is_valid_destination(self.destination_index) {
            return Err(ConfigError::Launch(format!(
                "destination_index {} outside 1..={}",
                self.destination_index, self.section_count
            )));
        }
        validate_speed_range(self.speed_range)?;
        if !(0.0..=1.0).contains(&self.min_distance_ratio) {
            return Err(ConfigError::Launch(format!(
                "min_distance_ratio {} outside 0..=1",
                self.min_distance_ratio
            )));
        }
        Ok(())
    }

    pub fn is_valid_destination(&self, index: usize) -> bool {
        (1..=self.section_count).contains(&index)
    }
}

pub(crate) fn validate_speed_range(range: Range) -> Result<(), ConfigError> {
    let [min, max] = range;
    if min.is_finite() && max.is_finite() && 0.0 <= min && min <= max {
        Ok(())
    } else {
        Err(ConfigError::Launch(format!("invalid speed range [{min}, {max}]")))
    }
}

/// Player loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Logical frame rate; 30 plays two simulation frames per tick
    pub fps: u32,
    /// Play the ball drop-in animation when a ball is loaded
    pub preroll: bool,
    /// Search RNG seed; random when unset
    pub seed: Option<u64>,
    /// Cancel speculative searches nobody claimed after this long
    pub search_timeout_ms: Option<f64>,
    pub speed_step: f64,
    pub max_try_count: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            preroll: false,
            seed: None,
            search_timeout_ms: None,
            speed_step: DEFAULT_SPEED_STEP,
            max_try_count: DEFAULT_MAX_TRY_COUNT,
        }
    }
}

/// Complete game configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameConfig {
    pub engine: EngineConfig,
    pub launch: LaunchConfig,
    pub player: PlayerConfig,
    pub balls: BallPresets,
}

/// The production table: 264 x 305 with 18 pillars and an elliptic roof
pub fn classic_table() -> TableConfig {
    const PILLAR_RADIUS: f64 = 9.0;
    const ROWS: [(f64, &[f64]); 4] = [
        (81.0, &[61.5, 108.5, 155.5, 202.5]),
        (128.0, &[38.0, 85.0, 132.0, 179.0, 226.0]),
        (175.0, &[61.5, 108.5, 155.5, 202.5]),
        (221.0, &[38.0, 85.0, 132.0, 179.0, 226.0]),
    ];

    let pillars = ROWS
        .iter()
        .flat_map(|(y, xs)| xs.iter().map(move |x| (*x, *y)))
        .zip(0u32..)
        .map(|((x, y), id)| Pillar::new(id, x, y, PILLAR_RADIUS))
        .collect();

    TableConfig {
        view_height: 305.0,
        reward_height: 44.0,
        collision_zone_width: 264.0,
        baffle_width: 6.0,
        track_zone_width: 40.0,
        track_zone_height: 287.0,
        spring_height: 96.0,
        pillars,
        roof: RoofShape::Ellipse {
            center: glam::DVec2::new(155.0, 52.0),
        },
    }
}

impl GameConfig {
    /// The production game: classic table, common ball defaults
    pub fn classic() -> Self {
        let balls = BallPresets::default();
        Self {
            engine: EngineConfig {
                table: classic_table(),
                default_collision_decay: balls.common.ball.physics.collision_decay,
                default_gravity_scale: balls.common.ball.physics.gravity_scale,
                ..Default::default()
            },
            balls,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.launch.validate()?;
        for kind in BallKind::ALL {
            let preset = self.balls.get(kind);
            self.engine.ball(preset.ball.physics).validate()?;
            validate_speed_range(preset.speed_range)?;
        }
        if self.player.fps == 0 {
            return Err(ConfigError::Launch("player fps must be positive".into()));
        }
        if !(self.player.speed_step.is_finite() && self.player.speed_step > 0.0) {
            return Err(ConfigError::Launch(format!(
                "speed_step {} must be positive",
                self.player.speed_step
            )));
        }
        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file (native only)
    #[cfg(not(target_arch = "wasm32"))]
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        log::info!("Loaded config from {}", path.display());
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(GameConfig::default().validate().is_ok());
        assert!(GameConfig::classic().validate().is_ok());
    }

    #[test]
    fn test_classic_table() {
        let table = classic_table();
        assert_eq!(table.pillars.len(), 18);
        assert_eq!(table.pillars[0].position, glam::DVec2::new(61.5, 81.0));
        assert_eq!(table.pillars[17].position, glam::DVec2::new(226.0, 221.0));
        assert_eq!(table.pillars[17].id, 17);
        assert_eq!(table.total_width(), 310.0);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = GameConfig::from_json(r#"{"launch": {"section_count": 4}}"#).unwrap();
        assert_eq!(config.launch.section_count, 4);
        assert_eq!(config.launch.min_distance_ratio, 0.3);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_json_round_trip() {
        let config = GameConfig::classic();
        let json = config.to_json().unwrap();
        assert_eq!(GameConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(GameConfig::from_json("{"), Err(ConfigError::Json(_))));
        assert!(matches!(
            GameConfig::from_json(r#"{"engine": {"table": {"view_height": -1.0}}}"#),
            Err(ConfigError::Engine(_))
        ));
        assert!(matches!(
            GameConfig::from_json(r#"{"launch": {"destination_index": 9}}"#),
            Err(ConfigError::Launch(_))
        ));
    }

    #[test]
    fn test_ball_kind_names() {
        let kind: BallKind = serde_json::from_str(r#""elastic""#).unwrap();
        assert_eq!(kind, BallKind::Elastic);
        let kind: BallKind = serde_json::from_str(r#""collision""#).unwrap();
        assert_eq!(kind, BallKind::Elastic);
        assert_eq!(serde_json::to_string(&BallKind::Double).unwrap(), r#""double""#);
        assert!(serde_json::from_str::<BallKind>(r#""golden""#).is_err());
        assert_eq!(GameConfig::default().balls.get(BallKind::Elastic).ball.physics.collision_decay, 0.9);
    }

    #[test]
    #[cfg(not(target_arch = "wasm32"))]
    fn test_ball_kind_cli_values() {
        use clap::ValueEnum;
        assert_eq!(BallKind::from_str("elastic", false), Ok(BallKind::Elastic));
        assert_eq!(BallKind::from_str("collision", false), Ok(BallKind::Elastic));
        assert_eq!(BallKind::from_str("Double", true), Ok(BallKind::Double));
        assert!(BallKind::from_str("golden", false).is_err());
    }
}
