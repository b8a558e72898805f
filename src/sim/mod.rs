//! Deterministic simulation module
//!
//! Ball physics, trajectory search, and offline analysis. Nothing here renders
//! or reads the clock except through `platform::Clock`:
//! - One unit of time per tick, scaled by `EngineConfig::time_scale`
//! - Seeded RNG only
//! - Stable iteration order (by ball and pillar ID)

pub mod analysis;
pub mod ball;
pub mod collision;
pub mod engine;
pub mod search;
pub mod state;
pub mod vector;

pub use analysis::{ExhaustiveParams, ExhaustiveReport, WorstTryCount, exhaustive, speed_iter};
pub use ball::Ball;
pub use collision::{Contact, ContactKind, detect};
pub use engine::{Engine, MAX_BALLS, collision_response, two_ball_response};
pub use search::{
    Range, SearchOutcome, SearchParams, SearchPoll, SearchStats, VelocitySearch, find_velocity, gen_destination,
    is_end_to_destination, is_good_result, match_destinations,
};
pub use state::{
    BallConfig, BallLifetime, BallPhysics, Collision, EngineConfig, Frame, FrameBall, Pillar, RoofShape,
    SimulateRecord, TableConfig,
};
pub use vector::{VectorExt, compute_angle, compute_radian, from_polar, radian_between, rotate};
