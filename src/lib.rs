//! Prize Drop - a pachinko-style prize machine
//!
//! A ball is fired up a spring-loaded launch track, bounces through a field of
//! pillars, and settles in one of the prize sections along the bottom. The
//! landing section is chosen up front: the launch speed that reaches it is
//! searched for by simulation and the resulting frames are played back.
//!
//! Core modules:
//! - `sim`: Deterministic physics, trajectory search, and offline analysis
//! - `player`: Round state machine driven from the paint loop
//! - `precompute`: Memoized, cancelable cooperative tasks
//! - `runner`: Fixed-rate frame runner
//! - `events`: Player events and the event bus
//! - `config`: Serde configuration with validation
//! - `platform`: Clock and logging setup per target

pub mod config;
pub mod error;
pub mod events;
pub mod platform;
pub mod player;
pub mod precompute;
pub mod runner;
pub mod sim;

pub use config::{BallKind, BallSpec, GameConfig, LaunchConfig, PlayerConfig};
pub use error::{ConfigError, EngineError};
pub use events::{BallEvents, EventBus, EventKind, LaunchOutcome, PlayerEvent};
pub use player::{Player, PlayerState, RenderState};
pub use runner::FrameRunner;

/// Game configuration constants
pub mod consts {
    /// Radius of the virtual circle standing in for a straight wall
    pub const WALL_RADIUS: f64 = 1000.0;

    /// Tick limit of a field simulation
    pub const DEFAULT_MAX_TICKS: usize = 5000;
    /// Tick limit of the launch track approach
    pub const LAUNCH_MAX_TICKS: usize = 1000;
    /// Tick limit of a failed launch
    pub const FAIL_MAX_TICKS: usize = 500;
    /// Floor bounces before a failed launch is cut off
    pub const FAIL_MAX_COLLISIONS: u32 = 5;
    /// Vertical speed below which a bouncing ball counts as settled
    pub const REST_SPEED: f64 = 0.1;

    /// Wall-clock budget of one velocity search
    pub const SEARCH_BUDGET_MS: f64 = 2000.0;
    /// Search slice length before yielding to the paint loop
    pub const YIELD_INTERVAL_MS: f64 = 1000.0 / 15.0;
    pub const DEFAULT_SPEED_STEP: f64 = 0.001;
    pub const DEFAULT_MAX_TRY_COUNT: usize = 3000;

    /// Spring compression limit as a share of the spring height
    pub const MAX_COMPRESS_RATIO: f64 = 0.515;
    /// Compression the launch approach starts from
    pub const LAUNCH_SPRING_COMPRESS: f64 = 20.0;

    pub const DEFAULT_FPS: u32 = 60;
}
