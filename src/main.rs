//! Prize Drop entry point
//!
//! Native builds are a headless tool:
//! - `prize-drop analyze [config.json]` prints the exhaustive speed report
//! - `prize-drop demo [config.json] --section N --ball KIND` plays one round and logs its events

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::cell::Cell;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;

    use clap::{Parser, Subcommand};

    use prize_drop::config::{BallKind, GameConfig};
    use prize_drop::error::ConfigError;
    use prize_drop::platform::{Clock, ManualClock};
    use prize_drop::sim::{Engine, ExhaustiveParams, exhaustive};
    use prize_drop::{EventKind, FrameRunner, Player, PlayerEvent, PlayerState};

    /// Paints before the demo gives up on a round
    const DEMO_MAX_PAINTS: usize = 100_000;
    /// Simulated display refresh
    const DISPLAY_HZ: f64 = 120.0;

    #[derive(Parser)]
    #[command(name = "prize-drop")]
    #[command(about = "Pachinko prize machine simulator", long_about = None)]
    pub struct Cli {
        #[command(subcommand)]
        command: Commands,
    }

    #[derive(Subcommand)]
    enum Commands {
        /// Simulate every launch speed and print the report as JSON
        Analyze {
            /// Game config JSON; the classic table when omitted
            config: Option<PathBuf>,

            /// Ball preset to sweep
            #[arg(long, value_enum, default_value = "common")]
            ball: BallKind,
        },
        /// Play one round headless and log its events
        Demo {
            /// Game config JSON; the classic table when omitted
            config: Option<PathBuf>,

            /// Prize section to land in (1-based); the configured default when omitted
            #[arg(long)]
            section: Option<usize>,

            /// Ball preset to launch
            #[arg(long, value_enum, default_value = "common")]
            ball: BallKind,
        },
    }

    fn load_config(path: Option<&Path>) -> Result<GameConfig, ConfigError> {
        match path {
            Some(path) => GameConfig::load(path),
            None => Ok(GameConfig::classic()),
        }
    }

    fn analyze(config: &GameConfig, kind: BallKind) -> Result<(), ConfigError> {
        let preset = config.balls.get(kind);
        let params = ExhaustiveParams {
            section_count: config.launch.section_count,
            speed_range: preset.speed_range,
            ..Default::default()
        };
        let report = exhaustive(config.engine.clone(), preset.ball.physics, &params)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    fn demo(config: &GameConfig, destination: usize, kind: BallKind) -> Result<(), ConfigError> {
        let clock = Rc::new(ManualClock::new(0.0));
        let engine = Engine::new(config.engine.clone())?;
        let mut player = Player::new(
            engine,
            config.launch.clone(),
            config.player.clone(),
            Rc::clone(&clock) as Rc<dyn Clock>,
        );
        player.events().on_any(|event| match event {
            PlayerEvent::Compress(_) | PlayerEvent::Collision(_) => log::debug!("{event:?}"),
            _ => log::info!("{}", serde_json::to_string(event).unwrap_or_default()),
        });

        let preset = config.balls.get(kind);
        let ready = Rc::new(Cell::new(false));
        let ready_flag = Rc::clone(&ready);
        let launch_events = player.load_ball(
            preset.ball,
            destination,
            (0, usize::MAX),
            Some(preset.speed_range),
            None,
        )?;
        launch_events.once(EventKind::Ready, move |_| ready_flag.set(true));

        let mut runner = FrameRunner::new(config.player.fps);
        runner.run(clock.now_ms());
        let mut released = false;
        for _ in 0..DEMO_MAX_PAINTS {
            clock.advance(1000.0 / DISPLAY_HZ);
            runner.on_paint(clock.now_ms(), &mut || player.on_paint());

            if ready.get() && !released {
                let max = player.spring_info().max_compress_length;
                player.compress_spring_to(max);
                player.release_spring();
                released = true;
            } else if released && !player.state().is_playing() {
                break;
            }
        }

        match player.state() {
            PlayerState::Reward => log::info!("round finished in section {destination}"),
            state => log::warn!("round ended in state {state:?}"),
        }
        player.destroy();
        Ok(())
    }

    pub fn run(cli: Cli) -> Result<(), ConfigError> {
        match cli.command {
            Commands::Analyze { config, ball } => analyze(&load_config(config.as_deref())?, ball),
            Commands::Demo { config, section, ball } => {
                let config = load_config(config.as_deref())?;
                let destination = section.unwrap_or(config.launch.destination_index);
                demo(&config, destination, ball)
            }
        }
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    use clap::Parser;

    let cli = native::Cli::parse();
    prize_drop::platform::init_logging();
    log::info!("Prize Drop (native) starting...");

    match native::run(cli) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The browser host drives `Player` directly; nothing to run here
    prize_drop::platform::init_logging();
}
