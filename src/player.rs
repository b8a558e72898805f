//! Player state machine
//!
//! Sequences one round: a ball is loaded and its trajectory is searched for
//! speculatively, the user compresses and releases the spring, the found
//! trajectory (or a failed launch) is played back frame by frame, and the
//! prize is announced.
//!
//! `on_paint` is the body of the frame loop; the host drives it through a
//! `FrameRunner` running at `PlayerConfig::fps`. Nothing here blocks: the
//! search advances one slice per paint.

use std::collections::VecDeque;
use std::rc::Rc;

use glam::DVec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::Serialize;

use crate::config::{BallSpec, LaunchConfig, PlayerConfig, validate_speed_range};
use crate::consts::{
    DEFAULT_MAX_TICKS, FAIL_MAX_COLLISIONS, FAIL_MAX_TICKS, LAUNCH_MAX_TICKS, LAUNCH_SPRING_COMPRESS,
    MAX_COMPRESS_RATIO,
};
use crate::error::ConfigError;
use crate::events::{BallEvents, EventBus, LaunchOutcome, PlayerEvent};
use crate::platform::Clock;
use crate::precompute::{PreComputeTask, TaskError, TaskHandle, TaskPoll};
use crate::sim::{
    BallConfig, Collision, Engine, Frame, Range, SearchOutcome, SearchParams, VelocitySearch, gen_destination,
};

/// Drop-in animation keyframes and the y offset applied between them
const PREROLL_KEYFRAMES: [usize; 7] = [0, 18, 27, 33, 39, 45, 51];
const PREROLL_DELTAS: [f64; 7] = [0.0, 21.0, -6.0, 6.0, -3.0, 3.0, -1.0];
/// Frames over which the loaded ball fades and scales in
const PREROLL_FADE_FRAMES: usize = 12;
/// Start height of the drop-in above the resting position
const PREROLL_DROP: f64 = 21.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerState {
    Static,
    Compressing,
    PlayingLaunch,
    PlayingLoading,
    Reward,
}

impl PlayerState {
    pub fn is_playing(&self) -> bool {
        matches!(self, PlayerState::PlayingLaunch | PlayerState::PlayingLoading)
    }
}

/// A queued or running launch
#[derive(Debug)]
pub struct Launch {
    pub ball: BallSpec,
    /// Prize section, 1-based
    pub destination: usize,
    pub fallback_speed: Option<f64>,
    pub strike_count_range: (usize, usize),
    /// Overrides the configured speed range
    pub speed_range: Option<Range>,
    pub events: BallEvents,
}

/// One trail sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Motion {
    pub position: DVec2,
    pub velocity: Option<DVec2>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderBall {
    pub id: u32,
    pub position: DVec2,
    pub velocity: Option<DVec2>,
    pub radius: f64,
    pub opacity: f64,
    pub scale: f64,
    /// Recent positions, newest first
    pub motions: VecDeque<Motion>,
}

impl RenderBall {
    fn at(radius: f64, position: DVec2) -> Self {
        Self {
            id: 0,
            position,
            velocity: None,
            radius,
            opacity: 1.0,
            scale: 1.0,
            motions: VecDeque::new(),
        }
    }
}

/// What the renderer should draw this paint
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderState {
    pub balls: Vec<RenderBall>,
    pub spring_compress_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpringInfo {
    pub spring_height: f64,
    pub max_compress_length: f64,
}

/// What happens once a playback runs out of frames
enum AfterPlayback {
    Reward(Rc<Launch>),
    Fail(Rc<Launch>),
    Replay,
}

impl AfterPlayback {
    fn launch(&self) -> Option<&Launch> {
        match self {
            AfterPlayback::Reward(launch) | AfterPlayback::Fail(launch) => Some(launch),
            AfterPlayback::Replay => None,
        }
    }
}

enum Activity {
    Idle,
    Searching {
        launch: Rc<Launch>,
        handle: TaskHandle<VelocitySearch>,
    },
    Playing {
        frames: Rc<Vec<Frame>>,
        cursor: usize,
        after: AfterPlayback,
    },
    Loading {
        launch: Rc<Launch>,
        frame: usize,
        key_index: usize,
        y: f64,
        delta: f64,
    },
}

pub struct Player {
    engine: Engine,
    launch_config: LaunchConfig,
    config: PlayerConfig,
    clock: Rc<dyn Clock>,
    search_task: PreComputeTask<SearchParams, VelocitySearch>,
    events: EventBus,
    state: PlayerState,
    activity: Activity,
    current_launch: Option<Rc<Launch>>,
    next_launch: Option<Rc<Launch>>,
    /// Render parameters of the ball in play
    ball: BallSpec,
    render_state: RenderState,
    last_spring_compress_length: f64,
    last_frames: Option<Rc<Vec<Frame>>>,
    min_compress_length: f64,
    max_compress_length: f64,
    destroyed: bool,
}

impl Player {
    pub fn new(engine: Engine, launch_config: LaunchConfig, config: PlayerConfig, clock: Rc<dyn Clock>) -> Self {
        let mut rng = match config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_rng(&mut rand::rng()),
        };
        let search_clock = Rc::clone(&clock);
        let search_task = PreComputeTask::new(
            move |params: &SearchParams| VelocitySearch::new(params.clone(), &mut rng, Rc::clone(&search_clock)),
            config.search_timeout_ms,
        );
        let max_compress_length = engine.config().table.spring_height * MAX_COMPRESS_RATIO;
        let ball = BallSpec {
            physics: engine.default_ball().physics(),
            ..Default::default()
        };

        Self {
            engine,
            launch_config,
            config,
            clock,
            search_task,
            events: EventBus::new(),
            state: PlayerState::Static,
            activity: Activity::Idle,
            current_launch: None,
            next_launch: None,
            ball,
            render_state: RenderState::default(),
            last_spring_compress_length: 0.0,
            last_frames: None,
            min_compress_length: 0.0,
            max_compress_length,
            destroyed: false,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Player-wide event bus
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    /// Frames of the last playback
    pub fn last_frames(&self) -> Option<&[Frame]> {
        self.last_frames.as_deref().map(Vec::as_slice)
    }

    pub fn current_launch(&self) -> Option<&Launch> {
        self.current_launch.as_deref()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn spring_info(&self) -> SpringInfo {
        SpringInfo {
            spring_height: self.engine.config().table.spring_height,
            max_compress_length: self.max_compress_length,
        }
    }

    fn frame_jump(&self) -> usize {
        if self.config.fps == 30 { 2 } else { 1 }
    }

    fn emit(&self, event: PlayerEvent, launch: Option<&Launch>) {
        self.events.emit(&event);
        if let Some(launch) = launch {
            launch.events.emit(&event);
        }
    }

    /// One logical frame. Returns `false` once the player is destroyed.
    pub fn on_paint(&mut self) -> bool {
        if self.destroyed {
            return false;
        }
        if self.state == PlayerState::Static || (self.state == PlayerState::Reward && self.next_launch.is_some()) {
            self.load_next_ball();
        }

        let now = self.clock.now_ms();
        self.search_task.drive(&self.engine, now);
        self.advance();

        if self.last_spring_compress_length != self.render_state.spring_compress_length {
            self.last_spring_compress_length = self.render_state.spring_compress_length;
            self.emit(PlayerEvent::Compress(self.render_state.spring_compress_length), None);
        }
        !self.destroyed
    }

    fn advance(&mut self) {
        match std::mem::replace(&mut self.activity, Activity::Idle) {
            Activity::Idle => {}
            Activity::Searching { launch, handle } => match handle.poll(&self.engine) {
                TaskPoll::Pending => self.activity = Activity::Searching { launch, handle },
                TaskPoll::Ready(Ok(outcome)) => self.play_found(launch, outcome),
                TaskPoll::Ready(Err(TaskError::TimedOut)) => {
                    log::debug!("awaited search timed out, searching again");
                    let params = self.search_params(&launch);
                    let handle = self.search_task.get_result(&params, self.clock.now_ms());
                    self.activity = Activity::Searching { launch, handle };
                }
                TaskPoll::Ready(Err(TaskError::Canceled)) => {
                    log::debug!("search canceled, round dropped");
                    self.state = PlayerState::Static;
                    self.current_launch = None;
                    self.reset_spring();
                }
                TaskPoll::Ready(Err(e)) => {
                    log::warn!("no launch velocity for section {}: {e}", launch.destination);
                    self.emit(PlayerEvent::Error, Some(&*launch));
                    self.state = PlayerState::Static;
                    self.current_launch = None;
                    self.reset_spring();
                }
            },
            Activity::Playing { frames, cursor, after } => {
                if let Some(cursor) = self.step_playback(&frames, cursor, after.launch()) {
                    self.activity = Activity::Playing { frames, cursor, after };
                } else {
                    self.finish_playback(after);
                }
            }
            Activity::Loading {
                launch,
                mut frame,
                mut key_index,
                mut y,
                mut delta,
            } => {
                for _ in 0..self.frame_jump() {
                    if frame > PREROLL_KEYFRAMES[PREROLL_KEYFRAMES.len() - 1] {
                        self.state = PlayerState::Static;
                        launch.events.emit(&PlayerEvent::Ready);
                        return;
                    }
                    self.step_preroll(&launch, &mut frame, &mut key_index, &mut y, &mut delta);
                }
                self.activity = Activity::Loading {
                    launch,
                    frame,
                    key_index,
                    y,
                    delta,
                };
            }
        }
    }

    fn step_preroll(&mut self, launch: &Launch, frame: &mut usize, key_index: &mut usize, y: &mut f64, delta: &mut f64) {
        let rest = self.engine.launch_start_position(0.0, launch.ball.physics.radius);
        if let Some(&key) = PREROLL_KEYFRAMES.get(*key_index)
            && *frame >= key
        {
            let next_key = PREROLL_KEYFRAMES.get(*key_index + 1).copied().unwrap_or(100);
            *delta = PREROLL_DELTAS[*key_index] / (next_key - key) as f64;
            *key_index += 1;
            if *delta < 0.0 {
                self.emit(PlayerEvent::Collision(vec![Collision::Wall { ball_id: 0 }]), Some(launch));
            }
        }

        let last_key = PREROLL_KEYFRAMES[PREROLL_KEYFRAMES.len() - 1];
        *y = if *frame == last_key { rest.y } else { *y + *delta };
        let fade = (*frame as f64 / PREROLL_FADE_FRAMES as f64).min(1.0);
        self.render_state.balls = vec![RenderBall {
            opacity: fade,
            scale: fade,
            ..RenderBall::at(launch.ball.physics.radius, DVec2::new(rest.x, *y))
        }];
        *frame += 1;
    }

    /// Play the frames at `cursor`; `None` once playback is over
    fn step_playback(&mut self, frames: &[Frame], cursor: usize, launch: Option<&Launch>) -> Option<usize> {
        let jump = self.frame_jump();
        let start = cursor.min(frames.len());
        let end = (cursor + jump).min(frames.len());
        let played = &frames[start..end];
        let key_frame = played.get(1).or(played.first());

        if key_frame.is_none() && self.render_state.balls.iter().all(|b| b.motions.is_empty()) {
            return None;
        }

        let collisions: Vec<Collision> = played.iter().flat_map(|f| f.collisions.iter().copied()).collect();
        if !collisions.is_empty() {
            self.emit(PlayerEvent::Collision(collisions), launch);
        }
        self.set_render_state_by_frame(key_frame);
        Some(cursor + jump)
    }

    fn finish_playback(&mut self, after: AfterPlayback) {
        match after {
            AfterPlayback::Reward(launch) => {
                self.state = PlayerState::Reward;
                log::info!("ball landed in section {}", launch.destination);
                self.emit(PlayerEvent::Reward(launch.destination), Some(&*launch));
                self.emit(PlayerEvent::Finish(LaunchOutcome::Success), Some(&*launch));
                self.current_launch = None;
            }
            AfterPlayback::Fail(launch) => {
                self.emit(PlayerEvent::Finish(LaunchOutcome::Fail), Some(&*launch));
                // The ball stays on the spring unless another one is waiting
                if self.next_launch.is_some() {
                    self.current_launch = None;
                }
                self.state = PlayerState::Static;
            }
            AfterPlayback::Replay => self.state = PlayerState::Static,
        }
    }

    fn set_render_state_by_frame(&mut self, frame: Option<&Frame>) {
        let Some(frame) = frame else {
            for ball in &mut self.render_state.balls {
                ball.motions.pop_back();
            }
            return;
        };

        let trail = if self.config.fps == 30 {
            self.ball.motion_frame_count / 2
        } else {
            self.ball.motion_frame_count
        };
        let old_balls = std::mem::take(&mut self.render_state.balls);
        self.render_state.balls = frame
            .balls
            .iter()
            .map(|b| {
                let mut motions = old_balls
                    .iter()
                    .find(|old| old.id == b.id)
                    .map(|old| old.motions.clone())
                    .unwrap_or_default();
                if !motions.is_empty() && trail <= motions.len() {
                    motions.pop_back();
                }
                motions.push_front(Motion {
                    position: b.position,
                    velocity: b.velocity,
                });
                RenderBall {
                    id: b.id,
                    velocity: b.velocity,
                    motions,
                    ..RenderBall::at(self.ball.physics.radius, b.position)
                }
            })
            .collect();

        // The spring follows a ball resting on it
        self.set_spring_compress_length(0.0);
        if let [ball] = frame.balls.as_slice() {
            let table = &self.engine.config().table;
            let radius = self.ball.physics.radius;
            let rest = self.engine.launch_start_position(0.0, radius);
            if ball.position.x == rest.x && ball.position.y > rest.y {
                let length = table.spring_height - (table.view_height - ball.position.y - radius);
                self.set_spring_compress_length(length);
            }
        }
    }

    fn set_spring_compress_length(&mut self, length: f64) {
        self.render_state.spring_compress_length = length.clamp(self.min_compress_length, self.max_compress_length);
    }

    fn set_render_state_by_compress_spring(&mut self, length: f64) {
        self.set_spring_compress_length(length);
        self.render_state.balls = match &self.current_launch {
            Some(launch) => {
                let radius = launch.ball.physics.radius;
                let position = self
                    .engine
                    .launch_start_position(self.render_state.spring_compress_length, radius);
                vec![RenderBall::at(radius, position)]
            }
            None => Vec::new(),
        };
    }

    fn reset_spring(&mut self) {
        if self.state.is_playing() {
            return;
        }
        self.set_render_state_by_compress_spring(0.0);
    }

    fn search_params(&self, launch: &Launch) -> SearchParams {
        let table = &self.engine.config().table;
        SearchParams {
            destinations: gen_destination(
                launch.destination,
                self.launch_config.section_count,
                table.collision_zone_width,
                launch.ball.physics.radius,
            ),
            speed_range: launch.speed_range.unwrap_or(self.launch_config.speed_range),
            ball: launch.ball.physics,
            speed_step: self.config.speed_step,
            pillar_hit_range: launch.strike_count_range,
            max_try_count: self.config.max_try_count,
            fallback_speed: launch.fallback_speed,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }

    fn ball_config(&self, launch: &Launch) -> BallConfig {
        self.engine.config().ball(launch.ball.physics)
    }

    fn play_found(&mut self, launch: Rc<Launch>, outcome: SearchOutcome) {
        self.emit(PlayerEvent::Find(outcome.stats()), Some(&*launch));

        let approach = self.engine.simulate_ball_launch(
            &self.ball_config(&launch),
            outcome.velocity.x,
            LAUNCH_SPRING_COMPRESS,
            LAUNCH_MAX_TICKS,
        );
        let mut frames = approach.frames;
        frames.extend(outcome.record.frames);
        frames.push(Frame::empty());

        self.emit(PlayerEvent::Start(LaunchOutcome::Success), Some(&*launch));
        self.start_playback(frames, AfterPlayback::Reward(launch));
    }

    fn start_playback(&mut self, frames: Vec<Frame>, after: AfterPlayback) {
        let frames = Rc::new(frames);
        self.last_frames = Some(Rc::clone(&frames));
        self.activity = Activity::Playing {
            frames,
            cursor: 0,
            after,
        };
    }

    fn load_next_ball(&mut self) {
        let Some(launch) = self.next_launch.take() else {
            return;
        };
        self.current_launch = Some(Rc::clone(&launch));
        let params = self.search_params(&launch);
        self.search_task.pre_compute(&params, self.clock.now_ms());
        self.ball = launch.ball;
        log::debug!("loaded ball for section {}", launch.destination);

        if self.config.preroll {
            self.state = PlayerState::PlayingLoading;
            let rest = self.engine.launch_start_position(0.0, launch.ball.physics.radius);
            self.activity = Activity::Loading {
                launch,
                frame: 0,
                key_index: 0,
                y: rest.y - PREROLL_DROP,
                delta: 0.0,
            };
        } else {
            self.reset_spring();
            self.state = PlayerState::Static;
            launch.events.emit(&PlayerEvent::Ready);
        }
    }

    /// Queue a ball; it is loaded the next time the player is idle
    ///
    /// Returns the event bus scoped to this launch.
    pub fn load_ball(
        &mut self,
        ball: BallSpec,
        destination: usize,
        strike_count_range: (usize, usize),
        speed_range: Option<Range>,
        fallback_speed: Option<f64>,
    ) -> Result<BallEvents, ConfigError> {
        self.engine.config().ball(ball.physics).validate()?;
        if !self.launch_config.is_valid_destination(destination) {
            return Err(ConfigError::Launch(format!(
                "destination {destination} outside 1..={}",
                self.launch_config.section_count
            )));
        }
        if let Some(range) = speed_range {
            validate_speed_range(range)?;
        }
        if strike_count_range.0 > strike_count_range.1 {
            return Err(ConfigError::Launch(format!(
                "empty strike count range {strike_count_range:?}"
            )));
        }

        let events = BallEvents::new();
        self.next_launch = Some(Rc::new(Launch {
            ball,
            destination,
            fallback_speed,
            strike_count_range,
            speed_range,
            events: events.clone(),
        }));
        Ok(events)
    }

    /// Add `delta` to the spring compression
    pub fn compress_spring(&mut self, delta: f64) {
        if self.state.is_playing() {
            return;
        }
        self.state = PlayerState::Compressing;
        let length = self.render_state.spring_compress_length + delta;
        self.set_render_state_by_compress_spring(length);
    }

    pub fn compress_spring_to(&mut self, length: f64) {
        if self.state.is_playing() {
            return;
        }
        self.state = PlayerState::Compressing;
        self.set_render_state_by_compress_spring(length);
    }

    /// Launch the current ball with the current compression
    pub fn release_spring(&mut self) {
        if self.state != PlayerState::Compressing {
            return;
        }
        let Some(launch) = self.current_launch.clone() else {
            self.reset_spring();
            self.state = PlayerState::Static;
            return;
        };
        self.state = PlayerState::PlayingLaunch;

        let table = &self.engine.config().table;
        let threshold = self.launch_config.min_distance_ratio * table.spring_height;
        let compress = self.render_state.spring_compress_length;

        if compress >= threshold {
            let params = self.search_params(&launch);
            let handle = self.search_task.get_result(&params, self.clock.now_ms());
            self.activity = Activity::Searching { launch, handle };
        } else {
            log::debug!("spring released at {compress:.1}, below {threshold:.1}");
            let frames = self.engine.simulate_ball_launch_fail(
                &self.ball_config(&launch),
                compress / threshold,
                compress,
                FAIL_MAX_COLLISIONS,
                FAIL_MAX_TICKS,
            );
            self.emit(PlayerEvent::Start(LaunchOutcome::Fail), Some(&*launch));
            self.start_playback(frames, AfterPlayback::Fail(launch));
        }
    }

    /// Drop the current and queued balls
    pub fn reset(&mut self) {
        if self.state.is_playing() {
            return;
        }
        self.current_launch = None;
        self.next_launch = None;
        self.reset_spring();
        self.state = PlayerState::Static;
    }

    /// Stop the loop and cancel any pending search
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.search_task.clear();
        self.activity = Activity::Idle;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Show frame `index` of the last playback
    pub fn debug_frame(&mut self, index: usize) -> Option<Frame> {
        if self.state != PlayerState::Static {
            return None;
        }
        let frame = self.last_frames.as_ref().and_then(|f| f.get(index)).cloned();
        self.set_render_state_by_frame(frame.as_ref());
        frame
    }

    /// Play the last playback again; returns whether it started
    pub fn debug_replay(&mut self) -> bool {
        let Some(frames) = self.last_frames.clone() else {
            return false;
        };
        if self.state.is_playing() {
            return false;
        }
        self.state = PlayerState::PlayingLaunch;
        self.activity = Activity::Playing {
            frames,
            cursor: 0,
            after: AfterPlayback::Replay,
        };
        true
    }
}
