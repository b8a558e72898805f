//! Fixed-rate frame runner
//!
//! The host calls `on_paint` on every display refresh. The runner only runs
//! the logical tick once at least one interval has passed, and carries the
//! overshoot forward so the average rate stays at the target fps.

use crate::consts::DEFAULT_FPS;

#[derive(Debug, Clone)]
pub struct FrameRunner {
    fps: u32,
    last_run_ms: f64,
    start_ms: f64,
    /// Paints seen since `run`
    frame_count: u64,
    real_fps: f64,
    current_fps: f64,
    ended: bool,
    started: bool,
}

impl Default for FrameRunner {
    fn default() -> Self {
        Self::new(DEFAULT_FPS)
    }
}

impl FrameRunner {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: if fps == 0 { DEFAULT_FPS } else { fps },
            last_run_ms: 0.0,
            start_ms: 0.0,
            frame_count: 0,
            real_fps: 0.0,
            current_fps: 0.0,
            ended: false,
            started: false,
        }
    }

    /// Target logical rate
    pub fn expect_fps(&self) -> u32 {
        self.fps
    }

    pub fn fps_interval_ms(&self) -> f64 {
        1000.0 / f64::from(self.fps)
    }

    /// Average logical rate since `run`
    pub fn real_fps(&self) -> f64 {
        self.real_fps
    }

    /// Rate implied by the last interval
    pub fn current_fps(&self) -> f64 {
        self.current_fps
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.ended
    }

    pub fn set_fps(&mut self, fps: u32) {
        if fps == 0 {
            log::error!("frame runner fps cannot be 0");
            return;
        }
        self.fps = fps;
    }

    /// Start (or restart) counting from `now_ms`
    pub fn run(&mut self, now_ms: f64) {
        self.frame_count = 0;
        self.ended = false;
        self.started = true;
        self.start_ms = now_ms;
        self.last_run_ms = now_ms - self.fps_interval_ms();
    }

    /// Stop for good; `on_paint` becomes a no-op until `run`
    pub fn stop(&mut self) {
        self.ended = true;
    }

    /// Handle one host paint. Returns whether `tick` ran.
    ///
    /// `tick` returning `false` stops the runner.
    pub fn on_paint(&mut self, now_ms: f64, tick: &mut dyn FnMut() -> bool) -> bool {
        if !self.is_running() {
            return false;
        }
        self.frame_count += 1;

        let elapsed = now_ms - self.last_run_ms;
        let interval = self.fps_interval_ms();
        if elapsed < interval {
            return false;
        }

        self.current_fps = 1000.0 / elapsed;
        let running_ms = now_ms - self.start_ms;
        if running_ms > 0.0 {
            self.real_fps = 1000.0 * self.frame_count as f64 / running_ms;
        }

        self.ended = !tick();
        self.last_run_ms = now_ms - elapsed % interval;
        true
    }
}
