//! Trajectory search
//!
//! Inverts the simulator: scans launch speeds until one lands the ball in
//! the requested prize section with a plausible number of pillar hits.
//! The scan runs as a cooperative job so it can be spread over several
//! paints without stalling rendering.

use std::rc::Rc;

use glam::DVec2;
use rand::Rng;
use serde::Serialize;

use super::engine::Engine;
use super::state::{BallPhysics, SimulateRecord};
use crate::consts::{DEFAULT_MAX_TICKS, DEFAULT_MAX_TRY_COUNT, DEFAULT_SPEED_STEP, SEARCH_BUDGET_MS, YIELD_INTERVAL_MS};
use crate::platform::Clock;
use crate::precompute::{CooperativeJob, TaskError, TaskPoll};

/// Closed-open x interval `[min, max)`
pub type Range = [f64; 2];

/// Landing range of prize section `section_index` (1-based)
///
/// The field is split into `section_count` equal sections, each inset by a
/// third of the ball radius so balls resting on a divider do not count.
pub fn gen_destination(section_index: usize, section_count: usize, width: f64, ball_radius: f64) -> Vec<Range> {
    let section_width = width / section_count.max(1) as f64;
    let inset = ball_radius / 3.0;
    vec![[
        (section_index as f64 - 1.0) * section_width + inset,
        section_index as f64 * section_width - inset,
    ]]
}

#[inline]
fn in_range(x: f64, range: &Range) -> bool {
    x >= range[0] && x < range[1]
}

/// Both of the last two recorded x positions lie in `destination`
pub fn is_end_to_destination(destination: &Range, end: &(Option<DVec2>, Option<DVec2>)) -> bool {
    let Some(last) = end.1 else {
        return false;
    };
    in_range(last.x, destination) && end.0.is_none_or(|before| in_range(before.x, destination))
}

/// Destination indices claimed by the balls, in ball order
///
/// Each ball claims the first matching destination not yet claimed.
pub fn match_destinations(destinations: &[Range], end_positions: &[(Option<DVec2>, Option<DVec2>)]) -> Vec<usize> {
    let mut claimed = Vec::with_capacity(destinations.len());
    for end in end_positions {
        if let Some(index) = destinations
            .iter()
            .enumerate()
            .position(|(i, d)| !claimed.contains(&i) && is_end_to_destination(d, end))
        {
            claimed.push(index);
        }
    }
    claimed
}

/// Acceptance predicate for a candidate run
pub fn is_good_result(record: &SimulateRecord, destinations: &[Range], pillar_hit_range: (usize, usize)) -> bool {
    if !record.is_end {
        return false;
    }
    if match_destinations(destinations, &record.end_positions()).len() != destinations.len() {
        return false;
    }
    let hits = record.pillar_hit_count();
    pillar_hit_range.0 <= hits && hits <= pillar_hit_range.1
}

/// Inputs of one velocity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub destinations: Vec<Range>,
    /// Launch speeds to scan, `[min, max]`
    pub speed_range: Range,
    pub ball: BallPhysics,
    pub speed_step: f64,
    /// Inclusive bounds on pillar hits
    pub pillar_hit_range: (usize, usize),
    pub max_try_count: usize,
    /// Speed tried once after the scan is exhausted
    pub fallback_speed: Option<f64>,
    pub max_ticks: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            destinations: Vec::new(),
            speed_range: [10.0, 17.0],
            ball: BallPhysics::default(),
            speed_step: DEFAULT_SPEED_STEP,
            pillar_hit_range: (0, usize::MAX),
            max_try_count: DEFAULT_MAX_TRY_COUNT,
            fallback_speed: None,
            max_ticks: DEFAULT_MAX_TICKS,
        }
    }
}

/// Summary of a successful search, as reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchStats {
    pub try_count: usize,
    pub start_ms: f64,
    pub end_ms: f64,
    pub velocity: DVec2,
    pub fallback: bool,
}

/// A launch velocity and the run it produces
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub velocity: DVec2,
    pub try_count: usize,
    pub start_ms: f64,
    pub end_ms: f64,
    pub record: SimulateRecord,
    /// Found by the fallback speed rather than the scan
    pub fallback: bool,
}

impl SearchOutcome {
    pub fn stats(&self) -> SearchStats {
        SearchStats {
            try_count: self.try_count,
            start_ms: self.start_ms,
            end_ms: self.end_ms,
            velocity: self.velocity,
            fallback: self.fallback,
        }
    }
}

#[derive(Debug)]
pub enum SearchPoll {
    /// Slice used up; resume on the next paint
    Pending,
    Found(Box<SearchOutcome>),
    /// Budget spent without an admissible velocity
    Exhausted,
    Canceled,
}

/// Resumable speed scan
pub struct VelocitySearch {
    params: SearchParams,
    clock: Rc<dyn Clock>,
    start_index: usize,
    candidate_count: usize,
    tried: usize,
    start_ms: f64,
    finished: bool,
}

impl VelocitySearch {
    pub fn new(params: SearchParams, rng: &mut impl Rng, clock: Rc<dyn Clock>) -> Self {
        let [min, max] = params.speed_range;
        let span = if params.speed_step > 0.0 {
            ((max - min) / params.speed_step).max(0.0)
        } else {
            0.0
        };
        let candidate_count = span.floor() as usize + 1;
        let start_index = ((rng.random::<f64>() * span).floor() as usize).min(candidate_count - 1);
        let start_ms = clock.now_ms();
        log::debug!(
            "velocity search: {} candidates in [{min}, {max}], starting at #{start_index}",
            candidate_count
        );
        Self {
            params,
            clock,
            start_index,
            candidate_count,
            tried: 0,
            start_ms,
            finished: false,
        }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn try_count(&self) -> usize {
        self.tried
    }

    /// Speed of the `attempt`-th candidate; wraps around inside the range
    pub fn candidate_speed(&self, attempt: usize) -> f64 {
        let index = (self.start_index + attempt) % self.candidate_count;
        self.params.speed_range[0] + self.params.speed_step * index as f64
    }

    fn run_candidate(&self, engine: &Engine, speed: f64) -> Option<(DVec2, SimulateRecord)> {
        let ball = engine.config().ball(self.params.ball);
        let velocity = DVec2::new(-speed, 0.0);
        let position = engine.launch_end_position(ball.radius);
        match engine.simulate(&[ball.at(position, velocity)], self.params.max_ticks) {
            Ok(record) => is_good_result(&record, &self.params.destinations, self.params.pillar_hit_range)
                .then_some((velocity, record)),
            Err(e) => {
                log::error!("velocity search simulation failed: {e}");
                None
            }
        }
    }

    fn found(&mut self, velocity: DVec2, record: SimulateRecord, try_count: usize, fallback: bool) -> SearchPoll {
        self.finished = true;
        let end_ms = self.clock.now_ms();
        log::debug!(
            "velocity search found {:.3} after {try_count} tries in {:.0}ms",
            -velocity.x,
            end_ms - self.start_ms
        );
        SearchPoll::Found(Box::new(SearchOutcome {
            velocity,
            try_count,
            start_ms: self.start_ms,
            end_ms,
            record,
            fallback,
        }))
    }

    /// Run candidates until the slice or the whole budget is used up
    pub fn resume(&mut self, engine: &Engine, is_canceled: &dyn Fn() -> bool) -> SearchPoll {
        if self.finished {
            return SearchPoll::Exhausted;
        }
        if is_canceled() {
            self.finished = true;
            return SearchPoll::Canceled;
        }

        let slice_start = self.clock.now_ms();
        let mut ran_in_slice = 0;
        while self.tried < self.params.max_try_count {
            let now = self.clock.now_ms();
            if now - self.start_ms > SEARCH_BUDGET_MS {
                log::debug!("velocity search out of time after {} tries", self.tried);
                break;
            }
            if ran_in_slice > 0 && now - slice_start > YIELD_INTERVAL_MS {
                return SearchPoll::Pending;
            }

            let speed = self.candidate_speed(self.tried);
            self.tried += 1;
            ran_in_slice += 1;
            if let Some((velocity, record)) = self.run_candidate(engine, speed) {
                return self.found(velocity, record, self.tried, false);
            }
        }

        if let Some(fallback) = self.params.fallback_speed
            && let Some((velocity, record)) = self.run_candidate(engine, fallback.abs())
        {
            let try_count = self.params.max_try_count + 1;
            return self.found(velocity, record, try_count, true);
        }

        self.finished = true;
        log::warn!("velocity search exhausted after {} tries", self.tried);
        SearchPoll::Exhausted
    }
}

impl CooperativeJob for VelocitySearch {
    type Output = SearchOutcome;
    type Env = Engine;

    fn step(&mut self, env: &Engine, is_canceled: &dyn Fn() -> bool) -> TaskPoll<SearchOutcome> {
        match self.resume(env, is_canceled) {
            SearchPoll::Pending => TaskPoll::Pending,
            SearchPoll::Found(outcome) => TaskPoll::Ready(Ok(*outcome)),
            SearchPoll::Exhausted => TaskPoll::Ready(Err(TaskError::Failed)),
            SearchPoll::Canceled => TaskPoll::Ready(Err(TaskError::Canceled)),
        }
    }
}

/// Run a search to completion without yielding
pub fn find_velocity(
    params: SearchParams,
    engine: &Engine,
    rng: &mut impl Rng,
    clock: Rc<dyn Clock>,
) -> Option<SearchOutcome> {
    let mut search = VelocitySearch::new(params, rng, clock);
    loop {
        match search.resume(engine, &|| false) {
            SearchPoll::Pending => continue,
            SearchPoll::Found(outcome) => return Some(*outcome),
            SearchPoll::Exhausted | SearchPoll::Canceled => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualClock;
    use crate::sim::state::{EngineConfig, RoofShape, TableConfig};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn open_engine() -> Engine {
        Engine::new(EngineConfig {
            table: TableConfig {
                roof: RoofShape::Rectangle,
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn clock() -> Rc<dyn Clock> {
        Rc::new(ManualClock::new(0.0))
    }

    #[test]
    fn test_gen_destination() {
        let range = gen_destination(2, 6, 264.0, 9.0);
        assert_eq!(range, vec![[47.0, 85.0]]);
    }

    #[test]
    fn test_destination_is_half_open() {
        let dest = [10.0, 20.0];
        let at = |x: f64| (Some(DVec2::new(x, 0.0)), Some(DVec2::new(x, 0.0)));
        assert!(is_end_to_destination(&dest, &at(10.0)));
        assert!(is_end_to_destination(&dest, &at(19.99)));
        assert!(!is_end_to_destination(&dest, &at(20.0)));
        // Second-to-last position outside
        let drifting = (Some(DVec2::new(21.0, 0.0)), Some(DVec2::new(15.0, 0.0)));
        assert!(!is_end_to_destination(&dest, &drifting));
        // Single-frame run only checks the last position
        assert!(is_end_to_destination(&dest, &(None, Some(DVec2::new(15.0, 0.0)))));
        assert!(!is_end_to_destination(&dest, &(None, None)));
    }

    #[test]
    fn test_first_match_wins() {
        let dests = [[0.0, 100.0], [0.0, 200.0]];
        let ends = [
            (None, Some(DVec2::new(50.0, 0.0))),
            (None, Some(DVec2::new(60.0, 0.0))),
        ];
        assert_eq!(match_destinations(&dests, &ends), vec![0, 1]);

        let single = [[0.0, 100.0]];
        assert_eq!(match_destinations(&single, &ends), vec![0]);
    }

    #[test]
    fn test_any_landing_found_quickly() {
        let engine = open_engine();
        let width = engine.config().table.collision_zone_width;
        let params = SearchParams {
            destinations: vec![[0.0, width]],
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(7);
        let outcome = find_velocity(params, &engine, &mut rng, clock()).unwrap();
        assert!(outcome.try_count <= 2);
        assert!(outcome.record.is_end);
        assert!(!outcome.fallback);
        assert!(outcome.velocity.x <= -10.0 && outcome.velocity.x >= -17.0);
    }

    #[test]
    fn test_two_destinations_not_supported() {
        let engine = open_engine();
        let params = SearchParams {
            destinations: vec![[0.0, 180.0], [180.0, 360.0]],
            max_try_count: 40,
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(1);
        assert!(find_velocity(params, &engine, &mut rng, clock()).is_none());
    }

    #[test]
    fn test_fallback_speed() {
        let engine = open_engine();
        let params = SearchParams {
            destinations: vec![[0.0, 360.0]],
            max_try_count: 0,
            fallback_speed: Some(12.0),
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(3);
        let outcome = find_velocity(params, &engine, &mut rng, clock()).unwrap();
        assert!(outcome.fallback);
        assert_eq!(outcome.try_count, 1);
        assert_eq!(outcome.velocity, DVec2::new(-12.0, 0.0));
    }

    #[test]
    fn test_canceled_before_start() {
        let engine = open_engine();
        let mut rng = Pcg32::seed_from_u64(3);
        let mut search = VelocitySearch::new(SearchParams::default(), &mut rng, clock());
        assert!(matches!(search.resume(&engine, &|| true), SearchPoll::Canceled));
        assert_eq!(search.try_count(), 0);
    }

    /// Moves forward a fixed step every time it is read
    struct SteppingClock {
        now: std::cell::Cell<f64>,
        step: f64,
    }

    impl Clock for SteppingClock {
        fn now_ms(&self) -> f64 {
            self.now.set(self.now.get() + self.step);
            self.now.get()
        }
    }

    #[test]
    fn test_search_yields_then_cancels() {
        let engine = open_engine();
        let stepping = Rc::new(SteppingClock {
            now: std::cell::Cell::new(0.0),
            step: 10.0,
        });
        let mut rng = Pcg32::seed_from_u64(11);
        // No ball centre fits in [0, 1): every candidate misses
        let params = SearchParams {
            destinations: vec![[0.0, 1.0]],
            ..Default::default()
        };
        let mut search = VelocitySearch::new(params, &mut rng, stepping);

        assert!(matches!(search.resume(&engine, &|| false), SearchPoll::Pending));
        let first_slice = search.try_count();
        assert!(first_slice > 0 && first_slice < 20, "tries = {first_slice}");

        assert!(matches!(search.resume(&engine, &|| false), SearchPoll::Pending));
        assert!(search.try_count() > first_slice);

        let tried = search.try_count();
        assert!(matches!(search.resume(&engine, &|| true), SearchPoll::Canceled));
        assert_eq!(search.try_count(), tried);
        assert!(matches!(search.resume(&engine, &|| false), SearchPoll::Exhausted));
    }

    #[test]
    fn test_time_budget_ends_search() {
        let engine = open_engine();
        let manual = Rc::new(ManualClock::new(0.0));
        let mut rng = Pcg32::seed_from_u64(3);
        let params = SearchParams {
            destinations: vec![[0.0, 1.0]],
            ..Default::default()
        };
        let mut search = VelocitySearch::new(params, &mut rng, manual.clone());
        manual.advance(SEARCH_BUDGET_MS + 1.0);
        assert!(matches!(search.resume(&engine, &|| false), SearchPoll::Exhausted));
        assert_eq!(search.try_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_candidates_stay_in_range(seed in any::<u64>(), attempt in 0usize..20_000) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let search = VelocitySearch::new(SearchParams::default(), &mut rng, clock());
            let speed = search.candidate_speed(attempt);
            prop_assert!(speed >= 10.0 - 1e-9);
            prop_assert!(speed <= 17.0 + 1e-9);
        }
    }
}
