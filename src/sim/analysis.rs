//! Offline table analysis
//!
//! Runs every speed of a range once and reports how the table distributes
//! balls over the prize sections. Used for tuning pillar layouts, never on
//! the game path.

use std::collections::{BTreeMap, BTreeSet};

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::engine::Engine;
use super::search::{Range, gen_destination, is_end_to_destination};
use super::state::{BallPhysics, Collision, EngineConfig};
use crate::consts::DEFAULT_MAX_TICKS;
use crate::error::EngineError;
use crate::platform::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustiveParams {
    pub section_count: usize,
    pub speed_range: Range,
    pub speed_step: f64,
    /// Inclusive bounds on pillar hits for a run to count
    pub strike_count_range: (usize, usize),
}

impl Default for ExhaustiveParams {
    fn default() -> Self {
        Self {
            section_count: 6,
            speed_range: [10.0, 17.0],
            speed_step: 0.01,
            strike_count_range: (0, usize::MAX),
        }
    }
}

/// Longest and average gap (in speed steps) between two speeds landing in
/// the same prize
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorstTryCount {
    pub max: Vec<Option<usize>>,
    pub average: Vec<Option<f64>>,
    /// Index of the last speed landing in each prize
    pub last_index: Vec<Option<usize>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExhaustiveReport {
    pub speed_count: usize,
    /// Share of speeds that land cleanly in some prize
    pub legal_percent: f64,
    pub legal_result_count: usize,
    pub simulate_time_cost_ms: f64,
    pub simulate_time_cost_avg_ms: f64,
    pub prize_worst_try_count: WorstTryCount,
    pub pillars_hit_per_round: Vec<usize>,
    pub pillars_dedupe_hit_per_round: Vec<usize>,
    pub pillars_hit_distribution: BTreeMap<usize, usize>,
    pub pillars_dedupe_hit_distribution: BTreeMap<usize, usize>,
    /// Share of legal rounds in which each pillar was hit
    pub pillars_hit_pr: BTreeMap<u32, f64>,
    /// Share of legal rounds won by each prize
    pub prize_pr: BTreeMap<usize, f64>,
}

struct RoundResult {
    hit_pillars: Vec<u32>,
    dedupe_hit_pillars: Vec<u32>,
    prize: Option<usize>,
}

/// Every speed of `[min, max]` at `step` increments, endpoints included
pub fn speed_iter(range: Range, step: f64) -> Vec<f64> {
    let [min, max] = range;
    if step <= 0.0 || max < min {
        return vec![min];
    }
    let count = ((max - min) / step).floor() as usize;
    (0..=count).map(|i| min + i as f64 * step).collect()
}

fn prize_ranges(section_count: usize, width: f64, ball_radius: f64) -> Vec<Range> {
    (1..=section_count)
        .flat_map(|i| gen_destination(i, section_count, width, ball_radius))
        .collect()
}

fn hit_distribution(hits: &[usize]) -> BTreeMap<usize, usize> {
    let mut distribution = BTreeMap::new();
    for &hit in hits {
        *distribution.entry(hit).or_insert(0) += 1;
    }
    distribution
}

fn worst_try_count(prizes: &[Option<usize>], section_count: usize) -> WorstTryCount {
    let mut last_index: Vec<Option<usize>> = vec![None; section_count];
    let mut gaps: Vec<Vec<usize>> = vec![Vec::new(); section_count];

    for (idx, prize) in prizes.iter().enumerate() {
        let Some(prize) = *prize else {
            continue;
        };
        // First occurrence counts from a virtual index of -1
        let gap = last_index[prize].map_or(idx + 1, |prev| idx - prev);
        gaps[prize].push(gap);
        last_index[prize] = Some(idx);
    }

    WorstTryCount {
        max: gaps.iter().map(|g| g.iter().copied().max()).collect(),
        average: gaps
            .iter()
            .map(|g| (!g.is_empty()).then(|| g.iter().sum::<usize>() as f64 / g.len() as f64))
            .collect(),
        last_index,
    }
}

/// Simulate every speed once and summarize the outcomes
pub fn exhaustive(
    engine_config: EngineConfig,
    ball: BallPhysics,
    params: &ExhaustiveParams,
) -> Result<ExhaustiveReport, EngineError> {
    let engine = Engine::new(engine_config)?;
    let table = &engine.config().table;
    let prizes = prize_ranges(params.section_count, table.collision_zone_width, ball.radius);
    let speeds = speed_iter(params.speed_range, params.speed_step);
    let ball_config = engine.config().ball(ball);
    let position = engine.launch_end_position(ball.radius);

    let clock = SystemClock::new();
    let started = clock.now_ms();
    let mut rounds = Vec::with_capacity(speeds.len());
    for &speed in &speeds {
        let record = engine.simulate(&[ball_config.at(position, DVec2::new(-speed, 0.0))], DEFAULT_MAX_TICKS)?;

        let hit_pillars: Vec<u32> = record
            .collisions()
            .filter_map(|c| match c {
                Collision::Pillar { pillar_id, .. } => Some(*pillar_id),
                _ => None,
            })
            .collect();
        let dedupe_hit_pillars: Vec<u32> = hit_pillars
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let strikes_ok =
            params.strike_count_range.0 <= hit_pillars.len() && hit_pillars.len() <= params.strike_count_range.1;
        let prize = match record.end_positions().first() {
            Some(end) if record.is_end && strikes_ok => prizes.iter().position(|r| is_end_to_destination(r, end)),
            _ => None,
        };

        rounds.push(RoundResult {
            hit_pillars,
            dedupe_hit_pillars,
            prize,
        });
    }
    let simulate_time_cost_ms = clock.now_ms() - started;

    let prize_list: Vec<Option<usize>> = rounds.iter().map(|r| r.prize).collect();
    let legal: Vec<&RoundResult> = rounds.iter().filter(|r| r.prize.is_some()).collect();
    let legal_count = legal.len();
    let share = |n: usize| if legal_count == 0 { 0.0 } else { n as f64 / legal_count as f64 };

    let mut prize_counts: BTreeMap<usize, usize> = BTreeMap::new();
    for prize in legal.iter().filter_map(|r| r.prize) {
        *prize_counts.entry(prize).or_insert(0) += 1;
    }

    let mut pillar_rounds: BTreeMap<u32, usize> = table.pillars.iter().map(|p| (p.id, 0)).collect();
    for round in &legal {
        for id in &round.dedupe_hit_pillars {
            *pillar_rounds.entry(*id).or_insert(0) += 1;
        }
    }

    let pillars_hit_per_round: Vec<usize> = legal.iter().map(|r| r.hit_pillars.len()).collect();
    let pillars_dedupe_hit_per_round: Vec<usize> = legal.iter().map(|r| r.dedupe_hit_pillars.len()).collect();

    let report = ExhaustiveReport {
        speed_count: speeds.len(),
        legal_percent: legal_count as f64 / speeds.len().max(1) as f64,
        legal_result_count: legal_count,
        simulate_time_cost_ms,
        simulate_time_cost_avg_ms: simulate_time_cost_ms / speeds.len().max(1) as f64,
        prize_worst_try_count: worst_try_count(&prize_list, params.section_count),
        pillars_hit_distribution: hit_distribution(&pillars_hit_per_round),
        pillars_dedupe_hit_distribution: hit_distribution(&pillars_dedupe_hit_per_round),
        pillars_hit_per_round,
        pillars_dedupe_hit_per_round,
        pillars_hit_pr: pillar_rounds.into_iter().map(|(id, n)| (id, share(n))).collect(),
        prize_pr: prize_counts.into_iter().map(|(prize, n)| (prize, share(n))).collect(),
    };

    log::info!(
        "exhaustive: {} speeds, {:.1}% legal, {:.1}ms total ({:.3}ms/run)",
        report.speed_count,
        report.legal_percent * 100.0,
        report.simulate_time_cost_ms,
        report.simulate_time_cost_avg_ms
    );
    log::debug!("prize probability: {:?}", report.prize_pr);
    log::debug!("pillar hit probability: {:?}", report.pillars_hit_pr);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::{RoofShape, TableConfig};

    #[test]
    fn test_speed_iter_includes_endpoints() {
        let speeds = speed_iter([10.0, 11.0], 0.25);
        assert_eq!(speeds, vec![10.0, 10.25, 10.5, 10.75, 11.0]);
        assert_eq!(speed_iter([5.0, 5.0], 0.1), vec![5.0]);
    }

    #[test]
    fn test_worst_try_count() {
        let prizes = [Some(0), None, Some(1), Some(0), None, Some(0)];
        let worst = worst_try_count(&prizes, 3);
        assert_eq!(worst.max, vec![Some(3), Some(3), None]);
        assert_eq!(worst.last_index, vec![Some(5), Some(2), None]);
        assert_eq!(worst.average[0], Some(2.0));
        assert_eq!(worst.average[2], None);
    }

    #[test]
    fn test_hit_distribution() {
        let dist = hit_distribution(&[2, 3, 2, 0]);
        assert_eq!(dist.get(&2), Some(&2));
        assert_eq!(dist.get(&0), Some(&1));
        assert_eq!(dist.len(), 3);
    }

    #[test]
    fn test_exhaustive_open_table() {
        let config = EngineConfig {
            table: TableConfig {
                roof: RoofShape::Rectangle,
                ..Default::default()
            },
            ..Default::default()
        };
        let params = ExhaustiveParams {
            speed_range: [10.0, 11.0],
            speed_step: 0.5,
            ..Default::default()
        };
        let report = exhaustive(config, BallPhysics::default(), &params).unwrap();
        assert_eq!(report.speed_count, 3);
        assert!(report.legal_result_count <= 3);
        // No pillars: nothing can be hit
        assert!(report.pillars_hit_pr.is_empty());
        assert!(report.pillars_hit_per_round.iter().all(|&n| n == 0));
        let total: f64 = report.prize_pr.values().sum();
        if report.legal_result_count > 0 {
            assert!((total - 1.0).abs() < 1e-9);
        }
    }
}
