//! The compaction score function read by the scheduler to decide what to
//! compact next.
//!
//! Scores are floats with a fixed convention: a score of at least 1.0 marks
//! the level as eligible for compaction, and the scheduler picks higher
//! scores first. L0 is scored on file count and raw size; the intermediate
//! levels are scored against a geometric target-size progression, with the
//! raw size compensated by the bytes the table-stats collector estimates a
//! compaction would reclaim from tombstones. The bottommost level has
//! nothing to compact into and is not scored.

use crate::config::ScoringOptions;
use crate::metrics::{Metrics, NUM_LEVELS};

/// Per-level reclaimable-bytes estimates contributed by the table-stats
/// collector. A small level carrying many tombstones compacts down to far
/// fewer bytes than its raw size, and scoring it on raw size alone would
/// leave it starved.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TableStats {
    /// Estimated bytes reclaimable by compacting point tombstones and the
    /// records they shadow.
    pub point_deletions_bytes_estimate: u64,
    /// Estimated bytes reclaimable by compacting range tombstones and the
    /// records they shadow.
    pub range_deletions_bytes_estimate: u64,
}

impl TableStats {
    fn reclaimable_bytes(&self) -> u64 {
        self.point_deletions_bytes_estimate + self.range_deletions_bytes_estimate
    }
}

/// The target sizes the geometric progression assigns to each level.
/// `target_bytes[0]` is unused; L0 is scored on file count and raw size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LevelTargets {
    /// The shallowest non-L0 level whose size reaches the configured
    /// minimum. Falls back to the bottommost level when the tree is small.
    pub base_level: usize,
    pub target_bytes: [u64; NUM_LEVELS],
}

/// Computes the target byte sizes for every non-L0 level: a geometric
/// progression anchored at `lbase_max_bytes` for the base level, multiplied
/// (or divided, above the base) by `level_size_multiplier` per level of
/// distance.
pub fn level_targets(metrics: &Metrics, options: &ScoringOptions) -> LevelTargets {
    let base_level = (1..NUM_LEVELS)
        .find(|&level| metrics.levels[level].size >= options.lbase_level_min_bytes)
        .unwrap_or(NUM_LEVELS - 1);
    let mut target_bytes = [0u64; NUM_LEVELS];
    for (level, target) in target_bytes.iter_mut().enumerate().skip(1) {
        *target = if level >= base_level {
            options
                .lbase_max_bytes
                .saturating_mul(options.level_size_multiplier.pow((level - base_level) as u32))
        } else {
            (options.lbase_max_bytes / options.level_size_multiplier.pow((base_level - level) as u32))
                .max(1)
        };
    }
    LevelTargets {
        base_level,
        target_bytes,
    }
}

/// Computes the compaction score for every level. The bottommost level is
/// reported as not applicable.
pub fn compaction_scores(
    metrics: &Metrics,
    table_stats: &[TableStats; NUM_LEVELS],
    options: &ScoringOptions,
) -> [Option<f64>; NUM_LEVELS] {
    let targets = level_targets(metrics, options);
    let mut scores = [None; NUM_LEVELS];

    let l0 = &metrics.levels[0];
    let file_score = l0.num_files as f64 / options.l0_compaction_file_threshold as f64;
    let byte_score = l0.size as f64 / options.l0_compaction_byte_threshold as f64;
    scores[0] = Some(file_score.max(byte_score));

    for level in 1..NUM_LEVELS - 1 {
        let compensated =
            metrics.levels[level].size + table_stats[level].reclaimable_bytes();
        scores[level] = Some(compensated as f64 / targets.target_bytes[level] as f64);
    }
    scores
}

/// Stamps the computed scores into the per-level metrics so the report can
/// render them. Unscored levels keep a zero score and are printed as "-".
pub fn assign_level_scores(
    metrics: &mut Metrics,
    table_stats: &[TableStats; NUM_LEVELS],
    options: &ScoringOptions,
) {
    let scores = compaction_scores(metrics, table_stats, options);
    for (level, score) in scores.iter().enumerate() {
        metrics.levels[level].score = score.unwrap_or(0.0);
    }
}

/// The level the scheduler should compact next: the highest score that has
/// reached the eligibility threshold of 1.0, or nothing if the tree is in
/// shape.
pub fn pick_compaction_level(scores: &[Option<f64>; NUM_LEVELS]) -> Option<usize> {
    scores
        .iter()
        .enumerate()
        .filter_map(|(level, score)| score.map(|s| (level, s)))
        .filter(|&(_, score)| score >= 1.0)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(level, _)| level)
}
