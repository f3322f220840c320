#![cfg_attr(test, allow(clippy::unwrap_used))]
#![warn(clippy::panic)]
#![cfg_attr(test, allow(clippy::panic))]

//! The compaction merge engine of a log-structured merge-tree key/value
//! store.
//!
//! The engine consumes an ordered stream of versioned records drawn from
//! several levels of the LSM through an [`InternalIterator`], and emits the
//! reduced stream that preserves observable database state: shadowed
//! versions are dropped, merge operands are folded, and tombstones are
//! elided when the scheduler proves nothing below them remains. Alongside
//! the record stream, the crate carries the numeric contract between
//! compaction execution and compaction scheduling: per-level counters and
//! amplification formulas ([`metrics`]), and the score function that drives
//! picking ([`scoring`]).
//!
//! The sstable reader/writer, WAL, memtable, manifest and object storage
//! layers are external collaborators; the engine only names the interfaces
//! it consumes from them.

/// Re-export the bytes crate.
///
/// This is useful for users of the crate who want to use ShaleDB
/// without having to depend on the bytes crate directly.
pub use bytes;

pub use compaction::{run_compaction, OutputWriter};
pub use compaction_iterator::{CompactionIterator, ElideTombstone, RangeDeleteSink};
pub use config::ScoringOptions;
pub use error::ShaleDbError;
pub use iter::InternalIterator;
pub use merge_operator::{MergeOperator, MergeOperatorError, MergeOperatorType};
pub use metrics::{LevelMetrics, Metrics, NUM_LEVELS};
pub use scoring::{compaction_scores, level_targets, LevelTargets, TableStats};
pub use types::{
    bytewise_comparator, internal_compare, InternalKey, InternalKeyKind, UserComparator,
    SEQ_NUM_BATCH, SEQ_NUM_MAX,
};

pub mod compaction;
pub mod config;
pub mod metrics;
pub mod scoring;
pub mod stats;

mod compaction_iterator;
mod error;
mod iter;
mod merge_operator;
#[cfg(test)]
mod test_utils;
mod types;
mod utils;
