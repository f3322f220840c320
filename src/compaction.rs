//! Runs a single compaction: drains a [`CompactionIterator`] into an output
//! writer, reporting byte and record counts into the metrics model as it
//! goes.
//!
//! The writer only ever sees a successful prefix of the output stream. If
//! the iterator latches an error the run is abandoned, the returned delta is
//! discarded, and the caller must throw away the partially written file;
//! input levels are left untouched and the scheduler is free to retry.

use log::{debug, error};

use crate::compaction_iterator::CompactionIterator;
use crate::error::ShaleDbError;
use crate::iter::InternalIterator;
use crate::metrics::LevelMetrics;
use crate::types::InternalKey;

use self::stats::CompactionStats;

/// Accepts the emitted (internal key, value) pairs in order and materializes
/// them into the output file.
pub trait OutputWriter {
    fn add(&mut self, key: &InternalKey, value: &[u8]) -> Result<(), ShaleDbError>;
}

/// Drains `iter` into `writer` and returns the counter delta for the output
/// level. On error, nothing is returned and the partial output must not be
/// installed.
pub fn run_compaction<I, W>(
    mut iter: CompactionIterator<I>,
    writer: &mut W,
    stats: &CompactionStats,
) -> Result<LevelMetrics, ShaleDbError>
where
    I: InternalIterator,
    W: OutputWriter,
{
    stats.running_compactions.inc();
    let result = drain(&mut iter, writer, stats);
    stats.running_compactions.dec();

    let close_result = iter.close();
    let (bytes, records) = match (result, close_result) {
        (Ok(counts), Ok(())) => counts,
        (Err(e), _) | (Ok(_), Err(e)) => {
            error!("compaction failed, discarding partial output: {}", e);
            stats.failed_compactions.inc();
            return Err(e);
        }
    };

    stats.completed_compactions.inc();
    debug!("compaction emitted {} records ({} bytes)", records, bytes);
    Ok(LevelMetrics {
        bytes_compacted: bytes,
        // An elision-only run can consume its whole input and produce no
        // output table at all.
        tables_compacted: u64::from(records > 0),
        ..LevelMetrics::default()
    })
}

fn drain<I, W>(
    iter: &mut CompactionIterator<I>,
    writer: &mut W,
    stats: &CompactionStats,
) -> Result<(u64, u64), ShaleDbError>
where
    I: InternalIterator,
    W: OutputWriter,
{
    let mut bytes = 0u64;
    let mut records = 0u64;
    let mut more = iter.first();
    while more {
        writer.add(iter.key(), iter.value())?;
        let emitted = (iter.key().encoded_size() + iter.value().len()) as u64;
        bytes += emitted;
        records += 1;
        stats.bytes_compacted.add(emitted);
        stats.records_compacted.inc();
        more = iter.next();
    }
    if let Some(e) = iter.error() {
        return Err(e.clone());
    }
    Ok((bytes, records))
}

pub mod stats {
    use std::sync::Arc;

    use crate::stats::{Counter, Gauge, StatRegistry};

    pub const BYTES_COMPACTED: &str = "compaction/bytes_compacted";
    pub const RECORDS_COMPACTED: &str = "compaction/records_compacted";
    pub const COMPLETED_COMPACTIONS: &str = "compaction/completed_compactions";
    pub const FAILED_COMPACTIONS: &str = "compaction/failed_compactions";
    pub const RUNNING_COMPACTIONS: &str = "compaction/running_compactions";

    /// Stats for compaction execution.
    ///
    /// Each compaction adds its own contribution; readers polling the
    /// registry may observe the set mid-update but never a torn value.
    pub struct CompactionStats {
        pub bytes_compacted: Arc<Counter>,
        pub records_compacted: Arc<Counter>,
        pub completed_compactions: Arc<Counter>,
        pub failed_compactions: Arc<Counter>,
        pub running_compactions: Arc<Gauge>,
    }

    impl CompactionStats {
        /// Creates a new set of compaction stats and registers them with the
        /// given registry.
        pub fn new(registry: &StatRegistry) -> Self {
            let stats = Self {
                bytes_compacted: Arc::new(Counter::default()),
                records_compacted: Arc::new(Counter::default()),
                completed_compactions: Arc::new(Counter::default()),
                failed_compactions: Arc::new(Counter::default()),
                running_compactions: Arc::new(Gauge::default()),
            };
            registry.register(BYTES_COMPACTED, stats.bytes_compacted.clone());
            registry.register(RECORDS_COMPACTED, stats.records_compacted.clone());
            registry.register(COMPLETED_COMPACTIONS, stats.completed_compactions.clone());
            registry.register(FAILED_COMPACTIONS, stats.failed_compactions.clone());
            registry.register(RUNNING_COMPACTIONS, stats.running_compactions.clone());
            stats
        }
    }
}
