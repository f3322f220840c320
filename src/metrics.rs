//! The metrics model: per-level counters, aggregate views, and the
//! human-readable report.
//!
//! A [`Metrics`] value is a snapshot, not a transaction: the engine's live
//! counters (see [`crate::stats`]) are sampled into it by whoever owns the
//! database state, and the derived views ([`Metrics::total`],
//! [`Metrics::read_amp`], [`Metrics::disk_space_usage`]) are computed from
//! the snapshot. Counters are monotone for the lifetime of the database;
//! gauges (sizes, counts of live objects, in-progress bytes) track current
//! state. Nothing here is persisted; metrics restart from zero at database
//! open.

use std::fmt;
use std::time::Duration;

use crate::stats::Histogram;
use crate::utils::{hit_rate, iec, si};

/// The number of levels in the LSM.
pub const NUM_LEVELS: usize = 7;

/// Misc additional per-level metrics that are not always printed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AdditionalLevelMetrics {
    /// The sum of the value-block sizes for all sstables in the level.
    /// Printed by the report iff at least one level has a non-zero value.
    pub value_blocks_size: u64,
    /// Cumulative bytes written to data blocks via compactions or flushes.
    pub bytes_written_data_blocks: u64,
    /// Cumulative bytes written to value blocks via compactions or flushes.
    pub bytes_written_value_blocks: u64,
}

/// Per-level metrics such as the number of files and total size of the
/// files, and compaction related metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LevelMetrics {
    /// The number of sublevels within the level. The sublevel count
    /// corresponds to the read amplification for the level: an empty level
    /// has zero sublevels, and only L0 can have more than one.
    pub sublevels: u32,
    /// The total number of files in the level.
    pub num_files: u64,
    /// The total size in bytes of the files in the level.
    pub size: u64,
    /// The level's compaction score, as computed by
    /// [`crate::scoring::compaction_scores`].
    pub score: f64,
    /// The number of incoming bytes from other levels read during
    /// compactions. This excludes bytes moved and bytes ingested. For L0
    /// this is the number of bytes written to the WAL.
    pub bytes_in: u64,
    /// The number of bytes ingested. The sibling metric for tables is
    /// `tables_ingested`.
    pub bytes_ingested: u64,
    /// The number of bytes moved into the level by a "move" compaction.
    /// The sibling metric for tables is `tables_moved`.
    pub bytes_moved: u64,
    /// The number of bytes read for compactions at the level, including
    /// bytes read from other levels (`bytes_in`).
    pub bytes_read: u64,
    /// The number of bytes written during compactions. May be summed with
    /// `bytes_flushed` to compute the total bytes written for the level.
    pub bytes_compacted: u64,
    /// The number of bytes written during flushes. Always zero for levels
    /// other than L0.
    pub bytes_flushed: u64,
    /// The number of sstables compacted to this level.
    pub tables_compacted: u64,
    /// The number of sstables flushed to this level.
    pub tables_flushed: u64,
    /// The number of sstables ingested into the level.
    pub tables_ingested: u64,
    /// The number of sstables moved to this level by a "move" compaction.
    pub tables_moved: u64,
    pub additional: AdditionalLevelMetrics,
}

impl LevelMetrics {
    /// Sums the counter metrics field-wise. Sublevels and score are state,
    /// not counters, and are not combined here.
    pub fn add(&mut self, delta: &LevelMetrics) {
        self.num_files += delta.num_files;
        self.size += delta.size;
        self.bytes_in += delta.bytes_in;
        self.bytes_ingested += delta.bytes_ingested;
        self.bytes_moved += delta.bytes_moved;
        self.bytes_read += delta.bytes_read;
        self.bytes_compacted += delta.bytes_compacted;
        self.bytes_flushed += delta.bytes_flushed;
        self.tables_compacted += delta.tables_compacted;
        self.tables_flushed += delta.tables_flushed;
        self.tables_ingested += delta.tables_ingested;
        self.tables_moved += delta.tables_moved;
        self.additional.value_blocks_size += delta.additional.value_blocks_size;
        self.additional.bytes_written_data_blocks += delta.additional.bytes_written_data_blocks;
        self.additional.bytes_written_value_blocks += delta.additional.bytes_written_value_blocks;
    }

    /// The write amplification for compactions at this level, computed as
    /// (bytes_flushed + bytes_compacted) / bytes_in, or 0 when nothing has
    /// come in.
    pub fn write_amp(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        (self.bytes_flushed + self.bytes_compacted) as f64 / self.bytes_in as f64
    }
}

/// Metrics for the block cache or the table cache.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheMetrics {
    pub count: u64,
    pub size: u64,
    pub hits: u64,
    pub misses: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

/// Metrics for the filter policy.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FilterMetrics {
    pub hits: u64,
    pub misses: u64,
}

impl FilterMetrics {
    pub fn utility(&self) -> f64 {
        hit_rate(self.hits, self.misses)
    }
}

/// A cumulative throughput metric: bytes moved over the time spent working
/// versus idling.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ThroughputMetric {
    pub bytes: u64,
    pub work_duration: Duration,
    pub idle_duration: Duration,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CompactMetrics {
    /// The total number of compactions, and per-compaction type counts.
    pub count: u64,
    pub default_count: u64,
    pub delete_only_count: u64,
    pub elision_only_count: u64,
    pub move_count: u64,
    pub read_count: u64,
    pub rewrite_count: u64,
    pub multi_level_count: u64,
    /// An estimate of the number of bytes that need to be compacted for the
    /// LSM to reach a stable state.
    pub estimated_debt: u64,
    /// Bytes present in sstables being written by in-progress compactions.
    /// Zero when no compaction is running.
    pub in_progress_bytes: u64,
    /// Number of compactions that are in-progress.
    pub num_in_progress: u64,
    /// Count of files marked for compaction; such files are picked up by a
    /// rewrite compaction when nothing else is eligible.
    pub marked_files: u64,
    /// Cumulative duration of all compactions since the database was opened.
    pub duration: Duration,
    /// Number of compactions that failed and will be retried by the
    /// scheduler.
    pub failed_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct IngestMetrics {
    pub count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FlushMetrics {
    pub count: u64,
    pub write_throughput: ThroughputMetric,
    /// Zero or one in the current implementation.
    pub num_in_progress: u64,
    /// Monotonic counter of flush operations handling ingested tables.
    pub as_ingest_count: u64,
    /// Monotonic counter of tables ingested as flushables.
    pub as_ingest_table_count: u64,
    /// Monotonic counter of bytes flushed for flushables that originated as
    /// ingestion operations.
    pub as_ingest_bytes: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MemTableMetrics {
    /// Bytes allocated by memtables and large (flushable) batches.
    pub size: u64,
    pub count: u64,
    /// Bytes in memtables no longer referenced by the current database state
    /// but still pinned by an open iterator.
    pub zombie_size: u64,
    pub zombie_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct KeysMetrics {
    /// Approximate count of internal range key set keys in the database.
    pub range_key_sets_count: u64,
    /// Approximate count of point and range tombstones in the database.
    pub tombstone_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SnapshotMetrics {
    /// The number of currently open snapshots.
    pub count: u64,
    /// The sequence number of the earliest open snapshot.
    pub earliest_seq_num: u64,
    /// A running tally of keys written to sstables during flushes or
    /// compactions that would have been elided if it were not for open
    /// snapshots.
    pub pinned_keys: u64,
    /// A running sum of the size of keys and values written to sstables
    /// during flushes or compactions that would have been elided if it were
    /// not for open snapshots.
    pub pinned_size: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TableMetrics {
    /// Bytes in tables no longer referenced by the current database state or
    /// any open iterator, pending deletion.
    pub obsolete_size: u64,
    pub obsolete_count: u64,
    /// Bytes in tables no longer referenced by the current database state
    /// but still in use by an iterator.
    pub zombie_size: u64,
    pub zombie_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct WalMetrics {
    /// Number of live WAL files.
    pub files: u64,
    pub obsolete_files: u64,
    /// Physical size of the obsolete WAL files.
    pub obsolete_physical_size: u64,
    /// Size of the live data in the WAL files. With WAL file recycling this
    /// is less than the actual on-disk size.
    pub size: u64,
    /// Physical size of the WAL files on disk.
    pub physical_size: u64,
    /// Number of logical bytes written to the WAL (batch payload).
    pub bytes_in: u64,
    /// Number of bytes written to the WAL, including record fragment
    /// overhead.
    pub bytes_written: u64,
}

impl WalMetrics {
    pub fn write_amp(&self) -> f64 {
        if self.bytes_in == 0 {
            return 0.0;
        }
        self.bytes_written as f64 / self.bytes_in as f64
    }
}

/// Metrics for the various subsystems of the database: caches, compactions,
/// WAL, and per-level metrics.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub block_cache: CacheMetrics,
    pub compact: CompactMetrics,
    pub ingest: IngestMetrics,
    pub flush: FlushMetrics,
    pub filter: FilterMetrics,
    pub levels: [LevelMetrics; NUM_LEVELS],
    pub mem_table: MemTableMetrics,
    pub keys: KeysMetrics,
    pub snapshots: SnapshotMetrics,
    pub table: TableMetrics,
    pub table_cache: CacheMetrics,
    /// Count of open sstable iterators.
    pub table_iters: u64,
    /// Total time since the database was opened.
    pub uptime: Duration,
    pub wal: WalMetrics,
    /// Latencies of WAL fsync calls.
    pub fsync_latency: Histogram,
    options_file_size: u64,
    manifest_file_size: u64,
}

impl Metrics {
    pub fn set_options_file_size(&mut self, size: u64) {
        self.options_file_size = size;
    }

    pub fn set_manifest_file_size(&mut self, size: u64) {
        self.manifest_file_size = size;
    }

    /// The total disk space used by the database in bytes, including live
    /// and obsolete files.
    pub fn disk_space_usage(&self) -> u64 {
        let mut usage = self.wal.physical_size + self.wal.obsolete_physical_size;
        for level in &self.levels {
            usage += level.size;
        }
        usage += self.table.obsolete_size;
        usage += self.table.zombie_size;
        usage += self.options_file_size;
        usage += self.manifest_file_size;
        usage += self.compact.in_progress_bytes;
        usage
    }

    /// The current read amplification of the database: the number of
    /// sublevels in L0 plus the number of non-empty levels below it.
    pub fn read_amp(&self) -> u32 {
        self.levels.iter().map(|l| l.sublevels).sum()
    }

    /// The sum of the per-level metrics and WAL metrics. The total's
    /// bytes_in is the bytes written to the WAL plus the bytes ingested, and
    /// that amount is folded into the total's bytes_flushed so the overall
    /// write amplification is measured against externally induced work.
    pub fn total(&self) -> LevelMetrics {
        let mut total = LevelMetrics::default();
        for level in &self.levels {
            total.add(level);
            total.sublevels += level.sublevels;
        }
        total.bytes_in = self.wal.bytes_written + total.bytes_ingested;
        total.bytes_flushed += total.bytes_in;
        total
    }

    fn have_value_blocks(&self) -> bool {
        self.levels
            .iter()
            .any(|l| l.additional.value_blocks_size > 0)
    }

    fn format_wal_row(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "    WAL {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7.1}",
            self.wal.files,
            iec(self.wal.size),
            "-",
            iec(self.wal.bytes_in),
            "-",
            "-",
            "-",
            "-",
            iec(self.wal.bytes_written),
            "-",
            "-",
            "-",
            self.wal.write_amp(),
        )
    }

    fn format_level_row(
        f: &mut fmt::Formatter<'_>,
        metrics: &LevelMetrics,
        score: &str,
        include_value_blocks: bool,
    ) -> fmt::Result {
        write!(
            f,
            "{:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7.1}",
            metrics.num_files,
            iec(metrics.size),
            score,
            iec(metrics.bytes_in),
            iec(metrics.bytes_ingested),
            si(metrics.tables_ingested),
            iec(metrics.bytes_moved),
            si(metrics.tables_moved),
            iec(metrics.bytes_flushed + metrics.bytes_compacted),
            si(metrics.tables_flushed + metrics.tables_compacted),
            iec(metrics.bytes_read),
            metrics.sublevels,
            metrics.write_amp(),
        )?;
        if include_value_blocks {
            writeln!(f, " {:>7}", iec(metrics.additional.value_blocks_size))
        } else {
            writeln!(f)
        }
    }
}

/// Pretty-prints the metrics, showing a line for the WAL, a line per level,
/// and a total, followed by summary rows for the remaining subsystems.
/// Sizes use IEC units and counts SI units; "-" marks a slot where the
/// metric is not applicable.
impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let have_value_blocks = self.have_value_blocks();
        write!(
            f,
            concat!(
                "__level_____count____size___score______in__ingest(sz_cnt)",
                "____move(sz_cnt)___write(sz_cnt)____read___r-amp___w-amp"
            )
        )?;
        writeln!(f, "{}", if have_value_blocks { "__val-bl" } else { "" })?;
        self.format_wal_row(f)?;
        for (level, metrics) in self.levels.iter().enumerate() {
            write!(f, "{:>7} ", level)?;
            let score = if level < NUM_LEVELS - 1 {
                format!("{:.2}", metrics.score)
            } else {
                "-".to_string()
            };
            Self::format_level_row(f, metrics, &score, have_value_blocks)?;
        }
        write!(f, "  total ")?;
        Self::format_level_row(f, &self.total(), "-", have_value_blocks)?;

        writeln!(
            f,
            "  flush {:>9} {:>31} {:>7} {:>7}  {}",
            self.flush.count,
            iec(self.flush.as_ingest_bytes),
            self.flush.as_ingest_table_count,
            self.flush.as_ingest_count,
            "(ingest = tables-ingested, move = ingested-as-flushable)",
        )?;
        writeln!(
            f,
            "compact {:>9} {:>7} {:>7} {:>7} {} {}",
            self.compact.count,
            iec(self.compact.estimated_debt),
            iec(self.compact.in_progress_bytes),
            self.compact.num_in_progress,
            " ".repeat(24),
            "(size == estimated-debt, score = in-progress-bytes, in = num-in-progress)",
        )?;
        writeln!(
            f,
            "  ctype {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}  {}",
            self.compact.default_count,
            self.compact.delete_only_count,
            self.compact.elision_only_count,
            self.compact.move_count,
            self.compact.read_count,
            self.compact.rewrite_count,
            self.compact.multi_level_count,
            "(default, delete, elision, move, read, rewrite, multi-level)",
        )?;
        writeln!(
            f,
            " memtbl {:>9} {:>7}",
            self.mem_table.count,
            iec(self.mem_table.size)
        )?;
        writeln!(
            f,
            "zmemtbl {:>9} {:>7}",
            self.mem_table.zombie_count,
            iec(self.mem_table.zombie_size)
        )?;
        writeln!(
            f,
            "   ztbl {:>9} {:>7}",
            self.table.zombie_count,
            iec(self.table.zombie_size)
        )?;
        for (name, cache) in [("bcache", &self.block_cache), ("tcache", &self.table_cache)] {
            writeln!(
                f,
                "{:>7} {:>9} {:>7} {:>6.1}%  (score == hit-rate)",
                name,
                si(cache.count),
                iec(cache.size),
                cache.hit_rate(),
            )?;
        }
        writeln!(
            f,
            "  snaps {:>9} {:>7} {:>7}  (score == earliest seq num)",
            self.snapshots.count, "-", self.snapshots.earliest_seq_num,
        )?;
        writeln!(f, " titers {:>9}", self.table_iters)?;
        writeln!(
            f,
            " filter {:>9} {:>7} {:>6.1}%  (score == utility)",
            "-",
            "-",
            self.filter.utility(),
        )?;
        writeln!(f, " ingest {:>9}", self.ingest.count)?;
        Ok(())
    }
}
