//! # Statistics Module
//!
//! Live counters for the engine. Rather than integrate with a specific
//! observability platform, components register their stats in a
//! [`StatRegistry`] and applications poll it; the structured
//! [`crate::metrics::Metrics`] snapshot is assembled by sampling these
//! together with scheduler state.
//!
//! The engine's metrics are all 64-bit numbers, so the value types are
//! deliberately concrete: a [`Counter`] is a monotone `u64`, a [`Gauge`] is
//! a signed `i64` tracking current state (in-progress counts, live sizes),
//! and a [`Histogram`] records latency distributions over a fixed bucket
//! layout. All of them are cheaply clonable handles over shared atomics:
//! a component keeps one handle to write through while the registry holds
//! another for readers.
//!
//! A single writer updates a given counter; concurrent readers may observe
//! torn sets of counters but never a torn individual value. A
//! [`StatRegistry::snapshot`] is therefore a sample, not a transaction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;

/// A metric that can be sampled as a signed 64-bit value.
pub trait ReadableStat: Send + Sync + fmt::Debug {
    fn get(&self) -> i64;
}

/// Central repository of the engine's live metrics, keyed by name.
///
/// Component stats structs register themselves on construction (see
/// [`crate::compaction::stats::CompactionStats`]); pollers sample a single
/// stat with [`lookup`](StatRegistry::lookup) or everything at once with
/// [`snapshot`](StatRegistry::snapshot).
pub struct StatRegistry {
    stats: Mutex<BTreeMap<&'static str, Arc<dyn ReadableStat>>>,
}

impl StatRegistry {
    pub fn new() -> Self {
        Self {
            stats: Mutex::new(BTreeMap::new()),
        }
    }

    /// Get a metric with a specific name, or `None` if no metric was
    /// registered for the name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ReadableStat>> {
        let guard = self.stats.lock().expect("lock poisoned");
        guard.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let guard = self.stats.lock().expect("lock poisoned");
        guard.keys().copied().collect()
    }

    /// The current value of every registered stat, in name order.
    pub fn snapshot(&self) -> Vec<(&'static str, i64)> {
        let guard = self.stats.lock().expect("lock poisoned");
        guard
            .iter()
            .map(|(name, stat)| (*name, stat.get()))
            .collect()
    }

    /// Register a new metric with the registry. Registering a name twice is
    /// a bug; release builds keep the newest registration.
    pub(crate) fn register(&self, name: &'static str, stat: Arc<dyn ReadableStat>) {
        let mut guard = self.stats.lock().expect("lock poisoned");
        let previous = guard.insert(name, stat);
        debug_assert!(previous.is_none(), "stat {name} registered twice");
        if previous.is_some() {
            warn!("stat {} registered twice, keeping the newest", name);
        }
    }
}

impl Default for StatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A monotonically increasing counter.
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) -> u64 {
        self.add(1)
    }

    /// Adds `delta` and returns the previous value.
    pub fn add(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::Relaxed)
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl ReadableStat for Counter {
    fn get(&self) -> i64 {
        self.value() as i64
    }
}

/// A signed gauge tracking current state rather than accumulation.
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicI64>,
}

impl Gauge {
    /// Replaces the value, returning the previous one.
    pub fn set(&self, value: i64) -> i64 {
        self.value.swap(value, Ordering::Relaxed)
    }

    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::Relaxed)
    }

    pub fn sub(&self, delta: i64) -> i64 {
        self.add(-delta)
    }

    pub fn inc(&self) -> i64 {
        self.add(1)
    }

    pub fn dec(&self) -> i64 {
        self.sub(1)
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl ReadableStat for Gauge {
    fn get(&self) -> i64 {
        self.value()
    }
}

/// A fixed-bucket latency histogram.
///
/// Each bucket counts observations at or below its upper bound and above
/// the previous bound, with a final overflow bucket for everything larger.
/// Recording is lock-free; readers may observe a snapshot where the total
/// and the buckets are momentarily out of step.
#[derive(Clone)]
pub struct Histogram {
    upper_bounds: Arc<Vec<Duration>>,
    buckets: Arc<Vec<AtomicU64>>,
    count: Arc<AtomicU64>,
    sum_micros: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new(upper_bounds: Vec<Duration>) -> Self {
        debug_assert!(upper_bounds.windows(2).all(|w| w[0] < w[1]));
        let buckets = (0..upper_bounds.len() + 1).map(|_| AtomicU64::new(0)).collect();
        Self {
            upper_bounds: Arc::new(upper_bounds),
            buckets: Arc::new(buckets),
            count: Arc::new(AtomicU64::new(0)),
            sum_micros: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Buckets suitable for recording fsync latencies: 50 linear buckets of
    /// 100µs each, then 50 exponential buckets spanning 5ms to 10s.
    pub fn fsync_latency_buckets() -> Vec<Duration> {
        let mut bounds: Vec<Duration> = (0..50).map(|i| Duration::from_micros(i * 100)).collect();
        let start = Duration::from_millis(5).as_secs_f64();
        let end = Duration::from_secs(10).as_secs_f64();
        let factor = (end / start).powf(1.0 / 49.0);
        for i in 0..50 {
            bounds.push(Duration::from_secs_f64(start * factor.powi(i)));
        }
        bounds
    }

    pub fn record(&self, latency: Duration) {
        let idx = self.upper_bounds.partition_point(|bound| *bound < latency);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> Duration {
        Duration::from_micros(self.sum_micros.load(Ordering::Relaxed))
    }

    pub fn mean(&self) -> Duration {
        let count = self.count();
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.sum_micros.load(Ordering::Relaxed) / count)
    }

    pub fn upper_bounds(&self) -> &[Duration] {
        &self.upper_bounds
    }

    /// Per-bucket counts; the last entry is the overflow bucket.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(Self::fsync_latency_buckets())
    }
}

impl fmt::Debug for Histogram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram")
            .field("count", &self.count())
            .field("sum", &self.sum())
            .finish()
    }
}

impl ReadableStat for Histogram {
    fn get(&self) -> i64 {
        self.count() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_lookup_stat_by_name() {
        let registry = StatRegistry::new();
        let stat1 = Arc::new(Gauge::default());
        stat1.set(1);
        registry.register("stat1", stat1);
        let stat2 = Arc::new(Gauge::default());
        stat2.set(2);
        registry.register("stat2", stat2);

        assert_eq!(registry.lookup("stat1").unwrap().get(), 1);
        assert_eq!(registry.lookup("stat2").unwrap().get(), 2);
        assert!(registry.lookup("stat3").is_none());
    }

    #[test]
    fn should_list_registered_stats() {
        let registry = StatRegistry::new();
        registry.register("stat1", Arc::new(Gauge::default()));
        registry.register("stat2", Arc::new(Gauge::default()));
        registry.register("stat3", Arc::new(Gauge::default()));

        assert_eq!(registry.names(), vec!["stat1", "stat2", "stat3"]);
    }

    #[test]
    fn snapshot_samples_every_stat() {
        let registry = StatRegistry::new();
        let counter = Arc::new(Counter::default());
        counter.add(3);
        registry.register("compactions", counter.clone());
        let gauge = Arc::new(Gauge::default());
        gauge.set(-2);
        registry.register("backlog", gauge);

        assert_eq!(
            registry.snapshot(),
            vec![("backlog", -2), ("compactions", 3)]
        );
        // The registry holds a handle to the live value, not a copy.
        counter.inc();
        assert_eq!(registry.lookup("compactions").unwrap().get(), 4);
    }

    #[test]
    fn counter_increments() {
        let counter = Counter::default();
        counter.inc();
        assert_eq!(counter.value(), 1);
        // add returns the value before the addition.
        assert_eq!(counter.add(2), 1);
        assert_eq!(counter.value(), 3);
    }

    #[test]
    fn gauge_arithmetic() {
        let gauge = Gauge::default();
        assert_eq!(gauge.value(), 0);
        gauge.add(200);
        assert_eq!(gauge.value(), 200);
        gauge.sub(42);
        assert_eq!(gauge.value(), 158);
        gauge.inc();
        gauge.dec();
        assert_eq!(gauge.value(), 158);
        assert_eq!(gauge.set(-5), 158);
        assert_eq!(gauge.value(), -5);
    }

    #[test]
    fn fsync_buckets_span_linear_and_exponential_ranges() {
        let bounds = Histogram::fsync_latency_buckets();
        assert_eq!(bounds.len(), 100);
        // Linear region: 100µs steps.
        assert_eq!(bounds[0], Duration::ZERO);
        assert_eq!(bounds[1], Duration::from_micros(100));
        assert_eq!(bounds[49], Duration::from_micros(4900));
        // Exponential region: 5ms up to 10s.
        assert_eq!(bounds[50], Duration::from_millis(5));
        assert!((bounds[99].as_secs_f64() - 10.0).abs() < 1e-6);
        assert!(bounds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn histogram_records_into_the_right_bucket() {
        let histogram = Histogram::new(vec![
            Duration::from_millis(1),
            Duration::from_millis(10),
            Duration::from_millis(100),
        ]);
        histogram.record(Duration::from_micros(500));
        histogram.record(Duration::from_millis(10));
        histogram.record(Duration::from_secs(5));
        assert_eq!(histogram.bucket_counts(), vec![1, 1, 0, 1]);
        assert_eq!(histogram.count(), 3);
        assert_eq!(
            histogram.sum(),
            Duration::from_micros(500) + Duration::from_millis(10) + Duration::from_secs(5)
        );
    }

    #[test]
    fn histogram_mean() {
        let histogram = Histogram::default();
        assert_eq!(histogram.mean(), Duration::ZERO);
        histogram.record(Duration::from_micros(100));
        histogram.record(Duration::from_micros(300));
        assert_eq!(histogram.mean(), Duration::from_micros(200));
    }
}
