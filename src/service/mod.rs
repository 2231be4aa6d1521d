//! The aggregation service: ingestion, configuration and expiration.
//!
//! # Concurrency Model
//!
//! - The [`SlotRegistry`] and the shutdown flag live behind one mutex, paired
//!   with a condition variable that wakes the expiration thread.
//! - Ingestion holds that mutex only for slot lookup/creation and the
//!   reducer's fold. Decoding, value parsing and sink I/O run unlocked.
//! - The configuration snapshot is published through an [`ArcSwap`]. Readers
//!   never block; `apply_config` calls are serialised among themselves so that
//!   no update is lost.
//! - Exactly one expiration thread runs from construction until
//!   [`AggregationService::shutdown`] (or drop) joins it.

mod builder;
mod scheduler;

pub use builder::AggregationServiceBuilder;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwap;

use crate::clock::{MonotonicClock, unix_micros};
use crate::config::{ConfigList, ConfigSnapshot, ConfigSnapshotBuilder, TableConfig};
use crate::decoder::Decoder;
use crate::error::{AggregationError, Result};
use crate::reducer::Reducer;
use crate::registry::SlotRegistry;
use crate::rewrite::BatchInsertOptions;
use crate::sample::Sample;
use crate::sink::FlushSink;
use crate::slot::AggregationSlot;

/// Outcome of a batch insert that decoded to the end of its buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Samples folded into a slot.
    pub inserted: usize,
    /// Samples that decoded but were rejected (and logged).
    pub rejected: usize,
}

/// State guarded by the registry mutex.
struct SchedulerState {
    registry: SlotRegistry,
    shutdown: bool,
}

/// State shared between callers and the expiration thread.
struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
    config: ArcSwap<ConfigSnapshot>,
    publish_lock: Mutex<()>,
    clock: MonotonicClock,
    reducer: Arc<dyn Reducer>,
    sink: Arc<dyn FlushSink>,
}

impl Shared {
    // Registry mutation never interleaves with caller code, so the indices are
    // consistent even if a reducer panicked while the lock was held.
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Groups samples into time-bucketed slots and flushes them when their
/// window closes.
pub struct AggregationService {
    shared: Arc<Shared>,
    decoder: Arc<dyn Decoder>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationService {
    /// Returns a builder for configuring the service.
    pub fn builder() -> AggregationServiceBuilder {
        AggregationServiceBuilder::new()
    }

    /// Starts a service that hands expired slots to `sink`, with default
    /// reducer and decoder.
    pub fn start(sink: Arc<dyn FlushSink>) -> Result<Self> {
        Self::builder().sink(sink).start()
    }

    fn start_with_builder(builder: AggregationServiceBuilder) -> Result<Self> {
        let mut snapshot = ConfigSnapshot::empty();
        if let Some(config) = &builder.initial_config {
            let mut snapshot_builder = ConfigSnapshotBuilder::from_snapshot(&snapshot);
            snapshot_builder.add_tables(config)?;
            snapshot = snapshot_builder.build();
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(SchedulerState {
                registry: SlotRegistry::with_digest(builder.digest),
                shutdown: false,
            }),
            wake: Condvar::new(),
            config: ArcSwap::from_pointee(snapshot),
            publish_lock: Mutex::new(()),
            clock: MonotonicClock::new(),
            reducer: builder.reducer,
            sink: builder.sink,
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(builder.thread_name)
            .spawn(move || scheduler::run(&thread_shared))?;

        Ok(Self {
            shared,
            decoder: builder.decoder,
            scheduler: Mutex::new(Some(handle)),
        })
    }

    /// Publishes a new configuration snapshot.
    ///
    /// The new snapshot starts from the current one; tables in `config` are
    /// added or replace same-named tables, others are kept. Nothing is
    /// published if any table is invalid. Ingestion is never blocked: callers
    /// that already loaded the previous snapshot keep using it.
    pub fn apply_config(&self, config: &ConfigList) -> Result<()> {
        let _publish = self
            .shared
            .publish_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut builder = ConfigSnapshotBuilder::from_snapshot(&self.shared.config.load());
        builder.add_tables(config)?;
        let snapshot = builder.build();

        #[cfg(feature = "logging")]
        log::info!(
            "publishing configuration generation {} with {} tables",
            snapshot.generation(),
            snapshot.len()
        );

        self.shared.config.store(Arc::new(snapshot));
        Ok(())
    }

    /// Returns the currently published configuration snapshot.
    pub fn config_snapshot(&self) -> Arc<ConfigSnapshot> {
        self.shared.config.load_full()
    }

    /// Folds one sample into the slot for its table, bucket and labels.
    ///
    /// The bucket is derived from the sample's timestamp; the slot deadline
    /// from the monotonic clock, so a newly seen bucket always gets a full
    /// interval to accumulate.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty metric id, an unparsable value or
    ///   more label values than the table declares.
    /// - `NotFound` if no table is configured for the metric.
    /// - `Runtime` after shutdown.
    pub fn insert_sample(&self, sample: &Sample) -> Result<()> {
        if sample.metric_id().is_empty() {
            return Err(AggregationError::invalid("metric id must not be empty"));
        }

        let table = self
            .shared
            .config
            .load()
            .find_table(sample.metric_id())
            .ok_or_else(|| {
                AggregationError::NotFound(format!("table not found: {}", sample.metric_id()))
            })?;

        let labels = resolve_labels(&table, sample.labels())?;
        let value = self.shared.reducer.parse(sample.value())?;
        let bucket_start = table.bucket_start(sample.timestamp());

        let created = {
            let mut state = self.shared.lock_state();
            if state.shutdown {
                return Err(AggregationError::Runtime(
                    "aggregation service is shut down".to_string(),
                ));
            }

            let expire_at = self.shared.clock.now_micros().saturating_add(table.interval);
            let (slot, created) =
                state
                    .registry
                    .get_or_create_slot(bucket_start, expire_at, &table, &labels);
            self.shared.reducer.fold(slot.aggregate_mut(), value);
            created
        };

        if created {
            self.shared.wake.notify_all();
        }

        Ok(())
    }

    /// Decodes and inserts every record of `buf`.
    ///
    /// Each decoded record is stamped with the current wall-clock time and,
    /// if `opts` carries a rewrite rule, has its metric id rewritten first.
    /// Per-sample insertion failures are logged and counted in the report.
    ///
    /// # Errors
    ///
    /// - `Runtime` if the rewrite pattern does not compile; nothing is
    ///   ingested.
    /// - `Parse` on the first malformed record. Records before it stay
    ///   ingested; records after it are not looked at.
    pub fn insert_samples_batch(
        &self,
        buf: &[u8],
        opts: Option<&BatchInsertOptions>,
    ) -> Result<BatchReport> {
        let rewrite = match opts {
            Some(opts) => opts.compile()?,
            None => None,
        };

        let mut report = BatchReport::default();
        let mut cursor = 0;

        while let Some(mut decoded) = self.decoder.decode(buf, &mut cursor)? {
            if let Some(rule) = &rewrite {
                decoded.metric_id = rule.apply(&decoded.metric_id);
            }

            let sample = decoded.into_sample(unix_micros());
            match self.insert_sample(&sample) {
                Ok(()) => report.inserted += 1,
                Err(err) => {
                    report.rejected += 1;
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "batch insert failed: {err}; metric_id={} value={}",
                        sample.metric_id(),
                        sample.value()
                    );
                    #[cfg(not(feature = "logging"))]
                    let _ = err;
                }
            }
        }

        Ok(report)
    }

    /// Removes and returns every open slot with a deadline at or before
    /// `as_of` (monotonic microseconds, see [`AggregationService::now_micros`]).
    ///
    /// The slots are not handed to the sink.
    pub fn drain_expired(&self, as_of: u64) -> Vec<AggregationSlot> {
        self.shared.lock_state().registry.drain_expired(as_of)
    }

    /// Hands every open slot to the sink regardless of its deadline.
    ///
    /// Returns the number of slots flushed.
    pub fn flush_all(&self) -> Result<usize> {
        let slots = self.drain_expired(u64::MAX);
        let count = slots.len();
        if count > 0 {
            self.shared.sink.accept(slots)?;
        }
        Ok(count)
    }

    /// Current reading of the monotonic clock slot deadlines are set on.
    pub fn now_micros(&self) -> u64 {
        self.shared.clock.now_micros()
    }

    /// Earliest pending slot deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.shared.lock_state().registry.peek_next_deadline()
    }

    /// Number of open slots.
    pub fn open_slots(&self) -> usize {
        self.shared.lock_state().registry.len()
    }

    /// Stops the expiration thread and waits for it to exit.
    ///
    /// A flush already in progress completes first. Open slots are abandoned,
    /// not flushed. Calling this more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns `Runtime` if the expiration thread panicked.
    pub fn shutdown(&self) -> Result<()> {
        self.shared.lock_state().shutdown = true;
        self.shared.wake.notify_all();

        let handle = {
            let mut scheduler = self.scheduler.lock().unwrap_or_else(PoisonError::into_inner);
            // A sink calling shutdown from the expiration thread cannot join
            // itself; the handle stays for an outside caller to join.
            let on_scheduler_thread = scheduler
                .as_ref()
                .is_some_and(|handle| handle.thread().id() == thread::current().id());
            if on_scheduler_thread {
                return Ok(());
            }
            scheduler.take()
        };

        match handle {
            Some(handle) => handle.join().map_err(|_| {
                AggregationError::Runtime("expiration thread panicked".to_string())
            }),
            None => Ok(()),
        }
    }
}

impl Drop for AggregationService {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Validates label values against the table's schema, padding missing
/// trailing values with empty strings.
fn resolve_labels(table: &TableConfig, values: &[String]) -> Result<Vec<String>> {
    let declared = table.labels.len();
    if values.len() > declared {
        return Err(AggregationError::invalid(format!(
            "table '{}' declares {declared} labels, sample carries {}",
            table.name,
            values.len()
        )));
    }

    let mut labels = values.to_vec();
    labels.resize(declared, String::new());
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    #[test]
    fn test_resolve_labels_pads_missing_values() {
        let table = TableConfig::new("cpu", 10).with_label("host").with_label("core");
        assert_eq!(
            resolve_labels(&table, &labels(&["h1"])).unwrap(),
            labels(&["h1", ""])
        );
        assert_eq!(resolve_labels(&table, &[]).unwrap(), labels(&["", ""]));
    }

    #[test]
    fn test_resolve_labels_rejects_extra_values() {
        let table = TableConfig::new("cpu", 10).with_label("host");
        let err = resolve_labels(&table, &labels(&["a", "b"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_insert_after_shutdown_is_rejected() {
        let service = AggregationService::builder()
            .initial_config(ConfigList::new().with_table(TableConfig::new("cpu", 1_000_000)))
            .start()
            .unwrap();
        service.shutdown().unwrap();
        service.shutdown().unwrap();

        let err = service
            .insert_sample(&Sample::new("cpu", "1", 0, Vec::new()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_new_slot_deadline_is_processing_time_plus_interval() {
        let interval = 3_600_000_000;
        let service = AggregationService::builder()
            .initial_config(ConfigList::new().with_table(TableConfig::new("cpu", interval)))
            .start()
            .unwrap();

        let before = service.now_micros();
        service
            .insert_sample(&Sample::new("cpu", "1", 5, Vec::new()))
            .unwrap();
        let after = service.now_micros();

        let deadline = service.next_deadline().unwrap();
        assert!(deadline >= before + interval);
        assert!(deadline <= after + interval);

        let slots = service.drain_expired(u64::MAX);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].bucket_start(), 0);
        service.shutdown().unwrap();
    }
}
