//! # metricd
//!
//! Time-bucketed metric aggregation with deadline-driven flushing.
//!
//! Samples are grouped into aggregation slots keyed by
//! `(bucket start, table, label values)`. A slot stays open until its window
//! closes on the monotonic clock, then a background thread removes it and
//! hands it to a [`FlushSink`] exactly once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use metricd::{AggregationService, ConfigList, InMemorySink, Sample, TableConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sink = Arc::new(InMemorySink::new());
//! let service = AggregationService::start(sink.clone())?;
//!
//! service.apply_config(
//!     &ConfigList::new().with_table(TableConfig::new("cpu", 1_000_000).with_label("host")),
//! )?;
//!
//! service.insert_sample(&Sample::new("cpu", "42.5", metricd::unix_micros(), vec!["web1".into()]))?;
//! service.insert_samples_batch(b"cpu[web2]:17\ncpu[web1]:40\n", None)?;
//!
//! sink.wait_for(2, Duration::from_secs(2));
//! for slot in sink.take() {
//!     println!("{} {:?} avg={}", slot.table_name(), slot.labels(), slot.aggregate().average());
//! }
//!
//! service.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`SlotRegistry`]: content index plus deadline-ordered time index, no
//!   locking of its own.
//! - [`AggregationService`]: owns the registry behind a mutex, resolves
//!   samples against a hot-swappable [`ConfigSnapshot`] and runs the
//!   expiration thread.
//! - Pluggable strategies: [`Reducer`] (value accumulation), [`Decoder`]
//!   (wire format) and [`FlushSink`] (durable write path).

#![deny(missing_docs)]
#![deny(clippy::all, clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod clock;
pub mod config;
pub mod decoder;
pub mod error;
pub mod reducer;
pub mod registry;
pub mod rewrite;
pub mod sample;
pub mod service;
pub mod sink;
pub mod slot;

pub use clock::{MICROS_PER_SECOND, MonotonicClock, unix_micros};
pub use config::{ConfigList, ConfigSnapshot, ConfigSnapshotBuilder, LabelConfig, TableConfig};
pub use decoder::{DecodedSample, Decoder, StatsdDecoder};
pub use error::{AggregationError, ErrorKind, Result};
pub use reducer::{LastValueReducer, Reducer, SummaryReducer};
pub use registry::SlotRegistry;
pub use rewrite::{BatchInsertOptions, MetricIdRewrite};
pub use sample::Sample;
pub use service::{AggregationService, AggregationServiceBuilder, BatchReport};
pub use sink::{FlushSink, InMemorySink, LogSink};
pub use slot::{Aggregate, AggregationSlot, DigestFn, SlotId, slot_digest};
