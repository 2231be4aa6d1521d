//! Builder for [`AggregationService`].

use std::sync::Arc;

use super::AggregationService;
use crate::config::ConfigList;
use crate::decoder::{Decoder, StatsdDecoder};
use crate::error::Result;
use crate::reducer::{Reducer, SummaryReducer};
use crate::sink::{FlushSink, LogSink};
use crate::slot::{DigestFn, slot_digest};

/// Default name of the expiration thread.
const DEFAULT_THREAD_NAME: &str = "metricd-expiration";

/// Builder for configuring and starting an [`AggregationService`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use metricd::{AggregationService, ConfigList, InMemorySink, TableConfig};
///
/// # fn main() -> metricd::Result<()> {
/// let sink = Arc::new(InMemorySink::new());
/// let service = AggregationService::builder()
///     .sink(sink.clone())
///     .initial_config(ConfigList::new().with_table(TableConfig::new("cpu", 10_000_000)))
///     .start()?;
///
/// service.insert_samples_batch(b"cpu:42\n", None)?;
/// service.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct AggregationServiceBuilder {
    pub(super) reducer: Arc<dyn Reducer>,
    pub(super) sink: Arc<dyn FlushSink>,
    pub(super) decoder: Arc<dyn Decoder>,
    pub(super) digest: DigestFn,
    pub(super) thread_name: String,
    pub(super) initial_config: Option<ConfigList>,
}

impl AggregationServiceBuilder {
    /// Creates a builder with the summary reducer, log sink and statsd decoder.
    pub fn new() -> Self {
        Self {
            reducer: Arc::new(SummaryReducer),
            sink: Arc::new(LogSink),
            decoder: Arc::new(StatsdDecoder),
            digest: slot_digest,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            initial_config: None,
        }
    }

    /// Sets the strategy that folds sample values into slots.
    #[must_use]
    pub fn reducer(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.reducer = reducer;
        self
    }

    /// Sets where expired slots are handed.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn FlushSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the wire-format decoder used by batch inserts.
    #[must_use]
    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Overrides the slot digest function.
    #[must_use]
    pub fn digest(mut self, digest: DigestFn) -> Self {
        self.digest = digest;
        self
    }

    /// Names the expiration thread.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Tables published before the expiration thread starts.
    #[must_use]
    pub fn initial_config(mut self, config: ConfigList) -> Self {
        self.initial_config = Some(config);
        self
    }

    /// Starts the service and its expiration thread.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the initial configuration is invalid and
    /// `Runtime` if the thread cannot be spawned.
    pub fn start(self) -> Result<AggregationService> {
        AggregationService::start_with_builder(self)
    }
}

impl Default for AggregationServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
