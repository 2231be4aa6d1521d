//! Destinations for expired slots.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use crate::error::Result;
use crate::slot::AggregationSlot;

/// Receives slots once their aggregation window has closed.
///
/// The scheduler hands each drained slot to `accept` exactly once, with the
/// registry lock released. Durability and retries are the sink's concern; a
/// returned error is logged and the slots are dropped.
pub trait FlushSink: Send + Sync {
    /// Takes ownership of a batch of expired slots, in deadline order.
    fn accept(&self, slots: Vec<AggregationSlot>) -> Result<()>;
}

/// Sink that only logs how many slots were flushed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl FlushSink for LogSink {
    fn accept(&self, slots: Vec<AggregationSlot>) -> Result<()> {
        #[cfg(feature = "logging")]
        log::info!("insert {} slots", slots.len());
        drop(slots);
        Ok(())
    }
}

#[derive(Default)]
struct Collected {
    slots: Vec<AggregationSlot>,
    batches: usize,
}

/// Sink that keeps flushed slots in memory.
///
/// Useful for embedding and tests: [`InMemorySink::wait_for`] blocks until a
/// number of slots has arrived.
#[derive(Default)]
pub struct InMemorySink {
    collected: Mutex<Collected>,
    arrived: Condvar,
}

impl InMemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until at least `count` slots have been received or `timeout`
    /// passes. Returns true if the count was reached.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        let (collected, _) = self
            .arrived
            .wait_timeout_while(collected, timeout, |c| c.slots.len() < count)
            .unwrap_or_else(PoisonError::into_inner);
        collected.slots.len() >= count
    }

    /// Returns the number of slots received so far.
    pub fn len(&self) -> usize {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .len()
    }

    /// Returns true if nothing has been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns how many `accept` calls have been made.
    pub fn batches(&self) -> usize {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .batches
    }

    /// Removes and returns every slot received so far.
    pub fn take(&self) -> Vec<AggregationSlot> {
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut collected.slots)
    }
}

impl FlushSink for InMemorySink {
    fn accept(&self, slots: Vec<AggregationSlot>) -> Result<()> {
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        collected.slots.extend(slots);
        collected.batches += 1;
        self.arrived.notify_all();
        Ok(())
    }
}
