//! Aggregation slots and their identity digest.

use std::fmt;
use std::sync::Arc;

use crate::config::TableConfig;

/// Digest of a slot's identifying key.
///
/// The digest only narrows the candidate set; two distinct keys may share a
/// `SlotId` and are told apart by comparing the full key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    /// Wraps a raw digest value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw digest value.
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Signature of a slot digest function: `(bucket_start, table_name, labels)`.
pub type DigestFn = fn(u64, &str, &[String]) -> SlotId;

/// Computes the CRC-32 digest of a slot key.
///
/// Every variable-length field is length-prefixed so that, for example,
/// labels `["a~b"]` and `["a", "b"]` never encode to the same byte stream.
/// The encoding uses only stable inputs, so digests are reproducible across
/// process runs.
pub fn slot_digest(bucket_start: u64, table_name: &str, labels: &[String]) -> SlotId {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&bucket_start.to_le_bytes());
    update_field(&mut hasher, table_name.as_bytes());
    hasher.update(&(labels.len() as u64).to_le_bytes());
    for label in labels {
        update_field(&mut hasher, label.as_bytes());
    }
    SlotId(hasher.finalize())
}

fn update_field(hasher: &mut crc32fast::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Running summary of the values folded into a slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    /// Minimum value seen.
    pub min: f64,
    /// Maximum value seen.
    pub max: f64,
    /// Sum of all values.
    pub sum: f64,
    /// Number of samples folded in.
    pub count: u64,
    /// Most recent value.
    pub last: f64,
}

impl Aggregate {
    /// Creates an empty aggregate.
    pub fn empty() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
            last: 0.0,
        }
    }

    /// Creates an aggregate holding a single value.
    pub fn from_value(value: f64) -> Self {
        Self {
            min: value,
            max: value,
            sum: value,
            count: 1,
            last: value,
        }
    }

    /// Accumulates a value.
    pub fn accumulate(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self::from_value(value);
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
            self.sum += value;
            self.count += 1;
            self.last = value;
        }
    }

    /// Merges another aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
        self.last = other.last;
    }

    /// Returns the mean, or `0.0` for an empty aggregate.
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Returns true if no value has been folded in.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for Aggregate {
    fn default() -> Self {
        Self::empty()
    }
}

/// Aggregation state for one `(bucket, table, labels)` combination.
///
/// Slots are owned by the registry while open. Draining moves them out, so a
/// flushed slot can never be handed a late sample.
#[derive(Debug)]
pub struct AggregationSlot {
    pub(crate) slot_id: SlotId,
    pub(crate) serial: u64,
    pub(crate) bucket_start: u64,
    pub(crate) expire_at: u64,
    pub(crate) table: Arc<TableConfig>,
    pub(crate) labels: Vec<String>,
    pub(crate) aggregate: Aggregate,
}

impl AggregationSlot {
    /// Digest of this slot's key.
    pub fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    /// Registry-unique creation counter. Two handles refer to the same slot
    /// exactly when their serials are equal.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Left-closed edge of the bucket, in microseconds.
    pub fn bucket_start(&self) -> u64 {
        self.bucket_start
    }

    /// Exclusive end of the bucket, in microseconds.
    pub fn bucket_end(&self) -> u64 {
        self.bucket_start.saturating_add(self.table.interval)
    }

    /// Monotonic deadline after which the slot is flushed.
    pub fn expire_at(&self) -> u64 {
        self.expire_at
    }

    /// Configuration of the owning table, as it was when the slot opened.
    pub fn table(&self) -> &Arc<TableConfig> {
        &self.table
    }

    /// Stable name of the owning table.
    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    /// Ordered label values.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Accumulated state.
    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    /// Mutable access to the accumulated state.
    pub fn aggregate_mut(&mut self) -> &mut Aggregate {
        &mut self.aggregate
    }

    pub(crate) fn matches(&self, bucket_start: u64, table_name: &str, labels: &[String]) -> bool {
        self.bucket_start == bucket_start && self.table.name == table_name && self.labels == labels
    }
}
