//! Content-addressed store of open aggregation slots.
//!
//! The registry keeps two indices over the same set of slots:
//!
//! - a content index from [`SlotId`] digest to the time-index keys of every
//!   slot sharing that digest, and
//! - a time index ordered by `(expire_at, serial)`, which owns the slots.
//!
//! Every time-index key appears in exactly one content-index bucket and vice
//! versa. The serial is assigned at creation, so slots with equal deadlines
//! drain in creation order.
//!
//! The registry has no internal locking. Callers serialise access, normally by
//! holding it inside the service's state mutex.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::TableConfig;
use crate::slot::{Aggregate, AggregationSlot, DigestFn, SlotId, slot_digest};

/// Position of a slot in the time index.
type TimeKey = (u64, u64);

/// Open slots indexed by content and by deadline.
pub struct SlotRegistry {
    digest: DigestFn,
    next_serial: u64,
    by_id: HashMap<SlotId, Vec<TimeKey>>,
    by_deadline: BTreeMap<TimeKey, AggregationSlot>,
}

impl SlotRegistry {
    /// Creates an empty registry using the CRC-32 slot digest.
    pub fn new() -> Self {
        Self::with_digest(slot_digest)
    }

    /// Creates an empty registry with a custom digest function.
    pub fn with_digest(digest: DigestFn) -> Self {
        Self {
            digest,
            next_serial: 0,
            by_id: HashMap::new(),
            by_deadline: BTreeMap::new(),
        }
    }

    /// Returns the open slot for a key, creating it if necessary.
    ///
    /// `expire_at` only applies to a newly created slot; an existing slot keeps
    /// the deadline it was created with. The boolean is true when the slot was
    /// created by this call.
    pub fn get_or_create_slot(
        &mut self,
        bucket_start: u64,
        expire_at: u64,
        table: &Arc<TableConfig>,
        labels: &[String],
    ) -> (&mut AggregationSlot, bool) {
        let slot_id = (self.digest)(bucket_start, &table.name, labels);

        let existing = self.find_key(slot_id, bucket_start, &table.name, labels);
        let created = existing.is_none();
        let key = match existing {
            Some(key) => key,
            None => {
                let key = (expire_at, self.next_serial);
                self.next_serial += 1;
                self.by_id.entry(slot_id).or_default().push(key);
                key
            }
        };

        let slot = self
            .by_deadline
            .entry(key)
            .or_insert_with(|| AggregationSlot {
                slot_id,
                serial: key.1,
                bucket_start,
                expire_at,
                table: Arc::clone(table),
                labels: labels.to_vec(),
                aggregate: Aggregate::empty(),
            });

        (slot, created)
    }

    /// Returns the open slot for a key without creating one.
    pub fn get(
        &self,
        bucket_start: u64,
        table_name: &str,
        labels: &[String],
    ) -> Option<&AggregationSlot> {
        let slot_id = (self.digest)(bucket_start, table_name, labels);
        self.find_key(slot_id, bucket_start, table_name, labels)
            .and_then(|key| self.by_deadline.get(&key))
    }

    /// Removes and returns every slot with `expire_at <= as_of`.
    ///
    /// Slots come back in ascending deadline order, ties in creation order.
    /// An empty result is not an error.
    pub fn drain_expired(&mut self, as_of: u64) -> Vec<AggregationSlot> {
        let mut expired = Vec::new();

        while let Some(entry) = self.by_deadline.first_entry() {
            if entry.key().0 > as_of {
                break;
            }

            let (key, slot) = entry.remove_entry();
            self.unlink(slot.slot_id, key);
            expired.push(slot);
        }

        expired
    }

    /// Returns the earliest pending deadline, if any slot is open.
    pub fn peek_next_deadline(&self) -> Option<u64> {
        self.by_deadline.first_key_value().map(|(&(expire_at, _), _)| expire_at)
    }

    /// Iterates open slots in deadline order.
    pub fn iter(&self) -> impl Iterator<Item = &AggregationSlot> {
        self.by_deadline.values()
    }

    /// Returns the number of open slots.
    pub fn len(&self) -> usize {
        self.by_deadline.len()
    }

    /// Returns true if no slot is open.
    pub fn is_empty(&self) -> bool {
        self.by_deadline.is_empty()
    }

    fn find_key(
        &self,
        slot_id: SlotId,
        bucket_start: u64,
        table_name: &str,
        labels: &[String],
    ) -> Option<TimeKey> {
        let candidates = self.by_id.get(&slot_id)?;
        candidates.iter().copied().find(|key| {
            self.by_deadline
                .get(key)
                .is_some_and(|slot| slot.matches(bucket_start, table_name, labels))
        })
    }

    fn unlink(&mut self, slot_id: SlotId, key: TimeKey) {
        if let Some(candidates) = self.by_id.get_mut(&slot_id) {
            candidates.retain(|candidate| *candidate != key);
            if candidates.is_empty() {
                self.by_id.remove(&slot_id);
            }
        }
    }

    /// Checks that both indices reference exactly the same slots.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let linked: usize = self.by_id.values().map(Vec::len).sum();
        if linked != self.by_deadline.len() {
            return false;
        }

        let content_to_time = self.by_id.iter().all(|(slot_id, keys)| {
            !keys.is_empty()
                && keys.iter().all(|key| {
                    self.by_deadline
                        .get(key)
                        .is_some_and(|slot| slot.slot_id == *slot_id)
                })
        });

        let time_to_content = self.by_deadline.iter().all(|(key, slot)| {
            key.1 == slot.serial
                && key.0 == slot.expire_at
                && self
                    .by_id
                    .get(&slot.slot_id)
                    .is_some_and(|keys| keys.contains(key))
        });

        content_to_time && time_to_content
    }
}

impl Default for SlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}
