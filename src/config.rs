//! Table configuration and the immutable snapshots published from it.
//!
//! A [`ConfigSnapshot`] is never mutated after it is built. Reconfiguration
//! builds a new snapshot from a copy of the current one and swaps it in, so a
//! reader that loaded the previous snapshot keeps a consistent view for as
//! long as it holds the `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AggregationError, Result};

/// Declares one label of a table's schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Label name. Only the ordered values travel with a sample.
    pub name: String,
}

impl LabelConfig {
    /// Creates a label declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Aggregation settings for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    /// Stable table identifier. Slot identity is derived from this name.
    pub name: String,
    /// Width of an aggregation bucket in microseconds. Must be non-zero.
    pub interval: u64,
    /// Ordered label schema.
    #[serde(default)]
    pub labels: Vec<LabelConfig>,
}

impl TableConfig {
    /// Creates a table with the given interval (microseconds) and no labels.
    pub fn new(name: impl Into<String>, interval: u64) -> Self {
        Self {
            name: name.into(),
            interval,
            labels: Vec::new(),
        }
    }

    /// Appends a label to the schema.
    #[must_use]
    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        self.labels.push(LabelConfig::new(name));
        self
    }

    /// Checks that the name is non-empty and the interval is non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(AggregationError::invalid("table name must not be empty"));
        }

        if self.interval == 0 {
            return Err(AggregationError::invalid(format!(
                "table '{}' has a zero aggregation interval",
                self.name
            )));
        }

        Ok(())
    }

    /// Rounds `timestamp` down to the start of the bucket containing it.
    pub fn bucket_start(&self, timestamp: u64) -> u64 {
        timestamp - timestamp % self.interval
    }

    /// Returns the exclusive end of the bucket containing `timestamp`.
    pub fn bucket_end(&self, timestamp: u64) -> u64 {
        self.bucket_start(timestamp).saturating_add(self.interval)
    }
}

/// An update handed to `apply_config` by a configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigList {
    #[serde(default)]
    tables: Vec<TableConfig>,
}

impl ConfigList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table definition.
    pub fn add_table(&mut self, table: TableConfig) {
        self.tables.push(table);
    }

    /// Builder-style variant of [`ConfigList::add_table`].
    #[must_use]
    pub fn with_table(mut self, table: TableConfig) -> Self {
        self.add_table(table);
        self
    }

    /// Iterates the `(table_name, config)` pairs in insertion order.
    pub fn table_configs(&self) -> impl Iterator<Item = (&str, &TableConfig)> {
        self.tables.iter().map(|t| (t.name.as_str(), t))
    }

    /// Returns the number of table definitions.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if the list holds no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Immutable view of the configured tables.
#[derive(Debug, Default)]
pub struct ConfigSnapshot {
    generation: u64,
    tables: HashMap<String, Arc<TableConfig>>,
}

impl ConfigSnapshot {
    /// Returns an empty snapshot (generation 0).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks a table up by name.
    pub fn find_table(&self, name: &str) -> Option<Arc<TableConfig>> {
        self.tables.get(name).cloned()
    }

    /// Returns the publication counter of this snapshot.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the configured table names, sorted.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of configured tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table is configured.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Builds the successor of a snapshot.
///
/// Starts from a copy of the base snapshot's table map. Tables already present
/// are shared by `Arc`, never mutated; adding a table with an existing name
/// replaces the entry in the new map only.
pub struct ConfigSnapshotBuilder {
    generation: u64,
    tables: HashMap<String, Arc<TableConfig>>,
}

impl ConfigSnapshotBuilder {
    /// Creates a builder seeded with the tables of `base`.
    pub fn from_snapshot(base: &ConfigSnapshot) -> Self {
        Self {
            generation: base.generation + 1,
            tables: base.tables.clone(),
        }
    }

    /// Adds or replaces a table.
    ///
    /// `name` must match the table's own name; the two disagreeing would make
    /// slot identity depend on which one a lookup used.
    pub fn add_table(&mut self, name: &str, table: &TableConfig) -> Result<()> {
        table.validate()?;
        if name != table.name {
            return Err(AggregationError::invalid(format!(
                "table registered as '{name}' is named '{}'",
                table.name
            )));
        }

        self.tables.insert(name.to_string(), Arc::new(table.clone()));
        Ok(())
    }

    /// Adds every table of `list`.
    pub fn add_tables(&mut self, list: &ConfigList) -> Result<()> {
        for (name, table) in list.table_configs() {
            self.add_table(name, table)?;
        }
        Ok(())
    }

    /// Finishes the snapshot.
    pub fn build(self) -> ConfigSnapshot {
        ConfigSnapshot {
            generation: self.generation,
            tables: self.tables,
        }
    }
}
