//! Decoded metric samples.

/// A decoded metric sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    metric_id: String,
    value: String,
    timestamp: u64,
    labels: Vec<String>,
}

impl Sample {
    /// Creates a sample.
    ///
    /// `timestamp` is in microseconds since the unix epoch. `labels` are the
    /// ordered label values; names come from the table's schema.
    pub fn new(
        metric_id: impl Into<String>,
        value: impl Into<String>,
        timestamp: u64,
        labels: Vec<String>,
    ) -> Self {
        Self {
            metric_id: metric_id.into(),
            value: value.into(),
            timestamp,
            labels,
        }
    }

    /// Metric identifier, which names the target table.
    pub fn metric_id(&self) -> &str {
        &self.metric_id
    }

    /// Raw value payload.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Event time in microseconds since the unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Ordered label values.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}
