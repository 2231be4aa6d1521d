//! Strategies that fold sample values into a slot's [`Aggregate`].

use crate::error::{AggregationError, Result};
use crate::slot::Aggregate;

/// Folds sample values into slot state.
///
/// `parse` runs before the registry lock is taken. `fold` runs while the lock
/// is held, so it must be cheap, must not block and must not call back into
/// the service.
pub trait Reducer: Send + Sync {
    /// Converts a raw sample value into the numeric form `fold` consumes.
    fn parse(&self, raw: &str) -> Result<f64> {
        parse_number(raw)
    }

    /// Folds one value into `aggregate`.
    fn fold(&self, aggregate: &mut Aggregate, value: f64);
}

/// Parses a trimmed decimal or scientific-notation float.
pub fn parse_number(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(AggregationError::invalid(format!(
            "invalid sample value: '{raw}'"
        ))),
    }
}

/// Keeps min, max, sum, count and last value.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryReducer;

impl Reducer for SummaryReducer {
    fn fold(&self, aggregate: &mut Aggregate, value: f64) {
        aggregate.accumulate(value);
    }
}

/// Keeps only the most recent value; `count` still tracks every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastValueReducer;

impl Reducer for LastValueReducer {
    fn fold(&self, aggregate: &mut Aggregate, value: f64) {
        let count = aggregate.count + 1;
        *aggregate = Aggregate::from_value(value);
        aggregate.count = count;
    }
}
