//! Wire-format decoding for batch inserts.
//!
//! The built-in [`StatsdDecoder`] reads newline-separated text records:
//!
//! ```text
//! metric_id[series_id]:value|type
//! ```
//!
//! The `[series_id]` and `|type` parts are optional. The series id is a
//! comma-separated list of label values; the type suffix is accepted and
//! ignored.

use crate::error::{AggregationError, Result};
use crate::sample::Sample;

/// One record as produced by a [`Decoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSample {
    /// Metric identifier.
    pub metric_id: String,
    /// Raw series identifier; empty when the record carried none.
    pub series_id: String,
    /// Raw value payload.
    pub value: String,
}

impl DecodedSample {
    /// Splits the series id into ordered label values.
    pub fn labels(&self) -> Vec<String> {
        series_labels(&self.series_id)
    }

    /// Converts the record into a [`Sample`] stamped with `timestamp`.
    pub fn into_sample(self, timestamp: u64) -> Sample {
        let labels = self.labels();
        Sample::new(self.metric_id, self.value, timestamp, labels)
    }
}

/// Splits a comma-separated series id into label values.
pub fn series_labels(series_id: &str) -> Vec<String> {
    if series_id.trim().is_empty() {
        return Vec::new();
    }

    series_id.split(',').map(|v| v.trim().to_string()).collect()
}

/// Decodes records from a buffer.
pub trait Decoder: Send + Sync {
    /// Decodes the record starting at `*cursor` and advances the cursor past it.
    ///
    /// Returns `Ok(None)` once only whitespace remains. After an error the
    /// cursor position is unspecified and decoding must not resume.
    fn decode(&self, buf: &[u8], cursor: &mut usize) -> Result<Option<DecodedSample>>;
}

/// Decoder for statsd-style text records.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsdDecoder;

impl Decoder for StatsdDecoder {
    fn decode(&self, buf: &[u8], cursor: &mut usize) -> Result<Option<DecodedSample>> {
        while *cursor < buf.len() && buf[*cursor].is_ascii_whitespace() {
            *cursor += 1;
        }

        if *cursor >= buf.len() {
            return Ok(None);
        }

        let start = *cursor;
        let end = buf[start..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(buf.len(), |p| start + p);

        let line = std::str::from_utf8(&buf[start..end]).map_err(|_| {
            AggregationError::parse(format!("invalid packet: non-utf8 record at byte {start}"))
        })?;

        let sample = parse_record(line.trim_end_matches('\r'), start)?;
        *cursor = (end + 1).min(buf.len());
        Ok(Some(sample))
    }
}

fn parse_record(line: &str, offset: usize) -> Result<DecodedSample> {
    let invalid = |what: &str| {
        AggregationError::parse(format!("invalid packet: {what} at byte {offset}"))
    };

    let colon = line.find(':');
    let (metric_id, series_id, rest) = match line.find('[') {
        Some(open) if colon.is_none_or(|c| open < c) => {
            let close = line[open..]
                .find(']')
                .map(|p| open + p)
                .ok_or_else(|| invalid("unterminated series id"))?;
            let rest = line[close + 1..]
                .strip_prefix(':')
                .ok_or_else(|| invalid("expected ':' after series id"))?;
            (&line[..open], &line[open + 1..close], rest)
        }
        _ => {
            let (metric_id, rest) = line
                .split_once(':')
                .ok_or_else(|| invalid("missing ':' separator"))?;
            (metric_id, "", rest)
        }
    };

    let metric_id = metric_id.trim();
    if metric_id.is_empty() {
        return Err(invalid("empty metric id"));
    }

    let value = rest.split_once('|').map_or(rest, |(value, _)| value).trim();
    if value.is_empty() {
        return Err(invalid("empty value"));
    }

    Ok(DecodedSample {
        metric_id: metric_id.to_string(),
        series_id: series_id.trim().to_string(),
        value: value.to_string(),
    })
}
