//! Metric identifier rewriting for batch inserts.

use regex::Regex;

use crate::error::Result;

/// Options for a single batch insert.
#[derive(Debug, Clone, Default)]
pub struct BatchInsertOptions {
    /// Optional `(pattern, replacement)` applied to every decoded metric id.
    pub metric_id_rewrite: Option<(String, String)>,
}

impl BatchInsertOptions {
    /// Creates options without a rewrite rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the metric id rewrite rule.
    #[must_use]
    pub fn with_metric_id_rewrite(
        mut self,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.metric_id_rewrite = Some((pattern.into(), replacement.into()));
        self
    }

    pub(crate) fn compile(&self) -> Result<Option<MetricIdRewrite>> {
        self.metric_id_rewrite
            .as_ref()
            .map(|(pattern, replacement)| MetricIdRewrite::new(pattern, replacement))
            .transpose()
    }
}

/// Compiled find/replace rule for metric identifiers.
///
/// Only the first match is used and text outside it is dropped: the result
/// is the replacement expanded against that match (`$1`, `${name}`). An id
/// the pattern does not match rewrites to the empty string.
#[derive(Debug, Clone)]
pub struct MetricIdRewrite {
    pattern: Regex,
    replacement: String,
}

impl MetricIdRewrite {
    /// Compiles a rule. An invalid pattern is a `Runtime` error.
    pub fn new(pattern: &str, replacement: &str) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.to_string(),
        })
    }

    /// Applies the rule to `metric_id`.
    pub fn apply(&self, metric_id: &str) -> String {
        let mut rewritten = String::new();
        if let Some(captures) = self.pattern.captures(metric_id) {
            captures.expand(&self.replacement, &mut rewritten);
        }
        rewritten
    }
}
