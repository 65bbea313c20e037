//! Row sampling for the discovery pass

use colmap_domain::NormalizedData;
use std::borrow::Cow;

/// Tables with more rows than this are sampled
pub const DEFAULT_SAMPLE_THRESHOLD: usize = 50;

/// Number of leading rows kept when sampling
pub const DEFAULT_SAMPLE_SIZE: usize = 30;

/// Bounds the row count shown to the discovery LLM call
///
/// Sampling keeps the first `sample_size` rows in their original order;
/// headers, column count, source and metadata are left untouched.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    threshold: usize,
    sample_size: usize,
}

impl Sampler {
    /// Create a sampler with explicit limits
    pub fn new(threshold: usize, sample_size: usize) -> Self {
        Self {
            threshold,
            sample_size,
        }
    }

    /// Whether a table of `total_rows` rows would be sampled
    pub fn will_sample(&self, total_rows: usize) -> bool {
        total_rows > self.threshold
    }

    /// Number of rows the discovery pass will see
    pub fn sample_size(&self, total_rows: usize) -> usize {
        if self.will_sample(total_rows) {
            total_rows.min(self.sample_size)
        } else {
            total_rows
        }
    }

    /// Sample `data`, borrowing it unchanged when no sampling is needed
    pub fn sample<'a>(&self, data: &'a NormalizedData) -> Cow<'a, NormalizedData> {
        if !self.will_sample(data.data.row_count) {
            return Cow::Borrowed(data);
        }

        let size = self.sample_size(data.data.row_count);
        let mut sampled = NormalizedData {
            source: data.source.clone(),
            data: colmap_domain::TabularData {
                headers: data.data.headers.clone(),
                rows: data.data.rows.iter().take(size).cloned().collect(),
                row_count: 0,
                column_count: data.data.column_count,
            },
            metadata: data.metadata.clone(),
        };
        sampled.data.row_count = sampled.data.rows.len();
        Cow::Owned(sampled)
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_THRESHOLD, DEFAULT_SAMPLE_SIZE)
    }
}
