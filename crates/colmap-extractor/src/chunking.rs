//! Row-range chunking for the compound extraction pass

use std::ops::Range;

/// Progress percentage when the compound pass starts
pub const EXTRACTION_START_PERCENT: u8 = 35;

/// Progress percentage when the last chunk finishes
pub const EXTRACTION_END_PERCENT: u8 = 85;

/// Splits a table's rows into contiguous ranges whose prompts fit a token budget
///
/// The estimate for the full prompt decides how many chunks are needed:
/// `chunk_size = ceil(rows / ceil(estimated_tokens / budget))`. The last
/// chunk may be smaller than the others.
#[derive(Debug, Clone, Copy)]
pub struct RowChunker {
    token_budget: usize,
}

impl RowChunker {
    /// Create a new chunker
    pub fn new(token_budget: usize) -> Self {
        Self {
            token_budget: token_budget.max(1),
        }
    }

    /// Plan row ranges for a prompt estimated at `estimated_tokens` over `total_rows` rows
    pub fn plan(&self, total_rows: usize, estimated_tokens: usize) -> Vec<Range<usize>> {
        if estimated_tokens <= self.token_budget || total_rows == 0 {
            return vec![0..total_rows];
        }

        let chunk_count = estimated_tokens.div_ceil(self.token_budget);
        let chunk_size = total_rows.div_ceil(chunk_count).max(1);

        (0..total_rows)
            .step_by(chunk_size)
            .map(|start| start..(start + chunk_size).min(total_rows))
            .collect()
    }
}

/// Progress percentage after finishing chunk `index` (0-based) of `count`
///
/// Linear between [`EXTRACTION_START_PERCENT`] and [`EXTRACTION_END_PERCENT`].
pub fn chunk_progress_percent(index: usize, count: usize) -> u8 {
    if count == 0 {
        return EXTRACTION_END_PERCENT;
    }
    let span = (EXTRACTION_END_PERCENT - EXTRACTION_START_PERCENT) as usize;
    let done = (index + 1).min(count);
    EXTRACTION_START_PERCENT + (span * done / count) as u8
}
