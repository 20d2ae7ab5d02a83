//! Pending rows for batched inserts.

use postgresql_types::SinkValue;

/// Default number of rows per batched insert.
pub const DEFAULT_BUFFER_LIMIT: usize = 10;

/// Ordered rows awaiting a multi-row insert.
///
/// One buffer belongs to one table writer session, so rows of different
/// tables can never interleave in a flush.
#[derive(Debug)]
pub struct InsertBuffer {
    rows: Vec<Vec<SinkValue>>,
    limit: usize,
}

impl InsertBuffer {
    /// Create a buffer that flushes at `limit` rows. A limit of 0 is treated as 1.
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            rows: Vec::new(),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.
    pub fn push(&mut self, row: Vec<SinkValue>) {
        self.rows.push(row);
    }

    /// Whether a flush is due: the limit is reached, or `force` is set and
    /// anything is pending.
    pub fn is_due(&self, force: bool) -> bool {
        self.rows.len() >= self.limit || (force && !self.rows.is_empty())
    }

    /// Take all pending rows in arrival order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Vec<SinkValue>> {
        std::mem::take(&mut self.rows)
    }
}

impl Default for InsertBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_LIMIT)
    }
}
