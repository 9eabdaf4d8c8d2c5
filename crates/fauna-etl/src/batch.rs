//! Batch accumulation
//!
//! Collects normalized records into fixed-size groups in arrival order.
//! Every accepted record appears in exactly one emitted batch; boundaries
//! never reorder records.

use crate::models::NormalizedRecord;

/// Fixed-size batch accumulator
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    buffer: Vec<NormalizedRecord>,
}

impl BatchAccumulator {
    /// Create an accumulator emitting batches of `capacity` records
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Append one record; returns the full batch once the bound is reached
    pub fn accept(&mut self, record: NormalizedRecord) -> Option<Vec<NormalizedRecord>> {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity));
            Some(batch)
        } else {
            None
        }
    }

    /// Emit the trailing partial batch, if any; called once at end of run
    pub fn flush(&mut self) -> Option<Vec<NormalizedRecord>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
