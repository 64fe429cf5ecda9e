//! Sequencing buffer for ordered output
//!
//! Accepts `(seq, payload)` pairs in any arrival order and releases the
//! payloads strictly by increasing sequence number, holding early arrivals
//! until the gap before them closes.

use std::collections::HashMap;

use crate::error::{PoolError, Result};

/// Restores ascending sequence order from arbitrarily ordered arrivals
///
/// Memory is bounded by the longest run of payloads that arrive ahead of the
/// smallest outstanding sequence number.
#[derive(Debug)]
pub struct Sequencer<T> {
    next_expected: u64,
    pending: HashMap<u64, T>,
}

impl<T> Default for Sequencer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sequencer<T> {
    pub fn new() -> Self {
        Self {
            next_expected: 0,
            pending: HashMap::new(),
        }
    }

    /// Submit a payload and get back everything that became releasable
    ///
    /// The returned iterator is lazy: payloads are taken out of the buffer as
    /// it is advanced. Anything not consumed stays buffered and is released
    /// by a later submission.
    pub fn submit(&mut self, seq: u64, payload: T) -> Result<Released<'_, T>> {
        if seq < self.next_expected || self.pending.contains_key(&seq) {
            return Err(PoolError::DuplicateSequence {
                seq,
                next_expected: self.next_expected,
            });
        }

        self.pending.insert(seq, payload);
        Ok(Released { buffer: self })
    }

    /// The next sequence number that will be released
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Number of payloads held back waiting for a predecessor
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Payloads released by one [`Sequencer::submit`] call, in sequence order
#[derive(Debug)]
pub struct Released<'a, T> {
    buffer: &'a mut Sequencer<T>,
}

impl<T> Iterator for Released<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let payload = self.buffer.pending.remove(&self.buffer.next_expected)?;
        self.buffer.next_expected += 1;
        Some(payload)
    }
}
