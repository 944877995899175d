//! Inbound admission by sequence number
//!
//! An event is admitted only if its sequence is strictly greater than the
//! highest sequence admitted so far. That one comparison rejects duplicates,
//! stale retransmissions and unsequenced events (`sequence == 0`), since the
//! tracked value starts at zero and never decreases.

/// Tracks the highest admitted sequence number
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sequencer {
    last: i64,
}

impl Sequencer {
    /// Create a sequencer that has admitted nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `sequence` if it is newer than anything seen, recording it
    pub fn admit(&mut self, sequence: i64) -> bool {
        if sequence > self.last {
            self.last = sequence;
            true
        } else {
            false
        }
    }

    /// Highest admitted sequence, zero before the first admission
    pub fn last(&self) -> i64 {
        self.last
    }
}
