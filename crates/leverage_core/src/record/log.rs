//! In-memory append-only transition log and the durable sink contract.

use super::transition::{TransitionEvent, TransitionRecord};

/// Durable medium for transition records.
///
/// `append_batch` receives all records of one invocation at once. The
/// orchestrator calls it before finalizing any collaborator effect, so an
/// `Err` aborts the invocation with nothing committed.
pub trait TransitionSink: Send {
    fn append_batch(&mut self, batch: &[TransitionRecord]) -> Result<(), String>;
}

/// Records of one invocation under construction.
#[derive(Debug)]
pub struct TransitionBatch {
    cycle_id: u64,
    next_sequence: u64,
    records: Vec<TransitionRecord>,
}

impl TransitionBatch {
    pub fn new(cycle_id: u64, first_sequence: u64) -> Self {
        Self {
            cycle_id,
            next_sequence: first_sequence,
            records: Vec::with_capacity(3),
        }
    }

    pub fn push(&mut self, event: TransitionEvent) {
        self.records.push(TransitionRecord {
            sequence: self.next_sequence,
            cycle_id: self.cycle_id,
            event,
        });
        self.next_sequence += 1;
    }

    pub fn into_records(self) -> Vec<TransitionRecord> {
        self.records
    }
}

/// Committed records, ordered by sequence. Never rewritten.
#[derive(Debug, Clone)]
pub struct TransitionLog {
    records: Vec<TransitionRecord>,
    next_sequence: u64,
}

impl TransitionLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            next_sequence: 1,
        }
    }

    /// Rebuild from previously committed records (e.g. a replayed journal).
    ///
    /// Returns `Err` unless sequences start at 1 and have no gaps.
    pub fn from_records(records: Vec<TransitionRecord>) -> Result<Self, String> {
        for (index, record) in records.iter().enumerate() {
            let expected = index as u64 + 1;
            if record.sequence != expected {
                return Err(format!(
                    "record sequence gap: expected {expected}, found {}",
                    record.sequence
                ));
            }
        }
        let next_sequence = records.len() as u64 + 1;
        Ok(Self {
            records,
            next_sequence,
        })
    }

    /// Sequence number the next committed record will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Append a batch built from `next_sequence()`.
    ///
    /// Returns `Err` without appending anything if the batch does not
    /// continue the log contiguously.
    pub fn commit(&mut self, batch: Vec<TransitionRecord>) -> Result<(), String> {
        for (offset, record) in batch.iter().enumerate() {
            let expected = self.next_sequence + offset as u64;
            if record.sequence != expected {
                return Err(format!(
                    "batch sequence mismatch: expected {expected}, found {}",
                    record.sequence
                ));
            }
        }
        self.next_sequence += batch.len() as u64;
        self.records.extend(batch);
        Ok(())
    }

    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    /// Records with `sequence > after`.
    pub fn since(&self, after: u64) -> &[TransitionRecord] {
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence of the last committed record, 0 if empty.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }
}

impl Default for TransitionLog {
    fn default() -> Self {
        Self::new()
    }
}
