//! Durable transition journal.
//!
//! Every committed orchestrator record is appended as one JSON line. On
//! startup, replay folds the lines back into the committed state (halt flag,
//! risk ratio, last leveraged amount) so a restarted orchestrator continues
//! exactly where the previous process stopped.
//!
//! Batches are validated before anything is written: a batch must continue
//! the journal's sequence without gaps and fit within `capacity`. A rejected
//! batch leaves the file untouched, and a batch whose write fails part way is
//! truncated back off the file.
//!
//! If the process dies mid-write, the file can end in a torn tail: a line
//! without its newline, or records of a batch whose closing record never
//! made it. That batch never committed, so opening the journal drops the
//! tail and truncates the file to the last complete batch. Damage anywhere
//! else still fails the open.

use leverage_core::auth::CallerId;
use leverage_core::orchestrator::RestoredState;
use leverage_core::record::{TransitionEvent, TransitionRecord, TransitionSink};
use leverage_core::risk::RiskRatio;
use std::fs::OpenOptions;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// --- Append error -------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalAppendError {
    /// The batch would take the journal past its record capacity.
    CapacityExceeded { capacity: usize },
    /// The batch does not continue the journal contiguously.
    SequenceMismatch { expected: u64, found: u64 },
    WriteFailed { reason: String },
}

impl std::fmt::Display for JournalAppendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded { capacity } => {
                write!(f, "journal capacity {capacity} exceeded")
            }
            Self::SequenceMismatch { expected, found } => {
                write!(f, "journal sequence mismatch: expected {expected}, found {found}")
            }
            Self::WriteFailed { reason } => write!(f, "journal write failed: {reason}"),
        }
    }
}

impl std::error::Error for JournalAppendError {}

// --- Replay outcome -----------------------------------------------------

/// Committed state recovered from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    /// Records folded, including any halt.
    pub records_replayed: usize,
    /// 0 for an empty journal.
    pub last_sequence: u64,
    /// Whether a halt record was replayed.
    pub halted: bool,
    /// Caller of the replayed halt.
    pub halted_by: Option<CallerId>,
    /// Ratio of the last `RiskRatioUpdated` record.
    pub risk_ratio: RiskRatio,
    /// Amount of the last `LeverageExecuted` record.
    pub last_leveraged_amount: u128,
    /// Sum of all routed yield, across destinations.
    pub yield_routed_total: u128,
}

// --- Metrics ------------------------------------------------------------

#[derive(Debug)]
pub struct JournalMetrics {
    batches_appended: u64,
    records_appended: u64,
    write_errors: u64,
    rejected_batches: u64,
    fsyncs: u64,
}

impl JournalMetrics {
    pub fn new() -> Self {
        Self {
            batches_appended: 0,
            records_appended: 0,
            write_errors: 0,
            rejected_batches: 0,
            fsyncs: 0,
        }
    }

    pub fn record_append(&mut self, records: usize) {
        self.batches_appended += 1;
        self.records_appended += records as u64;
    }

    pub fn record_write_error(&mut self) {
        self.write_errors += 1;
    }

    /// Batch refused by validation (capacity or sequence).
    pub fn record_rejected_batch(&mut self) {
        self.rejected_batches += 1;
    }

    pub fn record_fsync(&mut self) {
        self.fsyncs += 1;
    }

    /// Batches persisted since open.
    pub fn batches_appended(&self) -> u64 {
        self.batches_appended
    }

    /// Records persisted since open.
    pub fn records_appended(&self) -> u64 {
        self.records_appended
    }

    /// Batches lost to write, flush or fsync errors.
    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    /// Batches refused before any write.
    pub fn rejected_batches(&self) -> u64 {
        self.rejected_batches
    }

    /// Successful `sync_data` calls.
    pub fn fsyncs(&self) -> u64 {
        self.fsyncs
    }
}

impl Default for JournalMetrics {
    fn default() -> Self {
        Self::new()
    }
}

// --- Journal ------------------------------------------------------------

#[derive(Debug)]
pub struct TransitionJournal {
    records: Vec<TransitionRecord>,
    capacity: usize,
    storage_path: Option<PathBuf>,
    require_fsync: bool,
    metrics: JournalMetrics,
}

impl TransitionJournal {
    /// In-memory journal (no file), mostly for tests.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
            storage_path: None,
            require_fsync: false,
            metrics: JournalMetrics::new(),
        }
    }

    /// Open or create a JSONL journal, loading any existing records.
    ///
    /// A torn tail is dropped and truncated off the file. Fails with
    /// `InvalidData` on an undecodable complete line or a sequence gap, and
    /// with `InvalidInput` if the file already holds more than `capacity`
    /// records.
    pub fn with_storage_path(capacity: usize, storage_path: impl AsRef<Path>) -> io::Result<Self> {
        let path = storage_path.as_ref().to_path_buf();
        let records = read_records_from_path(&path)?;
        if let Some((expected, found)) = first_gap(&records, 1) {
            let reason = format!(
                "journal {} has a sequence gap: expected {expected}, found {found}",
                path.display()
            );
            return Err(io::Error::new(io::ErrorKind::InvalidData, reason));
        }
        if records.len() > capacity {
            let reason = format!(
                "journal contains {} records but capacity is {}",
                records.len(),
                capacity
            );
            return Err(io::Error::new(io::ErrorKind::InvalidInput, reason));
        }
        tracing::debug!(
            "journal opened path={} records={}",
            path.display(),
            records.len()
        );

        Ok(Self {
            records,
            capacity,
            storage_path: Some(path),
            require_fsync: false,
            metrics: JournalMetrics::new(),
        })
    }

    /// Flush every batch to stable storage before reporting success.
    pub fn with_fsync(mut self, require_fsync: bool) -> Self {
        self.require_fsync = require_fsync;
        self
    }

    /// Backing file, if any.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    /// Every committed record, oldest first.
    pub fn records(&self) -> &[TransitionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most records the journal will ever hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sequence of the newest record, 0 when empty.
    pub fn last_sequence(&self) -> u64 {
        self.records.last().map(|r| r.sequence).unwrap_or(0)
    }

    pub fn metrics(&self) -> &JournalMetrics {
        &self.metrics
    }

    /// Append one invocation's records, all or nothing.
    pub fn append_batch(&mut self, batch: &[TransitionRecord]) -> Result<(), JournalAppendError> {
        if self.records.len().saturating_add(batch.len()) > self.capacity {
            self.metrics.record_rejected_batch();
            return Err(JournalAppendError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if let Some((expected, found)) = first_gap(batch, self.last_sequence() + 1) {
            self.metrics.record_rejected_batch();
            return Err(JournalAppendError::SequenceMismatch { expected, found });
        }

        if let Some(path) = &self.storage_path {
            let synced = write_batch_to_path(path, batch, self.require_fsync).map_err(|reason| {
                self.metrics.record_write_error();
                tracing::warn!("journal write failed path={}: {}", path.display(), reason);
                JournalAppendError::WriteFailed { reason }
            })?;
            if synced {
                self.metrics.record_fsync();
            }
        }

        self.records.extend_from_slice(batch);
        self.metrics.record_append(batch.len());
        Ok(())
    }

    /// Fold the journal into the committed state it describes.
    pub fn replay(&self) -> ReplayOutcome {
        let yield_routed_total = self
            .records
            .iter()
            .filter_map(|record| match &record.event {
                TransitionEvent::YieldRouted { amount, .. } => Some(*amount),
                _ => None,
            })
            .fold(0u128, u128::saturating_add);
        let restored = self.restored_state();

        ReplayOutcome {
            records_replayed: self.records.len(),
            last_sequence: self.last_sequence(),
            halted: restored.halted,
            halted_by: restored.halted_by,
            risk_ratio: restored.risk_ratio,
            last_leveraged_amount: restored.last_leveraged_amount,
            yield_routed_total,
        }
    }

    /// Replayed state plus the full history, ready for the orchestrator builder.
    pub fn restored_state(&self) -> RestoredState {
        RestoredState::from_records(self.records.clone())
    }
}

/// First `(expected, found)` pair where `records` stops counting up from `start`.
fn first_gap(records: &[TransitionRecord], start: u64) -> Option<(u64, u64)> {
    records
        .iter()
        .enumerate()
        .map(|(offset, record)| (start + offset as u64, record.sequence))
        .find(|(expected, found)| expected != found)
}

/// Adapter that lets the core orchestrator write its record batches into a
/// shared journal.
pub struct JournalTransitionSink {
    journal: Arc<Mutex<TransitionJournal>>,
}

impl JournalTransitionSink {
    pub fn new(journal: Arc<Mutex<TransitionJournal>>) -> Self {
        Self { journal }
    }
}

impl TransitionSink for JournalTransitionSink {
    fn append_batch(&mut self, batch: &[TransitionRecord]) -> Result<(), String> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| "journal lock poisoned".to_string())?;
        journal.append_batch(batch).map_err(|err| err.to_string())
    }
}

/// Returns whether an fsync was issued.
///
/// On any write, flush or fsync error the file is cut back to its length
/// before the batch.
fn write_batch_to_path(
    path: &Path,
    batch: &[TransitionRecord],
    require_fsync: bool,
) -> Result<bool, String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            format!(
                "failed to create journal parent directory {}: {e}",
                parent.display()
            )
        })?;
    }

    let mut buf = String::new();
    for record in batch {
        let line = serde_json::to_string(record)
            .map_err(|e| format!("failed to encode journal record: {e}"))?;
        buf.push_str(&line);
        buf.push('\n');
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("failed to open journal {}: {e}", path.display()))?;
    let committed_len = file
        .metadata()
        .map_err(|e| format!("failed to stat journal {}: {e}", path.display()))?
        .len();

    match append_lines(&mut file, buf.as_bytes(), require_fsync) {
        Ok(()) => Ok(require_fsync),
        Err(e) => {
            let reason = format!("failed to write journal batch {}: {e}", path.display());
            match file.set_len(committed_len) {
                Ok(()) => Err(reason),
                Err(rollback) => Err(format!(
                    "{reason}; truncating back to {committed_len} bytes failed: {rollback}"
                )),
            }
        }
    }
}

fn append_lines(file: &mut File, bytes: &[u8], require_fsync: bool) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()?;
    if require_fsync {
        file.sync_data()?;
    }
    Ok(())
}

fn read_records_from_path(path: &Path) -> io::Result<Vec<TransitionRecord>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;

    let mut records = Vec::new();
    // Bytes and records up to the end of the last complete batch.
    let mut complete_len = 0usize;
    let mut complete_records = 0usize;
    let mut offset = 0usize;
    for (index, line) in contents.split_inclusive(|b| *b == b'\n').enumerate() {
        offset += line.len();
        if !line.ends_with(b"\n") {
            // Torn final line.
            break;
        }
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            if complete_records == records.len() {
                complete_len = offset;
            }
            continue;
        }
        let record: TransitionRecord = serde_json::from_slice(trimmed).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "invalid journal record at line {} in {}: {e}",
                    index + 1,
                    path.display()
                ),
            )
        })?;
        let closes_batch = record.event.closes_batch();
        records.push(record);
        if closes_batch {
            complete_len = offset;
            complete_records = records.len();
        }
    }

    if complete_len < contents.len() {
        tracing::warn!(
            "journal torn tail dropped path={} bytes={} records={}",
            path.display(),
            contents.len() - complete_len,
            records.len() - complete_records
        );
        records.truncate(complete_records);
        file.set_len(complete_len as u64)?;
    }

    Ok(records)
}
