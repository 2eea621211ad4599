//! Orchestrator counters.
//!
//! Per-instance counters live on [`OrchestratorMetrics`] (shared-reference
//! atomics, since the orchestrator is used through `&self`). Process-wide
//! reject totals keyed by [`ErrorCode`] back the `orchestrator_reject_total`
//! metric line.

use crate::error::{EntryPoint, ErrorCode, OrchestratorError, error_code_registry};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one orchestrator instance.
#[derive(Debug)]
pub struct OrchestratorMetrics {
    cycles_committed_total: AtomicU64,
    cycles_rejected_total: AtomicU64,
    halts_total: AtomicU64,
    unwinds_total: AtomicU64,
    reentrancy_rejects_total: AtomicU64,
}

impl OrchestratorMetrics {
    pub fn new() -> Self {
        Self {
            cycles_committed_total: AtomicU64::new(0),
            cycles_rejected_total: AtomicU64::new(0),
            halts_total: AtomicU64::new(0),
            unwinds_total: AtomicU64::new(0),
            reentrancy_rejects_total: AtomicU64::new(0),
        }
    }

    /// A leverage cycle committed.
    pub fn record_cycle_committed(&self) {
        self.cycles_committed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// An emergency exit committed.
    pub fn record_halt(&self) {
        self.halts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// A staged amplification was reverted.
    pub fn record_unwind(&self) {
        self.unwinds_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a rejected call and bump the process-wide total for its code.
    pub fn record_reject(&self, entry_point: EntryPoint, err: &OrchestratorError) {
        if entry_point == EntryPoint::ExecuteLeverage {
            self.cycles_rejected_total.fetch_add(1, Ordering::Relaxed);
        }
        if matches!(err, OrchestratorError::Reentrancy { .. }) {
            self.reentrancy_rejects_total.fetch_add(1, Ordering::Relaxed);
        }
        bump_orchestrator_reject(entry_point, err);
    }

    /// Committed `execute_leverage` calls.
    pub fn cycles_committed_total(&self) -> u64 {
        self.cycles_committed_total.load(Ordering::Relaxed)
    }

    /// Rejected `execute_leverage` calls, all reasons.
    pub fn cycles_rejected_total(&self) -> u64 {
        self.cycles_rejected_total.load(Ordering::Relaxed)
    }

    /// Successful `emergency_exit` calls, repeats included.
    pub fn halts_total(&self) -> u64 {
        self.halts_total.load(Ordering::Relaxed)
    }

    /// Provisional amplifications reverted after a later failure.
    pub fn unwinds_total(&self) -> u64 {
        self.unwinds_total.load(Ordering::Relaxed)
    }

    /// Calls refused because they were nested inside a running call.
    pub fn reentrancy_rejects_total(&self) -> u64 {
        self.reentrancy_rejects_total.load(Ordering::Relaxed)
    }
}

impl Default for OrchestratorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static REJECT_INVALID_AMOUNT_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_HALTED_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_UNAUTHORIZED_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_COLLABORATOR_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_REENTRANCY_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_JOURNAL_TOTAL: AtomicU64 = AtomicU64::new(0);
static REJECT_POISONED_TOTAL: AtomicU64 = AtomicU64::new(0);

fn reject_counter(code: ErrorCode) -> &'static AtomicU64 {
    match code {
        ErrorCode::InvalidAmount => &REJECT_INVALID_AMOUNT_TOTAL,
        ErrorCode::Halted => &REJECT_HALTED_TOTAL,
        ErrorCode::Unauthorized => &REJECT_UNAUTHORIZED_TOTAL,
        ErrorCode::CollaboratorFailure => &REJECT_COLLABORATOR_TOTAL,
        ErrorCode::Reentrancy => &REJECT_REENTRANCY_TOTAL,
        ErrorCode::JournalFailure => &REJECT_JOURNAL_TOTAL,
        ErrorCode::StatePoisoned => &REJECT_POISONED_TOTAL,
    }
}

/// Process-wide rejections for `code`, across all orchestrator instances.
pub fn orchestrator_reject_total(code: ErrorCode) -> u64 {
    reject_counter(code).load(Ordering::Relaxed)
}

/// Process-wide rejections for every code, in registry order.
pub fn orchestrator_reject_totals() -> Vec<(ErrorCode, u64)> {
    error_code_registry()
        .iter()
        .map(|code| (*code, orchestrator_reject_total(*code)))
        .collect()
}

fn bump_orchestrator_reject(entry_point: EntryPoint, err: &OrchestratorError) {
    let code = err.code();
    reject_counter(code).fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        "orchestrator_reject_total entry_point={} code={} err={}",
        entry_point,
        code.as_str(),
        err
    );
}
