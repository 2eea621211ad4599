//! Status report for a running orchestrator.
//!
//! `ok` is false once the orchestrator is halted: a halted process is up but
//! will refuse every leverage cycle, which supervisors should treat as
//! unhealthy.

use crate::bootstrap::{BootstrapError, Restored};
use leverage_core::orchestrator::orchestrator_reject_totals;
use leverage_core::{LeverageOrchestrator, OrchestratorSnapshot};
use serde::Serialize;
use std::collections::BTreeMap;

/// Status of one orchestrator process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// True while the orchestrator accepts leverage cycles.
    pub ok: bool,
    /// Git commit SHA or build identifier.
    pub build_id: String,
    /// Whether an emergency exit has committed.
    pub halted: bool,
    /// Last committed risk ratio, in basis points.
    pub risk_ratio_bps: u16,
    /// Amount of the last committed cycle.
    pub last_leveraged_amount: u128,
    /// Sequence of the last committed record.
    pub records_committed: u64,
    /// Process-wide rejections keyed by error code token.
    pub reject_totals: BTreeMap<&'static str, u64>,
}

impl StatusReport {
    /// Report for `snapshot`, without reject totals.
    pub fn from_snapshot(build_id: impl Into<String>, snapshot: &OrchestratorSnapshot) -> Self {
        Self {
            ok: !snapshot.halted,
            build_id: build_id.into(),
            halted: snapshot.halted,
            risk_ratio_bps: snapshot.risk_ratio.bps(),
            last_leveraged_amount: snapshot.last_leveraged_amount,
            records_committed: snapshot.records_committed,
            reject_totals: BTreeMap::new(),
        }
    }
}

/// Current status of `orchestrator`, including process-wide reject totals.
pub fn check_status(build_id: &str, orchestrator: &LeverageOrchestrator) -> StatusReport {
    let mut report = StatusReport::from_snapshot(build_id, &orchestrator.snapshot());
    report.reject_totals = orchestrator_reject_totals()
        .into_iter()
        .map(|(code, total)| (code.as_str(), total))
        .collect();
    report
}

/// Exit code for a healthy orchestrator.
pub const EXIT_HEALTHY: i32 = 0;
/// Exit code for a halted orchestrator.
pub const EXIT_UNHEALTHY: i32 = 1;
/// Status could not be determined (e.g. the journal failed to open).
pub const EXIT_ERROR: i32 = 2;

/// Exit code for a status report.
pub fn exit_code(report: &StatusReport) -> i32 {
    if report.ok {
        EXIT_HEALTHY
    } else {
        EXIT_UNHEALTHY
    }
}

/// Exit code for a startup attempt: the status of the restored
/// orchestrator, or `EXIT_ERROR` when it could not be restored.
pub fn startup_exit_code(build_id: &str, startup: &Result<Restored, BootstrapError>) -> i32 {
    match startup {
        Ok(restored) => exit_code(&check_status(build_id, &restored.orchestrator)),
        Err(err) => {
            tracing::warn!("status undetermined build_id={} err={}", build_id, err);
            EXIT_ERROR
        }
    }
}
