//! Startup wiring: open the journal, replay it and build an orchestrator
//! that continues from the replayed state.

use crate::config::ResolvedSettings;
use crate::store::{JournalTransitionSink, ReplayOutcome, TransitionJournal};
use leverage_core::amplify::LoanAmplifier;
use leverage_core::auth::AuthorizationGate;
use leverage_core::risk::RiskModel;
use leverage_core::{LeverageOrchestrator, OrchestratorError};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum BootstrapError {
    /// The journal could not be opened or replayed.
    Journal { reason: String },
    Orchestrator(OrchestratorError),
}

impl fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Journal { reason } => write!(f, "journal unavailable: {reason}"),
            Self::Orchestrator(err) => write!(f, "orchestrator restore failed: {err}"),
        }
    }
}

impl std::error::Error for BootstrapError {}

/// A restored orchestrator and the journal it writes to.
pub struct Restored {
    /// Continues from the replayed state; halted if the journal ends in a halt.
    pub orchestrator: LeverageOrchestrator,
    /// Shared with the orchestrator's sink.
    pub journal: Arc<Mutex<TransitionJournal>>,
    /// What the journal held at startup.
    pub replay: ReplayOutcome,
}

/// Open `journal_path`, replay it and wire the orchestrator to keep
/// appending to it.
///
/// A journal that ends in a halt produces an orchestrator that is already
/// halted.
pub fn restore_orchestrator(
    settings: &ResolvedSettings,
    journal_path: impl AsRef<Path>,
    amplifier: impl LoanAmplifier + 'static,
    risk_model: impl RiskModel + 'static,
    gate: impl AuthorizationGate + 'static,
) -> Result<Restored, BootstrapError> {
    let journal_path = journal_path.as_ref();
    let journal = TransitionJournal::with_storage_path(settings.journal_capacity, journal_path)
        .map_err(|e| BootstrapError::Journal {
            reason: e.to_string(),
        })?
        .with_fsync(settings.require_journal_fsync);
    let replay = journal.replay();
    let restored = journal.restored_state();
    tracing::info!(
        "journal replayed path={} records={} halted={}",
        journal_path.display(),
        replay.records_replayed,
        replay.halted
    );

    let journal = Arc::new(Mutex::new(journal));
    let orchestrator = LeverageOrchestrator::builder(amplifier, risk_model, gate)
        .config(settings.orchestrator)
        .sink(JournalTransitionSink::new(Arc::clone(&journal)))
        .restore(restored)
        .build()
        .map_err(BootstrapError::Orchestrator)?;

    Ok(Restored {
        orchestrator,
        journal,
        replay,
    })
}
