//! Leverage orchestrator: the atomic amplify -> ratio -> route -> commit cycle
//! and the authority-gated emergency halt.

pub mod config;
pub mod engine;
pub mod guard;
pub mod metrics;

pub use config::{DEFAULT_YIELD_BPS, OrchestratorConfig};
pub use engine::{
    CycleOutcome, LeverageOrchestrator, OrchestratorBuilder, OrchestratorSnapshot, RestoredState,
};
pub use guard::{EnterError, InProgressGuard};
pub use metrics::{OrchestratorMetrics, orchestrator_reject_total, orchestrator_reject_totals};
