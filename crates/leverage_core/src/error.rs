//! Error taxonomy for the orchestrator and its collaborators.
//!
//! Every `OrchestratorError` maps to a stable [`ErrorCode`] token used in log
//! lines and reject counters.

use crate::amplify::AmplifyError;
use crate::auth::CallerId;
use std::fmt;

// --- Pipeline stages ----------------------------------------------------

/// Named steps of a leverage cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Amplify,
    RiskRatio,
    YieldRoute,
    Journal,
    Commit,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Amplify => "amplify",
            PipelineStage::RiskRatio => "risk_ratio",
            PipelineStage::YieldRoute => "yield_route",
            PipelineStage::Journal => "journal",
            PipelineStage::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Public entry points guarded against re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    ExecuteLeverage,
    EmergencyExit,
}

impl EntryPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryPoint::ExecuteLeverage => "execute_leverage",
            EntryPoint::EmergencyExit => "emergency_exit",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Collaborator failures ----------------------------------------------

/// Failure reported by a pipeline collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("amplification failed: {0}")]
    Amplify(#[from] AmplifyError),
    /// The amplifier's receipt does not cover the amount it was asked for.
    #[error("amplify receipt covers {receipted}, requested {requested}")]
    ReceiptMismatch { requested: u128, receipted: u128 },
    #[error("market data rejected: {reason}")]
    MarketData { reason: String },
    #[error("yield routing rejected: {reason}")]
    Routing { reason: String },
}

// --- Orchestrator errors ------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestratorError {
    /// Malformed input; only a zero amount is representable.
    #[error("invalid amount")]
    InvalidAmount,
    #[error("halted")]
    Halted,
    #[error("unauthorized: {caller}")]
    Unauthorized { caller: CallerId },
    #[error("collaborator failure at {stage}: {source}")]
    Collaborator {
        stage: PipelineStage,
        source: CollaboratorError,
    },
    #[error("reentrant call into {entry_point}")]
    Reentrancy { entry_point: EntryPoint },
    #[error("transition journal rejected batch: {reason}")]
    Journal { reason: String },
    /// A collaborator panicked while the pipeline state was held.
    #[error("orchestrator state poisoned")]
    Poisoned,
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::InvalidAmount => ErrorCode::InvalidAmount,
            OrchestratorError::Halted => ErrorCode::Halted,
            OrchestratorError::Unauthorized { .. } => ErrorCode::Unauthorized,
            OrchestratorError::Collaborator { .. } => ErrorCode::CollaboratorFailure,
            OrchestratorError::Reentrancy { .. } => ErrorCode::Reentrancy,
            OrchestratorError::Journal { .. } => ErrorCode::JournalFailure,
            OrchestratorError::Poisoned => ErrorCode::StatePoisoned,
        }
    }
}

/// Stable token for an orchestrator rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidAmount,
    Halted,
    Unauthorized,
    CollaboratorFailure,
    Reentrancy,
    JournalFailure,
    StatePoisoned,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidAmount => "InvalidAmount",
            ErrorCode::Halted => "Halted",
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::CollaboratorFailure => "CollaboratorFailure",
            ErrorCode::Reentrancy => "Reentrancy",
            ErrorCode::JournalFailure => "JournalFailure",
            ErrorCode::StatePoisoned => "StatePoisoned",
        }
    }
}

const REGISTRY: &[ErrorCode] = &[
    ErrorCode::InvalidAmount,
    ErrorCode::Halted,
    ErrorCode::Unauthorized,
    ErrorCode::CollaboratorFailure,
    ErrorCode::Reentrancy,
    ErrorCode::JournalFailure,
    ErrorCode::StatePoisoned,
];

/// Every [`ErrorCode`], in declaration order.
pub fn error_code_registry() -> &'static [ErrorCode] {
    REGISTRY
}
