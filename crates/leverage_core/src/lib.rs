#![forbid(unsafe_code)]

pub mod amplify;
pub mod auth;
pub mod error;
pub mod orchestrator;
pub mod record;
pub mod risk;
pub mod routing;

pub use error::{CollaboratorError, EntryPoint, ErrorCode, OrchestratorError, PipelineStage};
pub use orchestrator::{
    CycleOutcome, LeverageOrchestrator, OrchestratorBuilder, OrchestratorConfig,
    OrchestratorSnapshot, RestoredState,
};
