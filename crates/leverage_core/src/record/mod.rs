//! Append-only transition records (audit log).

pub mod cycle_id;
pub mod log;
pub mod transition;

pub use cycle_id::{CycleIdInput, compute_cycle_id, format_cycle_id};
pub use log::{TransitionBatch, TransitionLog, TransitionSink};
pub use transition::{TransitionEvent, TransitionKind, TransitionRecord};
