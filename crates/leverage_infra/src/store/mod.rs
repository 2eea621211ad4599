//! Durable storage: transition journal.

pub mod journal;

pub use journal::{
    JournalAppendError, JournalMetrics, JournalTransitionSink, ReplayOutcome, TransitionJournal,
};
