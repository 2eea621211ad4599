//! Transition records: one immutable entry per committed state change.

use crate::auth::CallerId;
use crate::risk::RiskRatio;
use crate::routing::DestinationId;
use serde::{Deserialize, Serialize};

/// Payload of a committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionEvent {
    RiskRatioUpdated {
        previous: RiskRatio,
        ratio: RiskRatio,
    },
    YieldRouted {
        destination: DestinationId,
        amount: u128,
    },
    LeverageExecuted {
        amount: u128,
    },
    HaltTriggered {
        caller: CallerId,
    },
}

impl TransitionEvent {
    pub fn kind(&self) -> TransitionKind {
        match self {
            TransitionEvent::RiskRatioUpdated { .. } => TransitionKind::RiskRatioUpdated,
            TransitionEvent::YieldRouted { .. } => TransitionKind::YieldRouted,
            TransitionEvent::LeverageExecuted { .. } => TransitionKind::LeverageExecuted,
            TransitionEvent::HaltTriggered { .. } => TransitionKind::HaltTriggered,
        }
    }

    /// Whether this event is the last record of its invocation's batch.
    ///
    /// A leverage cycle always ends with `LeverageExecuted` and a halt batch
    /// is a single `HaltTriggered`, so a persisted history whose tail does
    /// not end in one of these holds a partially written batch.
    pub fn closes_batch(&self) -> bool {
        matches!(
            self,
            TransitionEvent::LeverageExecuted { .. } | TransitionEvent::HaltTriggered { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    RiskRatioUpdated,
    YieldRouted,
    LeverageExecuted,
    HaltTriggered,
}

impl TransitionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionKind::RiskRatioUpdated => "risk_ratio_updated",
            TransitionKind::YieldRouted => "yield_routed",
            TransitionKind::LeverageExecuted => "leverage_executed",
            TransitionKind::HaltTriggered => "halt_triggered",
        }
    }
}

/// Audit log entry.
///
/// `sequence` is 1-based and gap-free across the whole log; `cycle_id`
/// groups the records of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub sequence: u64,
    pub cycle_id: u64,
    pub event: TransitionEvent,
}

impl TransitionRecord {
    pub fn kind(&self) -> TransitionKind {
        self.event.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = TransitionRecord {
            sequence: 3,
            cycle_id: 42,
            event: TransitionEvent::LeverageExecuted { amount: 1_000_000 },
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"sequence":3,"cycle_id":42,"event":{"leverage_executed":{"amount":1000000}}}"#
        );
        let back: TransitionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_halt_record_carries_caller() {
        let event = TransitionEvent::HaltTriggered {
            caller: CallerId::from("guardian"),
        };
        assert_eq!(event.kind(), TransitionKind::HaltTriggered);
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"halt_triggered":{"caller":"guardian"}}"#);
    }

    #[test]
    fn test_only_executed_and_halt_close_a_batch() {
        assert!(TransitionEvent::LeverageExecuted { amount: 1 }.closes_batch());
        assert!(
            TransitionEvent::HaltTriggered {
                caller: CallerId::from("guardian")
            }
            .closes_batch()
        );
        assert!(
            !TransitionEvent::RiskRatioUpdated {
                previous: RiskRatio::ZERO,
                ratio: RiskRatio::ZERO,
            }
            .closes_batch()
        );
        assert!(
            !TransitionEvent::YieldRouted {
                destination: DestinationId::derive(b"vault"),
                amount: 1,
            }
            .closes_batch()
        );
    }

    #[test]
    fn test_amounts_beyond_u64_survive_json() {
        let event = TransitionEvent::YieldRouted {
            destination: DestinationId::derive(b"vault"),
            amount: u128::from(u64::MAX) + 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(serde_json::from_str::<TransitionEvent>(&json).unwrap(), event);
    }
}
