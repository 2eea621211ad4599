//! A failed cycle leaves committed state, records and the durable sink
//! exactly as they were, and reverts the provisional amplification.

use leverage_core::record::TransitionRecord;
use leverage_core::risk::CollateralDebtModel;
use leverage_core::{
    CollaboratorError, ErrorCode, LeverageOrchestrator, OrchestratorError, OrchestratorSnapshot,
    PipelineStage,
};
use std::sync::{Arc, Mutex};

mod common;

use common::{AmplifierCalls, FixedModel, InflatingAmplifier, MemorySink, TrackingAmplifier};

struct Harness {
    orch: LeverageOrchestrator,
    calls: Arc<Mutex<AmplifierCalls>>,
    sink: MemorySink,
}

fn harness() -> Harness {
    let (amplifier, calls) = TrackingAmplifier::tracked();
    let sink = MemorySink::default();
    let orch = LeverageOrchestrator::builder(amplifier, CollateralDebtModel, common::registry())
        .sink(sink.clone())
        .build()
        .unwrap();
    Harness { orch, calls, sink }
}

fn market(collateral: u128, debt: u128) -> Vec<u8> {
    CollateralDebtModel::encode(collateral, debt)
}

/// Committed state visible to readers.
fn observed(h: &Harness) -> (OrchestratorSnapshot, Vec<TransitionRecord>, Vec<TransitionRecord>) {
    (h.orch.snapshot(), h.orch.records(), h.sink.stored())
}

fn seeded() -> Harness {
    let h = harness();
    h.orch
        .execute_leverage(1_000_000, &market(10_000, 5_000), b"vault-a")
        .unwrap();
    h
}

#[test]
fn test_receipt_for_other_amount_is_unwound() {
    let amplifier = InflatingAmplifier::by(2);
    let unwound = Arc::clone(&amplifier.unwound);
    let sink = MemorySink::default();
    let orch = LeverageOrchestrator::builder(amplifier, CollateralDebtModel, common::registry())
        .sink(sink.clone())
        .build()
        .unwrap();

    let err = orch
        .execute_leverage(1_000_000, &market(10_000, 5_000), b"vault-a")
        .unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Collaborator {
            stage: PipelineStage::Amplify,
            source: CollaboratorError::ReceiptMismatch {
                requested: 1_000_000,
                receipted: 2_000_000,
            },
        }
    );
    assert_eq!(unwound.lock().unwrap().len(), 1);
    assert_eq!(orch.last_leveraged_amount(), 0);
    assert!(orch.records().is_empty());
    assert!(sink.stored().is_empty());
    assert_eq!(orch.metrics().unwinds_total(), 1);
}

#[test]
fn test_amplify_failure_commits_nothing() {
    let (amplifier, calls) = TrackingAmplifier::failing();
    let sink = MemorySink::default();
    let orch = LeverageOrchestrator::builder(amplifier, CollateralDebtModel, common::registry())
        .sink(sink.clone())
        .build()
        .unwrap();

    let err = orch
        .execute_leverage(1_000, &market(10_000, 5_000), b"vault-a")
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Collaborator {
            stage: PipelineStage::Amplify,
            source: CollaboratorError::Amplify(_),
        }
    ));
    assert!(orch.records().is_empty());
    assert!(sink.stored().is_empty());
    assert_eq!(orch.snapshot(), OrchestratorSnapshot::default());
    let calls = calls.lock().unwrap();
    assert_eq!(calls.amplified, vec![1_000]);
    assert!(calls.unwound.is_empty());
    assert!(calls.settled.is_empty());
}

#[test]
fn test_risk_stage_failure_unwinds_and_preserves_state() {
    let h = seeded();
    let before = observed(&h);

    let err = h
        .orch
        .execute_leverage(2_000_000, b"truncated", b"vault-a")
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Collaborator {
            stage: PipelineStage::RiskRatio,
            source: CollaboratorError::MarketData { .. },
        }
    ));
    assert_eq!(observed(&h), before);
    let calls = h.calls.lock().unwrap();
    assert_eq!(calls.settled.len(), 1);
    assert_eq!(calls.unwound.len(), 1);
    assert_eq!(h.orch.metrics().unwinds_total(), 1);
}

#[test]
fn test_routing_stage_failure_unwinds_and_preserves_state() {
    let h = seeded();
    let before = observed(&h);

    let err = h
        .orch
        .execute_leverage(2_000_000, &market(10_000, 9_000), b"")
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Collaborator {
            stage: PipelineStage::YieldRoute,
            source: CollaboratorError::Routing { .. },
        }
    ));
    assert_eq!(observed(&h), before);
    // The ratio computed by the failed cycle was never published.
    assert_eq!(h.orch.risk_ratio().bps(), 5_000);
    assert_eq!(h.calls.lock().unwrap().unwound.len(), 1);
}

#[test]
fn test_journal_failure_unwinds_and_preserves_state() {
    let h = seeded();
    let before = observed(&h);
    h.sink.set_reject(true);

    let err = h
        .orch
        .execute_leverage(2_000_000, &market(10_000, 9_000), b"vault-a")
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::JournalFailure);
    assert_eq!(observed(&h), before);
    assert_eq!(h.calls.lock().unwrap().unwound.len(), 1);
}

#[test]
fn test_cycle_after_failure_continues_sequence_without_gap() {
    let h = seeded();
    h.sink.set_reject(true);
    assert!(
        h.orch
            .execute_leverage(2_000_000, &market(10_000, 9_000), b"vault-a")
            .is_err()
    );
    h.sink.set_reject(false);

    let outcome = h
        .orch
        .execute_leverage(2_000_000, &market(10_000, 9_000), b"vault-a")
        .unwrap();

    assert_eq!(outcome.records[0].sequence, 4);
    let seqs: Vec<u64> = h.sink.stored().iter().map(|r| r.sequence).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(h.orch.records(), h.sink.stored());
    assert_eq!(h.orch.last_leveraged_amount(), 2_000_000);
}

#[test]
fn test_halt_journal_failure_does_not_halt() {
    let h = harness();
    h.sink.set_reject(true);

    let err = h.orch.emergency_exit(&common::guardian()).unwrap_err();

    assert_eq!(err.code(), ErrorCode::JournalFailure);
    assert!(!h.orch.is_halted());
    assert!(h.orch.records().is_empty());
}

#[test]
fn test_failed_cycles_emit_no_events_and_count_rejections() {
    let orch = LeverageOrchestrator::builder(
        common::loop_amplifier(),
        FixedModel::failing(),
        common::registry(),
    )
    .build()
    .unwrap();

    for _ in 0..3 {
        assert!(orch.execute_leverage(1_000, b"", b"vault-a").is_err());
    }
    assert!(orch.records().is_empty());
    assert_eq!(orch.metrics().cycles_rejected_total(), 3);
    assert_eq!(orch.metrics().unwinds_total(), 3);
    assert_eq!(orch.metrics().cycles_committed_total(), 0);
}
