//! Leverage orchestrator engine.
//!
//! One `execute_leverage` call is a single unit of work:
//!
//! 1. amplify (provisional, receipt-backed)
//! 2. recompute the risk ratio (pure)
//! 3. derive and route the yield (staged)
//! 4. append the cycle's records to the durable sink
//! 5. commit: swap the snapshot and append to the in-memory log, then
//!    settle the receipt and publish ratio and routing
//!
//! A failure in steps 2-5 unwinds the receipt, so nothing is committed and
//! no record is emitted. The settle and publish calls after a successful
//! snapshot swap cannot fail. Readers only ever see the last committed
//! snapshot.
//!
//! Both entry points run under an [`InProgressGuard`]: a collaborator
//! calling back into the orchestrator on the same thread is refused with
//! `Reentrancy`, while callers on other threads wait their turn.

use super::config::OrchestratorConfig;
use super::guard::{EnterError, InProgressGuard, NO_OWNER};
use super::metrics::OrchestratorMetrics;
use crate::amplify::{AmplifyReceipt, LoanAmplifier};
use crate::auth::{AuthorizationGate, CallerId, is_authorized};
use crate::error::{CollaboratorError, EntryPoint, OrchestratorError, PipelineStage};
use crate::record::{
    CycleIdInput, TransitionBatch, TransitionEvent, TransitionLog, TransitionRecord,
    TransitionSink, compute_cycle_id, format_cycle_id,
};
use crate::risk::{RiskModel, RiskRatio, RiskRatioController};
use crate::routing::{DestinationId, RoutedYield, YieldRouter};
use std::sync::atomic::AtomicU64;
use std::sync::{Mutex, PoisonError, RwLock};

/// Point-in-time view of the orchestrator's committed state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrchestratorSnapshot {
    /// Set by the first authorized emergency exit; never cleared.
    pub halted: bool,
    /// First caller that triggered the halt.
    pub halted_by: Option<CallerId>,
    /// Ratio published by the last committed cycle.
    pub risk_ratio: RiskRatio,
    /// Amount of the last committed cycle, 0 before the first.
    pub last_leveraged_amount: u128,
    /// Sequence of the last committed record.
    pub records_committed: u64,
}

/// Result of a committed leverage cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Shared by every record of this cycle.
    pub cycle_id: u64,
    pub amount: u128,
    /// Ratio after this cycle, whether or not it changed.
    pub risk_ratio: RiskRatio,
    /// `None` when the yield floored to zero.
    pub routed: Option<RoutedYield>,
    /// Records appended by this cycle, in commit order.
    pub records: Vec<TransitionRecord>,
    pub stage_trace: Vec<PipelineStage>,
}

impl CycleOutcome {
    /// The closing leverage-executed record.
    pub fn executed_record(&self) -> Option<&TransitionRecord> {
        self.records.last()
    }
}

/// Committed state reduced from a previously persisted record history.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RestoredState {
    pub halted: bool,
    pub halted_by: Option<CallerId>,
    pub risk_ratio: RiskRatio,
    pub last_leveraged_amount: u128,
    pub records: Vec<TransitionRecord>,
}

impl RestoredState {
    /// Fold records in sequence order into the state they committed.
    pub fn from_records(records: Vec<TransitionRecord>) -> Self {
        let mut state = RestoredState::default();
        for record in &records {
            match &record.event {
                TransitionEvent::RiskRatioUpdated { ratio, .. } => state.risk_ratio = *ratio,
                TransitionEvent::YieldRouted { .. } => {}
                TransitionEvent::LeverageExecuted { amount } => {
                    state.last_leveraged_amount = *amount;
                }
                TransitionEvent::HaltTriggered { caller } => {
                    state.halted = true;
                    if state.halted_by.is_none() {
                        state.halted_by = Some(caller.clone());
                    }
                }
            }
        }
        state.records = records;
        state
    }
}

struct PipelineState {
    amplifier: Box<dyn LoanAmplifier>,
    risk: RiskRatioController,
    router: YieldRouter,
    sink: Option<Box<dyn TransitionSink>>,
}

/// Effects of steps 2-3, held until commit.
struct StagedCycle {
    cycle_id: u64,
    next_ratio: RiskRatio,
    routed: Option<RoutedYield>,
    records: Vec<TransitionRecord>,
}

/// Wires collaborators, config and an optional durable sink into a
/// [`LeverageOrchestrator`].
pub struct OrchestratorBuilder {
    amplifier: Box<dyn LoanAmplifier>,
    risk_model: Box<dyn RiskModel>,
    gate: Box<dyn AuthorizationGate>,
    config: OrchestratorConfig,
    sink: Option<Box<dyn TransitionSink>>,
    restored: Option<RestoredState>,
}

impl OrchestratorBuilder {
    /// Default config, no sink, initial state.
    pub fn new(
        amplifier: impl LoanAmplifier + 'static,
        risk_model: impl RiskModel + 'static,
        gate: impl AuthorizationGate + 'static,
    ) -> Self {
        Self {
            amplifier: Box::new(amplifier),
            risk_model: Box::new(risk_model),
            gate: Box::new(gate),
            config: OrchestratorConfig::default(),
            sink: None,
            restored: None,
        }
    }

    /// Replace the default [`OrchestratorConfig`].
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Durable medium every record batch is written to before commit.
    pub fn sink(mut self, sink: impl TransitionSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Continue from a persisted history instead of the initial state.
    pub fn restore(mut self, restored: RestoredState) -> Self {
        self.restored = Some(restored);
        self
    }

    /// Returns `Err(Journal)` if the restored history has sequence gaps.
    pub fn build(self) -> Result<LeverageOrchestrator, OrchestratorError> {
        let mut risk = RiskRatioController::new(self.risk_model);
        let mut router = YieldRouter::new();
        let mut snapshot = OrchestratorSnapshot::default();
        let mut log = TransitionLog::new();

        if let Some(restored) = self.restored {
            log = TransitionLog::from_records(restored.records)
                .map_err(|reason| OrchestratorError::Journal { reason })?;
            for record in log.records() {
                if let TransitionEvent::YieldRouted {
                    destination,
                    amount,
                } = &record.event
                {
                    router.record(RoutedYield {
                        destination: *destination,
                        amount: *amount,
                    });
                }
            }
            risk.publish(restored.risk_ratio);
            snapshot = OrchestratorSnapshot {
                halted: restored.halted,
                halted_by: restored.halted_by,
                risk_ratio: restored.risk_ratio,
                last_leveraged_amount: restored.last_leveraged_amount,
                records_committed: log.last_sequence(),
            };
            tracing::info!(
                "orchestrator restored records={} halted={} risk_ratio={} last_leveraged_amount={}",
                snapshot.records_committed,
                snapshot.halted,
                snapshot.risk_ratio,
                snapshot.last_leveraged_amount
            );
        }

        Ok(LeverageOrchestrator {
            owner: AtomicU64::new(NO_OWNER),
            snapshot: RwLock::new(snapshot),
            state: Mutex::new(PipelineState {
                amplifier: self.amplifier,
                risk,
                router,
                sink: self.sink,
            }),
            log: RwLock::new(log),
            gate: self.gate,
            metrics: OrchestratorMetrics::new(),
            config: self.config,
        })
    }
}

/// Sequences amplification, risk recompute and yield routing as one atomic
/// cycle, and owns the halt flag.
///
/// All entry points take `&self`; share it behind an `Arc`. Concurrent
/// callers are serialized; a call nested inside a collaborator callback is
/// rejected with `Reentrancy`.
pub struct LeverageOrchestrator {
    /// Token of the thread currently running an entry point.
    owner: AtomicU64,
    snapshot: RwLock<OrchestratorSnapshot>,
    state: Mutex<PipelineState>,
    log: RwLock<TransitionLog>,
    gate: Box<dyn AuthorizationGate>,
    metrics: OrchestratorMetrics,
    config: OrchestratorConfig,
}

impl LeverageOrchestrator {
    /// Shorthand for [`OrchestratorBuilder::new`].
    pub fn builder(
        amplifier: impl LoanAmplifier + 'static,
        risk_model: impl RiskModel + 'static,
        gate: impl AuthorizationGate + 'static,
    ) -> OrchestratorBuilder {
        OrchestratorBuilder::new(amplifier, risk_model, gate)
    }

    // --- Entry points ------------------------------------------------------

    /// Run one leverage cycle for `amount`.
    ///
    /// Fails with `InvalidAmount` for zero, `Halted` once halted, and
    /// `Collaborator`/`Journal` when any stage fails; in every failure case
    /// committed state and records are untouched.
    pub fn execute_leverage(
        &self,
        amount: u128,
        market_data: &[u8],
        routing_params: &[u8],
    ) -> Result<CycleOutcome, OrchestratorError> {
        let entry_point = EntryPoint::ExecuteLeverage;
        let result = if amount == 0 {
            Err(OrchestratorError::InvalidAmount)
        } else {
            self.enter(entry_point)
                .and_then(|mut state| self.run_cycle(&mut state, amount, market_data, routing_params))
        };

        match result {
            Ok(outcome) => {
                self.metrics.record_cycle_committed();
                tracing::info!(
                    "leverage cycle committed cycle_id={} amount={} risk_ratio={} routed={:?}",
                    format_cycle_id(outcome.cycle_id),
                    outcome.amount,
                    outcome.risk_ratio,
                    outcome.routed.as_ref().map(|r| r.amount)
                );
                Ok(outcome)
            }
            Err(err) => {
                self.metrics.record_reject(entry_point, &err);
                Err(err)
            }
        }
    }

    /// Halt the orchestrator on behalf of `caller`.
    ///
    /// Repeat calls by an authorized caller succeed and append another
    /// halt record. Nothing clears the halt. A call from another thread
    /// while a cycle is running waits for that cycle and then halts.
    pub fn emergency_exit(&self, caller: &CallerId) -> Result<TransitionRecord, OrchestratorError> {
        let entry_point = EntryPoint::EmergencyExit;
        let result = self
            .enter(entry_point)
            .and_then(|mut state| self.run_halt(&mut state, caller));

        match result {
            Ok(record) => {
                self.metrics.record_halt();
                tracing::info!(
                    "orchestrator halted caller={} sequence={}",
                    caller,
                    record.sequence
                );
                Ok(record)
            }
            Err(err) => {
                self.metrics.record_reject(entry_point, &err);
                Err(err)
            }
        }
    }

    // --- Queries -----------------------------------------------------------

    /// Last committed state. Never blocks on a running cycle.
    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether an emergency exit has committed.
    pub fn is_halted(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .halted
    }

    /// Latest committed risk ratio.
    pub fn risk_ratio(&self) -> RiskRatio {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .risk_ratio
    }

    /// Amount of the last committed cycle.
    pub fn last_leveraged_amount(&self) -> u128 {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_leveraged_amount
    }

    /// Every committed record, in sequence order.
    pub fn records(&self) -> Vec<TransitionRecord> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records()
            .to_vec()
    }

    /// Committed records with `sequence > after`.
    pub fn records_since(&self, after: u64) -> Vec<TransitionRecord> {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .since(after)
            .to_vec()
    }

    /// Total committed yield routed to `destination`.
    pub fn routed_total(&self, destination: &DestinationId) -> u128 {
        let log = self.log.read().unwrap_or_else(PoisonError::into_inner);
        log.records()
            .iter()
            .filter_map(|record| match &record.event {
                TransitionEvent::YieldRouted {
                    destination: routed_to,
                    amount,
                } if routed_to == destination => Some(*amount),
                _ => None,
            })
            .fold(0u128, u128::saturating_add)
    }

    /// Per-instance counters.
    pub fn metrics(&self) -> &OrchestratorMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // --- Cycle internals ---------------------------------------------------

    fn enter(
        &self,
        entry_point: EntryPoint,
    ) -> Result<InProgressGuard<'_, PipelineState>, OrchestratorError> {
        InProgressGuard::enter(&self.owner, &self.state).map_err(|err| match err {
            EnterError::Nested => OrchestratorError::Reentrancy { entry_point },
            EnterError::Poisoned => OrchestratorError::Poisoned,
        })
    }

    fn run_cycle(
        &self,
        state: &mut PipelineState,
        amount: u128,
        market_data: &[u8],
        routing_params: &[u8],
    ) -> Result<CycleOutcome, OrchestratorError> {
        // Checked under the guard: a cycle queued behind a halt must see it.
        if self.is_halted() {
            return Err(OrchestratorError::Halted);
        }
        let mut stage_trace = Vec::with_capacity(5);

        stage_trace.push(PipelineStage::Amplify);
        let receipt = state
            .amplifier
            .amplify(amount)
            .map_err(|err| OrchestratorError::Collaborator {
                stage: PipelineStage::Amplify,
                source: err.into(),
            })?;

        let staged = match self.stage_cycle(
            state,
            &receipt,
            amount,
            market_data,
            routing_params,
            &mut stage_trace,
        ) {
            Ok(staged) => staged,
            Err(err) => return Err(self.unwind_cycle(state, &receipt, &stage_trace, err)),
        };

        stage_trace.push(PipelineStage::Commit);
        let committed = self.commit(staged.records.clone(), |snapshot| {
            snapshot.risk_ratio = staged.next_ratio;
            snapshot.last_leveraged_amount = amount;
        });
        if let Err(err) = committed {
            return Err(self.unwind_cycle(state, &receipt, &stage_trace, err));
        }
        state.amplifier.settle(&receipt);
        state.risk.publish(staged.next_ratio);
        if let Some(routed) = &staged.routed {
            state.router.record(*routed);
        }
        tracing::debug!(
            "leverage cycle stages cycle_id={} stages={:?}",
            format_cycle_id(staged.cycle_id),
            stage_trace
        );

        Ok(CycleOutcome {
            cycle_id: staged.cycle_id,
            amount,
            risk_ratio: staged.next_ratio,
            routed: staged.routed,
            records: staged.records,
            stage_trace,
        })
    }

    /// Revert the provisional amplification behind `receipt` and pass `err`
    /// through.
    fn unwind_cycle(
        &self,
        state: &mut PipelineState,
        receipt: &AmplifyReceipt,
        stage_trace: &[PipelineStage],
        err: OrchestratorError,
    ) -> OrchestratorError {
        state.amplifier.unwind(receipt);
        self.metrics.record_unwind();
        tracing::warn!(
            "leverage cycle unwound ticket={} amount={} stages={:?} err={}",
            receipt.ticket,
            receipt.amount,
            stage_trace,
            err
        );
        err
    }

    fn stage_cycle(
        &self,
        state: &mut PipelineState,
        receipt: &AmplifyReceipt,
        amount: u128,
        market_data: &[u8],
        routing_params: &[u8],
        stage_trace: &mut Vec<PipelineStage>,
    ) -> Result<StagedCycle, OrchestratorError> {
        if receipt.amount != amount {
            return Err(collaborator(
                PipelineStage::Amplify,
                CollaboratorError::ReceiptMismatch {
                    requested: amount,
                    receipted: receipt.amount,
                },
            ));
        }

        stage_trace.push(PipelineStage::RiskRatio);
        let previous = state.risk.current();
        let next_ratio = state
            .risk
            .recompute(market_data)
            .map_err(|source| collaborator(PipelineStage::RiskRatio, source))?;

        stage_trace.push(PipelineStage::YieldRoute);
        let yield_amount = self.config.yield_for(amount);
        let routed = state
            .router
            .route(yield_amount, routing_params)
            .map_err(|source| collaborator(PipelineStage::YieldRoute, source))?;

        stage_trace.push(PipelineStage::Journal);
        let first_sequence = self.next_sequence();
        let cycle_id = compute_cycle_id(&CycleIdInput {
            entry_point: EntryPoint::ExecuteLeverage,
            first_sequence,
            amount,
            market_data,
            routing_params,
            caller: None,
        });
        let mut batch = TransitionBatch::new(cycle_id, first_sequence);
        if next_ratio != previous {
            batch.push(TransitionEvent::RiskRatioUpdated {
                previous,
                ratio: next_ratio,
            });
        }
        if let Some(routed) = &routed {
            batch.push(TransitionEvent::YieldRouted {
                destination: routed.destination,
                amount: routed.amount,
            });
        }
        batch.push(TransitionEvent::LeverageExecuted { amount });
        let records = batch.into_records();
        append_to_sink(state, &records)?;

        Ok(StagedCycle {
            cycle_id,
            next_ratio,
            routed,
            records,
        })
    }

    fn run_halt(
        &self,
        state: &mut PipelineState,
        caller: &CallerId,
    ) -> Result<TransitionRecord, OrchestratorError> {
        if !is_authorized(self.gate.as_ref(), caller) {
            return Err(OrchestratorError::Unauthorized {
                caller: caller.clone(),
            });
        }

        let first_sequence = self.next_sequence();
        let cycle_id = compute_cycle_id(&CycleIdInput {
            entry_point: EntryPoint::EmergencyExit,
            first_sequence,
            amount: 0,
            market_data: &[],
            routing_params: &[],
            caller: Some(caller),
        });
        let mut batch = TransitionBatch::new(cycle_id, first_sequence);
        batch.push(TransitionEvent::HaltTriggered {
            caller: caller.clone(),
        });
        let records = batch.into_records();
        append_to_sink(state, &records)?;

        let halt_record = records.first().cloned();
        self.commit(records, |snapshot| {
            snapshot.halted = true;
            if snapshot.halted_by.is_none() {
                snapshot.halted_by = Some(caller.clone());
            }
        })?;
        halt_record.ok_or_else(|| OrchestratorError::Journal {
            reason: "halt batch is empty".to_string(),
        })
    }

    fn next_sequence(&self) -> u64 {
        self.log
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .next_sequence()
    }

    /// Publish a cycle's records and snapshot changes together.
    ///
    /// Lock order is snapshot then log; queries take one lock at a time.
    fn commit(
        &self,
        records: Vec<TransitionRecord>,
        apply: impl FnOnce(&mut OrchestratorSnapshot),
    ) -> Result<(), OrchestratorError> {
        let mut snapshot = self.snapshot.write().map_err(|_| OrchestratorError::Poisoned)?;
        let mut log = self.log.write().map_err(|_| OrchestratorError::Poisoned)?;
        log.commit(records).map_err(|reason| {
            tracing::error!("transition log diverged from journal: {}", reason);
            OrchestratorError::Journal { reason }
        })?;
        apply(&mut snapshot);
        snapshot.records_committed = log.last_sequence();
        Ok(())
    }
}

impl std::fmt::Debug for LeverageOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeverageOrchestrator")
            .field("snapshot", &self.snapshot())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn collaborator(stage: PipelineStage, source: CollaboratorError) -> OrchestratorError {
    OrchestratorError::Collaborator { stage, source }
}

fn append_to_sink(
    state: &mut PipelineState,
    records: &[TransitionRecord],
) -> Result<(), OrchestratorError> {
    let Some(sink) = state.sink.as_mut() else {
        return Ok(());
    };
    sink.append_batch(records).map_err(|reason| {
        tracing::warn!("transition sink rejected batch len={}: {}", records.len(), reason);
        OrchestratorError::Journal { reason }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amplify::{LeverageLoopAmplifier, LeverageLoopConfig};
    use crate::auth::AuthorityRegistry;
    use crate::risk::CollateralDebtModel;

    fn orchestrator() -> LeverageOrchestrator {
        LeverageOrchestrator::builder(
            LeverageLoopAmplifier::new(LeverageLoopConfig::with_flash_liquidity(u128::MAX / 4)),
            CollateralDebtModel,
            AuthorityRegistry::with_authorized([CallerId::from("guardian")]),
        )
        .build()
        .unwrap()
    }

    #[test]
    fn test_cycle_records_in_commit_order() {
        let orch = orchestrator();
        let data = CollateralDebtModel::encode(10_000, 8_000);
        let outcome = orch.execute_leverage(1_000_000, &data, b"vault-a").unwrap();

        let kinds: Vec<&str> = outcome.records.iter().map(|r| r.kind().as_str()).collect();
        assert_eq!(
            kinds,
            vec!["risk_ratio_updated", "yield_routed", "leverage_executed"]
        );
        assert!(outcome.records.iter().all(|r| r.cycle_id == outcome.cycle_id));
        assert_eq!(
            outcome.stage_trace,
            vec![
                PipelineStage::Amplify,
                PipelineStage::RiskRatio,
                PipelineStage::YieldRoute,
                PipelineStage::Journal,
                PipelineStage::Commit,
            ]
        );
        assert_eq!(orch.snapshot().records_committed, 3);
    }

    /// Loop amplifier that counts settles and unwinds.
    struct CountingAmplifier {
        inner: LeverageLoopAmplifier,
        settled: std::sync::Arc<std::sync::atomic::AtomicU64>,
        unwound: std::sync::Arc<std::sync::atomic::AtomicU64>,
    }

    impl LoanAmplifier for CountingAmplifier {
        fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, crate::amplify::AmplifyError> {
            self.inner.amplify(amount)
        }

        fn settle(&mut self, receipt: &AmplifyReceipt) {
            self.settled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.settle(receipt);
        }

        fn unwind(&mut self, receipt: &AmplifyReceipt) {
            self.unwound.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.unwind(receipt);
        }
    }

    #[test]
    fn test_failed_commit_unwinds_without_publishing() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicU64, Ordering};

        let settled = Arc::new(AtomicU64::new(0));
        let unwound = Arc::new(AtomicU64::new(0));
        let orch = LeverageOrchestrator::builder(
            CountingAmplifier {
                inner: LeverageLoopAmplifier::new(LeverageLoopConfig::with_flash_liquidity(
                    u128::MAX / 4,
                )),
                settled: Arc::clone(&settled),
                unwound: Arc::clone(&unwound),
            },
            CollateralDebtModel,
            AuthorityRegistry::new(),
        )
        .build()
        .unwrap();

        // Poison the snapshot lock so the commit step itself fails.
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _held = orch.snapshot.write().unwrap();
            panic!("writer died");
        }));
        assert!(poisoned.is_err());

        let data = CollateralDebtModel::encode(10_000, 8_000);
        let err = orch.execute_leverage(1_000_000, &data, b"vault-a").unwrap_err();

        assert_eq!(err, OrchestratorError::Poisoned);
        assert_eq!(settled.load(Ordering::SeqCst), 0);
        assert_eq!(unwound.load(Ordering::SeqCst), 1);
        assert_eq!(orch.metrics().unwinds_total(), 1);
        assert!(orch.records().is_empty());

        let state = orch.state.lock().unwrap();
        assert_eq!(state.risk.current(), RiskRatio::ZERO);
        assert_eq!(state.risk.updates(), 0);
        assert_eq!(
            state.router.routed_total(&DestinationId::derive(b"vault-a")),
            0
        );
    }

    #[test]
    fn test_restored_state_folds_history() {
        let records = vec![
            TransitionRecord {
                sequence: 1,
                cycle_id: 1,
                event: TransitionEvent::RiskRatioUpdated {
                    previous: RiskRatio::ZERO,
                    ratio: RiskRatio::from_bps(4_000).unwrap(),
                },
            },
            TransitionRecord {
                sequence: 2,
                cycle_id: 1,
                event: TransitionEvent::LeverageExecuted { amount: 77 },
            },
            TransitionRecord {
                sequence: 3,
                cycle_id: 2,
                event: TransitionEvent::HaltTriggered {
                    caller: CallerId::from("first"),
                },
            },
            TransitionRecord {
                sequence: 4,
                cycle_id: 3,
                event: TransitionEvent::HaltTriggered {
                    caller: CallerId::from("second"),
                },
            },
        ];
        let restored = RestoredState::from_records(records);
        assert!(restored.halted);
        assert_eq!(restored.halted_by, Some(CallerId::from("first")));
        assert_eq!(restored.risk_ratio.bps(), 4_000);
        assert_eq!(restored.last_leveraged_amount, 77);
        assert_eq!(restored.records.len(), 4);
    }

    #[test]
    fn test_build_rejects_gapped_history() {
        let restored = RestoredState {
            records: vec![TransitionRecord {
                sequence: 2,
                cycle_id: 9,
                event: TransitionEvent::LeverageExecuted { amount: 1 },
            }],
            ..RestoredState::default()
        };
        let err = LeverageOrchestrator::builder(
            LeverageLoopAmplifier::new(LeverageLoopConfig::with_flash_liquidity(1_000)),
            CollateralDebtModel,
            AuthorityRegistry::new(),
        )
        .restore(restored)
        .build()
        .unwrap_err();
        assert!(matches!(err, OrchestratorError::Journal { .. }));
    }
}
