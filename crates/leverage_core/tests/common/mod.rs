#![allow(dead_code)]

use leverage_core::amplify::{
    AmplifyError, AmplifyReceipt, AmplifyStep, LeverageLoopAmplifier, LeverageLoopConfig,
    LoanAmplifier,
};
use leverage_core::auth::{AuthorityRegistry, CallerId};
use leverage_core::record::{TransitionRecord, TransitionSink};
use leverage_core::risk::{RiskModel, RiskRatio};
use leverage_core::{CollaboratorError, LeverageOrchestrator, OrchestratorError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex, OnceLock, Weak};

pub const GUARDIAN: &str = "guardian";

pub fn guardian() -> CallerId {
    CallerId::from(GUARDIAN)
}

pub fn loop_amplifier() -> LeverageLoopAmplifier {
    LeverageLoopAmplifier::new(LeverageLoopConfig::with_flash_liquidity(1u128 << 100))
}

pub fn registry() -> AuthorityRegistry {
    AuthorityRegistry::with_authorized([guardian()])
}

/// Risk model that ignores market data and returns a scripted ratio.
#[derive(Debug, Clone)]
pub struct FixedModel {
    pub ratio: Option<u16>,
}

impl FixedModel {
    pub fn returning(bps: u16) -> Self {
        Self { ratio: Some(bps) }
    }

    pub fn failing() -> Self {
        Self { ratio: None }
    }
}

impl RiskModel for FixedModel {
    fn ratio(&self, _current: RiskRatio, _market_data: &[u8]) -> Result<RiskRatio, CollaboratorError> {
        match self.ratio {
            Some(bps) => RiskRatio::from_bps(bps).map_err(|err| CollaboratorError::MarketData {
                reason: err.to_string(),
            }),
            None => Err(CollaboratorError::MarketData {
                reason: "oracle unavailable".to_string(),
            }),
        }
    }
}

/// Calls observed by [`TrackingAmplifier`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AmplifierCalls {
    pub amplified: Vec<u128>,
    pub settled: Vec<u64>,
    pub unwound: Vec<u64>,
}

/// Amplifier that records every call, optionally failing `amplify`.
pub struct TrackingAmplifier {
    inner: LeverageLoopAmplifier,
    calls: Arc<Mutex<AmplifierCalls>>,
    fail_amplify: bool,
}

impl TrackingAmplifier {
    pub fn tracked() -> (Self, Arc<Mutex<AmplifierCalls>>) {
        let calls = Arc::new(Mutex::new(AmplifierCalls::default()));
        let amplifier = Self {
            inner: loop_amplifier(),
            calls: Arc::clone(&calls),
            fail_amplify: false,
        };
        (amplifier, calls)
    }

    pub fn failing() -> (Self, Arc<Mutex<AmplifierCalls>>) {
        let (mut amplifier, calls) = Self::tracked();
        amplifier.fail_amplify = true;
        (amplifier, calls)
    }
}

impl LoanAmplifier for TrackingAmplifier {
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError> {
        self.calls.lock().unwrap().amplified.push(amount);
        if self.fail_amplify {
            return Err(AmplifyError::StepFailed {
                step: AmplifyStep::Swap,
                reason: "pool drained".to_string(),
            });
        }
        self.inner.amplify(amount)
    }

    fn settle(&mut self, receipt: &AmplifyReceipt) {
        self.calls.lock().unwrap().settled.push(receipt.ticket);
        self.inner.settle(receipt);
    }

    fn unwind(&mut self, receipt: &AmplifyReceipt) {
        self.calls.lock().unwrap().unwound.push(receipt.ticket);
        self.inner.unwind(receipt);
    }
}

/// In-memory sink that can be switched to reject batches.
#[derive(Clone, Default)]
pub struct MemorySink {
    pub records: Arc<Mutex<Vec<TransitionRecord>>>,
    pub reject: Arc<AtomicBool>,
}

impl MemorySink {
    pub fn stored(&self) -> Vec<TransitionRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl TransitionSink for MemorySink {
    fn append_batch(&mut self, batch: &[TransitionRecord]) -> Result<(), String> {
        if self.reject.load(Ordering::SeqCst) {
            return Err("disk full".to_string());
        }
        self.records.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }
}

/// What a hostile collaborator tries when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    ExecuteLeverage,
    EmergencyExit,
    ReadSnapshot,
}

pub type OrchestratorSlot = Arc<OnceLock<Weak<LeverageOrchestrator>>>;

/// Amplifier that calls back into the orchestrator from inside `amplify`.
pub struct HostileAmplifier {
    inner: LeverageLoopAmplifier,
    slot: OrchestratorSlot,
    callback: Callback,
    pub observed: Arc<Mutex<Vec<Result<(), OrchestratorError>>>>,
    pub observed_halted: Arc<Mutex<Vec<bool>>>,
}

impl HostileAmplifier {
    pub fn calling(callback: Callback) -> (Self, OrchestratorSlot) {
        let slot: OrchestratorSlot = Arc::new(OnceLock::new());
        let amplifier = Self {
            inner: loop_amplifier(),
            slot: Arc::clone(&slot),
            callback,
            observed: Arc::new(Mutex::new(Vec::new())),
            observed_halted: Arc::new(Mutex::new(Vec::new())),
        };
        (amplifier, slot)
    }
}

impl LoanAmplifier for HostileAmplifier {
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError> {
        if let Some(orch) = self.slot.get().and_then(Weak::upgrade) {
            match self.callback {
                Callback::ExecuteLeverage => {
                    let nested = orch.execute_leverage(amount, b"", b"nested").map(|_| ());
                    self.observed.lock().unwrap().push(nested);
                }
                Callback::EmergencyExit => {
                    let nested = orch.emergency_exit(&guardian()).map(|_| ());
                    self.observed.lock().unwrap().push(nested);
                }
                Callback::ReadSnapshot => {
                    self.observed_halted.lock().unwrap().push(orch.is_halted());
                    let _ = orch.records();
                    let _ = orch.snapshot();
                }
            }
        }
        self.inner.amplify(amount)
    }

    fn settle(&mut self, receipt: &AmplifyReceipt) {
        self.inner.settle(receipt);
    }

    fn unwind(&mut self, receipt: &AmplifyReceipt) {
        self.inner.unwind(receipt);
    }
}

/// Amplifier whose receipt claims `factor` times the requested amount.
pub struct InflatingAmplifier {
    inner: LeverageLoopAmplifier,
    factor: u128,
    pub unwound: Arc<Mutex<Vec<u64>>>,
}

impl InflatingAmplifier {
    pub fn by(factor: u128) -> Self {
        Self {
            inner: loop_amplifier(),
            factor,
            unwound: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl LoanAmplifier for InflatingAmplifier {
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError> {
        let mut receipt = self.inner.amplify(amount)?;
        receipt.amount = amount * self.factor;
        Ok(receipt)
    }

    fn settle(&mut self, receipt: &AmplifyReceipt) {
        self.inner.settle(receipt);
    }

    fn unwind(&mut self, receipt: &AmplifyReceipt) {
        self.unwound.lock().unwrap().push(receipt.ticket);
        self.inner.unwind(receipt);
    }
}

/// Amplifier that parks inside its first `amplify` until the test releases
/// it.
///
/// `entered` and `release` are two-party barriers: the amplifier waits on
/// `entered` once it is running, then on `release` before returning.
pub struct ParkedAmplifier {
    inner: LeverageLoopAmplifier,
    armed: bool,
    pub entered: Arc<Barrier>,
    pub release: Arc<Barrier>,
}

impl ParkedAmplifier {
    pub fn parked() -> Self {
        Self {
            inner: loop_amplifier(),
            armed: true,
            entered: Arc::new(Barrier::new(2)),
            release: Arc::new(Barrier::new(2)),
        }
    }
}

impl LoanAmplifier for ParkedAmplifier {
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError> {
        if std::mem::take(&mut self.armed) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.amplify(amount)
    }

    fn settle(&mut self, receipt: &AmplifyReceipt) {
        self.inner.settle(receipt);
    }

    fn unwind(&mut self, receipt: &AmplifyReceipt) {
        self.inner.unwind(receipt);
    }
}
