//! Loan amplifier contract and the reference leverage-loop implementation.
//!
//! **Two-phase contract:**
//! 1. `amplify(amount)` runs the whole sub-step loop and, on success, holds
//!    the resulting position *provisionally* behind an [`AmplifyReceipt`].
//! 2. The orchestrator either `settle`s the receipt when the cycle commits or
//!    `unwind`s it when any later stage fails.
//!
//! A failing sub-step leaves nothing behind: the loop runs on a scratch copy
//! of the position book and the flash loan must be repaid in full from the
//! loan-to-value-capped borrow before the scratch copy is staged.

use crate::risk::{BPS_DENOMINATOR, apply_bps};
use std::fmt;

// --- Contract -----------------------------------------------------------

/// Sub-steps of one amplification loop, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmplifyStep {
    FlashBorrow,
    Swap,
    Deposit,
    Borrow,
}

impl fmt::Display for AmplifyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AmplifyStep::FlashBorrow => "flash_borrow",
            AmplifyStep::Swap => "swap",
            AmplifyStep::Deposit => "deposit",
            AmplifyStep::Borrow => "borrow",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmplifyError {
    #[error("amplify amount must be positive")]
    InvalidAmount,
    #[error("receipt {ticket} is still provisional")]
    ReceiptOutstanding { ticket: u64 },
    #[error("flash liquidity exhausted: requested {requested}, available {available}")]
    FlashLiquidityExhausted { requested: u128, available: u128 },
    /// The borrow allowed under the loan-to-value cap cannot repay the
    /// flash loan plus fee.
    #[error("flash repayment short: owed {owed}, borrowable {borrowed}")]
    RepayShortfall { owed: u128, borrowed: u128 },
    #[error("{step} failed: {reason}")]
    StepFailed { step: AmplifyStep, reason: String },
}

/// Proof of a provisional amplification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmplifyReceipt {
    /// Identifies the pending amplification for settle or unwind.
    pub ticket: u64,
    /// Equity supplied by the caller.
    pub amount: u128,
    pub flash_borrowed: u128,
    pub collateral_added: u128,
    /// Borrowed against the new collateral to repay the flash loan.
    pub debt_added: u128,
}

/// Capability interface of the loan-amplification provider.
pub trait LoanAmplifier: Send {
    /// Run the full loop; on `Err` nothing may remain provisionally held.
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError>;

    /// Finalize the provisional position behind `receipt`.
    fn settle(&mut self, receipt: &AmplifyReceipt);

    /// Discard the provisional position behind `receipt`.
    fn unwind(&mut self, receipt: &AmplifyReceipt);
}

// --- Reference implementation -------------------------------------------

pub const DEFAULT_TARGET_LEVERAGE_BPS: u32 = 20_000;
pub const DEFAULT_MAX_LOAN_TO_VALUE_BPS: u16 = 8_000;
pub const DEFAULT_FLASH_FEE_BPS: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeverageLoopConfig {
    /// Total exposure per unit of equity (20000 = 2x).
    pub target_leverage_bps: u32,
    /// Post-loop loan-to-value cap.
    pub max_loan_to_value_bps: u16,
    /// Flash loan fee, rounded up.
    pub flash_fee_bps: u32,
    /// Largest flash loan the provider can supply in one loop.
    pub flash_liquidity: u128,
}

impl LeverageLoopConfig {
    pub fn with_flash_liquidity(flash_liquidity: u128) -> Self {
        Self {
            target_leverage_bps: DEFAULT_TARGET_LEVERAGE_BPS,
            max_loan_to_value_bps: DEFAULT_MAX_LOAN_TO_VALUE_BPS,
            flash_fee_bps: DEFAULT_FLASH_FEE_BPS,
            flash_liquidity,
        }
    }
}

/// Collateral and debt held by the leveraged position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionBook {
    pub collateral: u128,
    pub debt: u128,
}

impl PositionBook {
    pub fn loan_to_value_bps(&self) -> u128 {
        if self.debt == 0 {
            return 0;
        }
        if self.debt >= self.collateral {
            return BPS_DENOMINATOR;
        }
        self.debt
            .checked_mul(BPS_DENOMINATOR)
            .map(|scaled| scaled / self.collateral)
            .unwrap_or_else(|| self.debt / (self.collateral / BPS_DENOMINATOR))
    }
}

/// In-memory leverage loop over a single position book.
#[derive(Debug)]
pub struct LeverageLoopAmplifier {
    config: LeverageLoopConfig,
    book: PositionBook,
    pending: Option<(AmplifyReceipt, PositionBook)>,
    next_ticket: u64,
}

impl LeverageLoopAmplifier {
    /// Empty position under `config`.
    pub fn new(config: LeverageLoopConfig) -> Self {
        Self {
            config,
            book: PositionBook::default(),
            pending: None,
            next_ticket: 1,
        }
    }

    pub fn config(&self) -> &LeverageLoopConfig {
        &self.config
    }

    /// Settled position; provisional effects are not included.
    pub fn position(&self) -> PositionBook {
        self.book
    }

    /// Receipt awaiting settle or unwind.
    pub fn pending_receipt(&self) -> Option<&AmplifyReceipt> {
        self.pending.as_ref().map(|(receipt, _)| receipt)
    }

    fn run_loop(&self, amount: u128) -> Result<LoopOutcome, AmplifyError> {
        let mut scratch = self.book;
        let extra_bps = u128::from(self.config.target_leverage_bps).saturating_sub(BPS_DENOMINATOR);

        // 1. Flash borrow the extra exposure.
        let flash = apply_bps(amount, extra_bps).ok_or_else(|| overflow(AmplifyStep::FlashBorrow))?;
        if flash > self.config.flash_liquidity {
            return Err(AmplifyError::FlashLiquidityExhausted {
                requested: flash,
                available: self.config.flash_liquidity,
            });
        }
        let fee = fee_ceil(flash, u128::from(self.config.flash_fee_bps))
            .ok_or_else(|| overflow(AmplifyStep::FlashBorrow))?;
        let flash_owed = flash
            .checked_add(fee)
            .ok_or_else(|| overflow(AmplifyStep::FlashBorrow))?;

        // 2. Swap equity plus flash funds into the collateral asset (1:1).
        let swapped = amount
            .checked_add(flash)
            .ok_or_else(|| overflow(AmplifyStep::Swap))?;

        // 3. Deposit as collateral.
        scratch.collateral = scratch
            .collateral
            .checked_add(swapped)
            .ok_or_else(|| overflow(AmplifyStep::Deposit))?;

        // 4. Borrow against the new collateral, up to the loan-to-value cap.
        let borrow_limit = apply_bps(
            scratch.collateral,
            u128::from(self.config.max_loan_to_value_bps),
        )
        .ok_or_else(|| overflow(AmplifyStep::Borrow))?;
        let headroom = borrow_limit.saturating_sub(scratch.debt);
        let proceeds = flash_owed.min(headroom);
        scratch.debt = scratch
            .debt
            .checked_add(proceeds)
            .ok_or_else(|| overflow(AmplifyStep::Borrow))?;

        // 5. Repay the flash loan from the borrowed proceeds.
        if proceeds < flash_owed {
            return Err(AmplifyError::RepayShortfall {
                owed: flash_owed,
                borrowed: proceeds,
            });
        }

        Ok(LoopOutcome {
            staged: scratch,
            flash,
            collateral_added: swapped,
            debt_added: proceeds,
        })
    }
}

struct LoopOutcome {
    staged: PositionBook,
    flash: u128,
    collateral_added: u128,
    debt_added: u128,
}

impl LoanAmplifier for LeverageLoopAmplifier {
    fn amplify(&mut self, amount: u128) -> Result<AmplifyReceipt, AmplifyError> {
        if amount == 0 {
            return Err(AmplifyError::InvalidAmount);
        }
        if let Some((receipt, _)) = &self.pending {
            return Err(AmplifyError::ReceiptOutstanding {
                ticket: receipt.ticket,
            });
        }

        let outcome = self.run_loop(amount)?;
        let receipt = AmplifyReceipt {
            ticket: self.next_ticket,
            amount,
            flash_borrowed: outcome.flash,
            collateral_added: outcome.collateral_added,
            debt_added: outcome.debt_added,
        };
        self.next_ticket += 1;
        tracing::debug!(
            "AmplifyStaged ticket={} amount={} flash={} ltv_bps={}",
            receipt.ticket,
            amount,
            outcome.flash,
            outcome.staged.loan_to_value_bps()
        );
        self.pending = Some((receipt.clone(), outcome.staged));
        Ok(receipt)
    }

    fn settle(&mut self, receipt: &AmplifyReceipt) {
        match self.pending.take() {
            Some((pending, staged)) if pending.ticket == receipt.ticket => {
                self.book = staged;
            }
            other => {
                tracing::warn!(
                    "AmplifySettleMismatch ticket={} pending={:?}",
                    receipt.ticket,
                    other.as_ref().map(|(r, _)| r.ticket)
                );
                self.pending = other;
            }
        }
    }

    fn unwind(&mut self, receipt: &AmplifyReceipt) {
        match self.pending.take() {
            Some((pending, _)) if pending.ticket == receipt.ticket => {
                tracing::debug!("AmplifyUnwound ticket={}", receipt.ticket);
            }
            other => {
                tracing::warn!(
                    "AmplifyUnwindMismatch ticket={} pending={:?}",
                    receipt.ticket,
                    other.as_ref().map(|(r, _)| r.ticket)
                );
                self.pending = other;
            }
        }
    }
}

fn fee_ceil(amount: u128, bps: u128) -> Option<u128> {
    let floor = apply_bps(amount, bps)?;
    let remainder = (amount % BPS_DENOMINATOR).checked_mul(bps)? % BPS_DENOMINATOR;
    floor.checked_add(u128::from(remainder != 0))
}

fn overflow(step: AmplifyStep) -> AmplifyError {
    AmplifyError::StepFailed {
        step,
        reason: "arithmetic overflow".to_string(),
    }
}
