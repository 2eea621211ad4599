//! Loan amplification: the borrow/swap/deposit/borrow/repay loop.

pub mod loan;

pub use loan::{
    AmplifyError, AmplifyReceipt, AmplifyStep, DEFAULT_FLASH_FEE_BPS,
    DEFAULT_MAX_LOAN_TO_VALUE_BPS, DEFAULT_TARGET_LEVERAGE_BPS, LeverageLoopAmplifier,
    LeverageLoopConfig, LoanAmplifier, PositionBook,
};
