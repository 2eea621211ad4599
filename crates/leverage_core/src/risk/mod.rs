//! Risk ratio (loan-to-value analogue) and its controller.

pub mod controller;
pub mod ratio;

pub use controller::{CollateralDebtModel, RiskModel, RiskRatioController};
pub use ratio::{
    BPS_DENOMINATOR, RISK_RATIO_CEILING_BPS, RiskRatio, RiskRatioOutOfRange, apply_bps,
};
