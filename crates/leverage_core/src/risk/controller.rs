//! Risk ratio controller.
//!
//! Recomputation is pure: `recompute` never mutates the stored ratio. The
//! orchestrator publishes the new value only when the whole cycle commits,
//! and only when it differs from the stored one.

use super::ratio::{BPS_DENOMINATOR, RiskRatio};
use crate::error::CollaboratorError;

/// Pluggable numerical model turning market data into a risk ratio.
///
/// Implementations must be deterministic: identical `(current, market_data)`
/// always yield the identical ratio.
pub trait RiskModel: Send {
    fn ratio(&self, current: RiskRatio, market_data: &[u8]) -> Result<RiskRatio, CollaboratorError>;
}

/// Reference model: market data is `collateral_value ‖ debt_value`, both
/// big-endian u128, and the ratio is `debt / collateral` in bps.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollateralDebtModel;

impl CollateralDebtModel {
    pub const MARKET_DATA_LEN: usize = 32;

    /// Encode a market-data payload understood by this model.
    pub fn encode(collateral_value: u128, debt_value: u128) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::MARKET_DATA_LEN);
        buf.extend_from_slice(&collateral_value.to_be_bytes());
        buf.extend_from_slice(&debt_value.to_be_bytes());
        buf
    }
}

impl RiskModel for CollateralDebtModel {
    fn ratio(
        &self,
        _current: RiskRatio,
        market_data: &[u8],
    ) -> Result<RiskRatio, CollaboratorError> {
        if market_data.len() != Self::MARKET_DATA_LEN {
            return Err(CollaboratorError::MarketData {
                reason: format!(
                    "expected {} bytes of market data, got {}",
                    Self::MARKET_DATA_LEN,
                    market_data.len()
                ),
            });
        }
        let mut collateral = [0u8; 16];
        let mut debt = [0u8; 16];
        collateral.copy_from_slice(&market_data[..16]);
        debt.copy_from_slice(&market_data[16..]);
        let collateral = u128::from_be_bytes(collateral);
        let debt = u128::from_be_bytes(debt);

        if debt == 0 {
            return Ok(RiskRatio::ZERO);
        }
        if debt >= collateral {
            return Ok(RiskRatio::CEILING);
        }
        // debt < collateral here, so collateral / 10000 is non-zero whenever
        // the scaled product overflows.
        let bps = debt
            .checked_mul(BPS_DENOMINATOR)
            .map(|scaled| scaled / collateral)
            .unwrap_or_else(|| debt / (collateral / BPS_DENOMINATOR));
        Ok(RiskRatio::saturating_from_bps(bps))
    }
}

/// Owner of the stored risk ratio.
pub struct RiskRatioController {
    model: Box<dyn RiskModel>,
    current: RiskRatio,
    updates: u64,
}

impl RiskRatioController {
    /// New controller starting at ratio 0.
    pub fn new(model: Box<dyn RiskModel>) -> Self {
        Self {
            model,
            current: RiskRatio::ZERO,
            updates: 0,
        }
    }

    pub fn current(&self) -> RiskRatio {
        self.current
    }

    /// Number of times the stored ratio actually changed.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Compute the ratio implied by `market_data` without storing it.
    pub fn recompute(&self, market_data: &[u8]) -> Result<RiskRatio, CollaboratorError> {
        self.model.ratio(self.current, market_data)
    }

    /// Store `ratio`. Returns true if the stored value changed.
    pub fn publish(&mut self, ratio: RiskRatio) -> bool {
        if ratio == self.current {
            return false;
        }
        self.current = ratio;
        self.updates += 1;
        true
    }
}

impl std::fmt::Debug for RiskRatioController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskRatioController")
            .field("current", &self.current)
            .field("updates", &self.updates)
            .finish_non_exhaustive()
    }
}
