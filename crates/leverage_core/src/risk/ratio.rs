//! Fixed-point risk ratio in basis points, bounded to [0, 10000].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator (10000 bps = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Highest representable risk ratio (100%).
pub const RISK_RATIO_CEILING_BPS: u16 = 10_000;

/// `amount * bps / 10000`, floored, without intermediate overflow for
/// `bps <= 10000`. `None` only if the result itself overflows.
pub fn apply_bps(amount: u128, bps: u128) -> Option<u128> {
    let whole = (amount / BPS_DENOMINATOR).checked_mul(bps)?;
    let part = (amount % BPS_DENOMINATOR).checked_mul(bps)? / BPS_DENOMINATOR;
    whole.checked_add(part)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("risk ratio {bps} bps exceeds ceiling {RISK_RATIO_CEILING_BPS} bps")]
pub struct RiskRatioOutOfRange {
    pub bps: u16,
}

/// Current leverage risk exposure. The bound is enforced at construction,
/// so every value of this type is within [0, 10000].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct RiskRatio(u16);

impl RiskRatio {
    pub const ZERO: RiskRatio = RiskRatio(0);
    pub const CEILING: RiskRatio = RiskRatio(RISK_RATIO_CEILING_BPS);

    pub fn from_bps(bps: u16) -> Result<Self, RiskRatioOutOfRange> {
        if bps > RISK_RATIO_CEILING_BPS {
            return Err(RiskRatioOutOfRange { bps });
        }
        Ok(Self(bps))
    }

    /// Clamp an arbitrary bps value into range.
    pub fn saturating_from_bps(bps: u128) -> Self {
        if bps >= u128::from(RISK_RATIO_CEILING_BPS) {
            Self::CEILING
        } else {
            // Bounded above by the ceiling, so the narrowing is lossless.
            Self(bps as u16)
        }
    }

    pub fn bps(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for RiskRatio {
    type Error = RiskRatioOutOfRange;

    fn try_from(bps: u16) -> Result<Self, Self::Error> {
        Self::from_bps(bps)
    }
}

impl From<RiskRatio> for u16 {
    fn from(ratio: RiskRatio) -> Self {
        ratio.0
    }
}

impl fmt::Display for RiskRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}bps", self.0)
    }
}
