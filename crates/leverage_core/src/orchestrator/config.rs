use crate::risk::{BPS_DENOMINATOR, apply_bps};

/// Share of each leveraged amount routed as yield (100 bps = amount / 100).
pub const DEFAULT_YIELD_BPS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Clamped to 10000 when applied.
    pub yield_bps: u32,
}

impl OrchestratorConfig {
    /// Yield derived from a leveraged amount, floored.
    pub fn yield_for(&self, amount: u128) -> u128 {
        let bps = u128::from(self.yield_bps).min(BPS_DENOMINATOR);
        // bps <= 10000 keeps the product within `amount`.
        apply_bps(amount, bps).unwrap_or(amount)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            yield_bps: DEFAULT_YIELD_BPS,
        }
    }
}
