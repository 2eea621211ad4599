//! Orchestrator configuration with fail-closed defaults.
//!
//! Each tunable is a [`ConfigParam`] with a documented default and an
//! allowed range. A value missing from the settings file falls back to its
//! default; a parameter without a default (flash liquidity, which depends on
//! the provider) fails closed when missing, as does any out-of-range value.

use leverage_core::amplify::{
    DEFAULT_FLASH_FEE_BPS, DEFAULT_MAX_LOAN_TO_VALUE_BPS, DEFAULT_TARGET_LEVERAGE_BPS,
    LeverageLoopConfig,
};
use leverage_core::orchestrator::{DEFAULT_YIELD_BPS, OrchestratorConfig};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

pub const DEFAULT_JOURNAL_CAPACITY: u128 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigParam {
    /// Share of each leveraged amount routed as yield.
    YieldBps,
    /// Maximum records the transition journal accepts.
    JournalCapacity,
    /// fsync the journal after every batch (0 or 1).
    RequireJournalFsync,
    /// Total exposure per unit of equity; 10000 = no leverage.
    TargetLeverageBps,
    MaxLoanToValueBps,
    FlashFeeBps,
    /// Flash liquidity available per loop. No default.
    FlashLiquidity,
}

/// Error when a parameter is missing without default, or out of range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingConfigError {
    pub param_name: &'static str,
    pub reason: &'static str,
}

impl fmt::Display for MissingConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "config fail-closed: '{}' rejected ({})",
            self.param_name, self.reason
        )
    }
}

impl std::error::Error for MissingConfigError {}

/// Default for a parameter; `None` means it must be configured.
pub fn config_default(param: ConfigParam) -> Option<u128> {
    match param {
        ConfigParam::YieldBps => Some(u128::from(DEFAULT_YIELD_BPS)),
        ConfigParam::JournalCapacity => Some(DEFAULT_JOURNAL_CAPACITY),
        ConfigParam::RequireJournalFsync => Some(1),
        ConfigParam::TargetLeverageBps => Some(u128::from(DEFAULT_TARGET_LEVERAGE_BPS)),
        ConfigParam::MaxLoanToValueBps => Some(u128::from(DEFAULT_MAX_LOAN_TO_VALUE_BPS)),
        ConfigParam::FlashFeeBps => Some(u128::from(DEFAULT_FLASH_FEE_BPS)),
        ConfigParam::FlashLiquidity => None,
    }
}

/// Inclusive `(min, max)` accepted for a parameter.
pub fn config_bounds(param: ConfigParam) -> (u128, u128) {
    match param {
        ConfigParam::YieldBps => (0, 10_000),
        ConfigParam::JournalCapacity => (1, usize::MAX as u128),
        ConfigParam::RequireJournalFsync => (0, 1),
        ConfigParam::TargetLeverageBps => (10_000, 100_000),
        ConfigParam::MaxLoanToValueBps => (0, 10_000),
        ConfigParam::FlashFeeBps => (0, 10_000),
        ConfigParam::FlashLiquidity => (0, u128::MAX),
    }
}

pub fn param_name(param: ConfigParam) -> &'static str {
    match param {
        ConfigParam::YieldBps => "yield_bps",
        ConfigParam::JournalCapacity => "journal_capacity",
        ConfigParam::RequireJournalFsync => "require_journal_fsync",
        ConfigParam::TargetLeverageBps => "target_leverage_bps",
        ConfigParam::MaxLoanToValueBps => "max_loan_to_value_bps",
        ConfigParam::FlashFeeBps => "flash_fee_bps",
        ConfigParam::FlashLiquidity => "flash_liquidity",
    }
}

/// Update when adding a variant.
pub const EXPECTED_PARAM_COUNT: usize = 7;

pub const ALL_PARAMS: &[ConfigParam] = &[
    ConfigParam::YieldBps,
    ConfigParam::JournalCapacity,
    ConfigParam::RequireJournalFsync,
    ConfigParam::TargetLeverageBps,
    ConfigParam::MaxLoanToValueBps,
    ConfigParam::FlashFeeBps,
    ConfigParam::FlashLiquidity,
];

/// Resolve a parameter value.
///
/// - `Some(v)` within bounds wins.
/// - `Some(v)` out of bounds is rejected.
/// - `None` takes the default, or fails closed if there is none.
pub fn resolve_config_value(
    param: ConfigParam,
    value: Option<u128>,
) -> Result<u128, MissingConfigError> {
    if let Some(v) = value {
        let (min, max) = config_bounds(param);
        if v < min {
            return Err(MissingConfigError {
                param_name: param_name(param),
                reason: "value is below the allowed minimum",
            });
        }
        if v > max {
            return Err(MissingConfigError {
                param_name: param_name(param),
                reason: "value is above the allowed maximum",
            });
        }
        return Ok(v);
    }
    config_default(param).ok_or_else(|| MissingConfigError {
        param_name: param_name(param),
        reason: "no default; must be configured explicitly",
    })
}

// --- Settings file ------------------------------------------------------

/// Settings as read from JSON. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSettings {
    pub yield_bps: Option<u128>,
    pub journal_capacity: Option<u128>,
    pub require_journal_fsync: Option<bool>,
    pub target_leverage_bps: Option<u128>,
    pub max_loan_to_value_bps: Option<u128>,
    pub flash_fee_bps: Option<u128>,
    pub flash_liquidity: Option<u128>,
}

/// Fully resolved configuration, ready for wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    /// Passed to `OrchestratorBuilder::config`.
    pub orchestrator: OrchestratorConfig,
    /// Passed to `LeverageLoopAmplifier::new`.
    pub leverage_loop: LeverageLoopConfig,
    /// Most records the journal will accept.
    pub journal_capacity: usize,
    /// Fsync every batch before it counts as committed.
    pub require_journal_fsync: bool,
}

impl OrchestratorSettings {
    /// Apply defaults and bounds to every parameter.
    pub fn resolve(&self) -> Result<ResolvedSettings, MissingConfigError> {
        let yield_bps = resolve_config_value(ConfigParam::YieldBps, self.yield_bps)?;
        let journal_capacity =
            resolve_config_value(ConfigParam::JournalCapacity, self.journal_capacity)?;
        let require_journal_fsync = resolve_config_value(
            ConfigParam::RequireJournalFsync,
            self.require_journal_fsync.map(u128::from),
        )?;
        let target_leverage_bps =
            resolve_config_value(ConfigParam::TargetLeverageBps, self.target_leverage_bps)?;
        let max_loan_to_value_bps =
            resolve_config_value(ConfigParam::MaxLoanToValueBps, self.max_loan_to_value_bps)?;
        let flash_fee_bps = resolve_config_value(ConfigParam::FlashFeeBps, self.flash_fee_bps)?;
        let flash_liquidity =
            resolve_config_value(ConfigParam::FlashLiquidity, self.flash_liquidity)?;

        Ok(ResolvedSettings {
            orchestrator: OrchestratorConfig {
                yield_bps: narrow(ConfigParam::YieldBps, yield_bps)?,
            },
            leverage_loop: LeverageLoopConfig {
                target_leverage_bps: narrow(ConfigParam::TargetLeverageBps, target_leverage_bps)?,
                max_loan_to_value_bps: narrow(
                    ConfigParam::MaxLoanToValueBps,
                    max_loan_to_value_bps,
                )?,
                flash_fee_bps: narrow(ConfigParam::FlashFeeBps, flash_fee_bps)?,
                flash_liquidity,
            },
            journal_capacity: narrow(ConfigParam::JournalCapacity, journal_capacity)?,
            require_journal_fsync: require_journal_fsync == 1,
        })
    }
}

/// Bounds keep every value within its target type; this only guards the cast.
fn narrow<T: TryFrom<u128>>(param: ConfigParam, value: u128) -> Result<T, MissingConfigError> {
    T::try_from(value).map_err(|_| MissingConfigError {
        param_name: param_name(param),
        reason: "value does not fit the target type",
    })
}

#[derive(Debug)]
pub enum SettingsError {
    Io { path: String, reason: String },
    Parse { reason: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "failed to read settings {path}: {reason}"),
            Self::Parse { reason } => write!(f, "invalid settings: {reason}"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// Parse settings from a JSON document; unknown keys are rejected.
pub fn parse_settings(json: &str) -> Result<OrchestratorSettings, SettingsError> {
    serde_json::from_str(json).map_err(|e| SettingsError::Parse {
        reason: e.to_string(),
    })
}

/// Read and parse a JSON settings file.
pub fn load_settings(path: impl AsRef<Path>) -> Result<OrchestratorSettings, SettingsError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|e| SettingsError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_settings(&json)
}
