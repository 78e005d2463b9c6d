//! Strategy and symbol configuration.
//!
//! The host owns these settings and the engine reads them every bar. All of
//! them serialize, so a host can keep strategy settings in TOML files and
//! load them with [`StrategyConfig::from_toml_str`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, TradeLabError};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Sign of the direction: +1 long, -1 short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Commission models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// Percent of the fill notional, per side.
    Percent,
    /// Flat amount per order, however many contracts it moves.
    CashPerOrder,
    /// Flat amount per contract, per side.
    CashPerContract,
}

/// Default-quantity policies for entries issued without an explicit size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QtyType {
    /// A fixed number of contracts.
    Fixed,
    /// An account-currency amount converted at the current close.
    Cash,
    /// A percentage of current equity, commission-aware.
    PercentOfEquity,
}

/// One-cancels-all group types. Carried on orders for API compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcaType {
    Cancel,
    Reduce,
    None,
}

/// Static symbol information supplied by the bar feed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolInfo {
    /// Minimum price increment.
    pub mintick: f64,

    /// Account-currency value of one price unit for one contract.
    pub pointvalue: f64,

    /// Inverse of the exchange lot step; 1e8 admits 1e-8-sized orders.
    pub size_round_factor: f64,
}

impl Default for SymbolInfo {
    fn default() -> Self {
        Self {
            mintick: 0.01,
            pointvalue: 1.0,
            size_round_factor: 1e8,
        }
    }
}

/// Host-provided strategy settings, read each bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Starting account equity.
    pub initial_capital: f64,

    /// Extra same-direction entries allowed while a position is open.
    pub pyramiding: usize,

    /// Margin ratio for long positions (1.0 = no leverage).
    pub margin_long: f64,

    /// Margin ratio for short positions.
    pub margin_short: f64,

    /// Adverse fill offset for market orders, in ticks.
    pub slippage: u32,

    pub commission_type: CommissionType,
    pub commission_value: f64,

    pub default_qty_type: QtyType,
    pub default_qty_value: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            pyramiding: 0,
            margin_long: 1.0,
            margin_short: 1.0,
            slippage: 0,
            commission_type: CommissionType::Percent,
            commission_value: 0.0,
            default_qty_type: QtyType::Fixed,
            default_qty_value: 1.0,
        }
    }
}

impl StrategyConfig {
    /// Parse a configuration from TOML and validate it.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: StrategyConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.initial_capital <= 0.0 {
            return Err(TradeLabError::Config(
                "initial_capital must be > 0".into(),
            ));
        }
        if self.margin_long <= 0.0 || self.margin_short <= 0.0 {
            return Err(TradeLabError::Config("margin ratios must be > 0".into()));
        }
        if self.commission_value < 0.0 {
            return Err(TradeLabError::Config(
                "commission_value must be >= 0".into(),
            ));
        }
        if self.default_qty_value < 0.0 {
            return Err(TradeLabError::Config(
                "default_qty_value must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

impl SymbolInfo {
    pub fn validate(&self) -> Result<()> {
        if self.mintick <= 0.0 {
            return Err(TradeLabError::Config("mintick must be > 0".into()));
        }
        if self.pointvalue <= 0.0 {
            return Err(TradeLabError::Config("pointvalue must be > 0".into()));
        }
        if self.size_round_factor <= 0.0 {
            return Err(TradeLabError::Config(
                "size_round_factor must be > 0".into(),
            ));
        }
        Ok(())
    }
}
