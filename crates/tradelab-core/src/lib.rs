//! TradeLab Core - bar-driven order lifecycle and position accounting for
//! Pine-style strategy backtesting.
//!
//! This crate provides:
//! - Bar and tick-grid primitives
//! - Pending-order books and the position ledger
//! - A deterministic intrabar matching engine (two passes per bar)
//! - The strategy-facing order API (`entry`, `exit`, `close`, ...)
//! - Risk-management gates and trade-tape export
//!
//! The host feeds one bar at a time; the engine matches the orders the
//! strategy issued on the previous bar against the bar's OHLC using a
//! nearest-extreme-first intrabar trajectory, then the host runs its
//! strategy logic to issue the next round of orders.

pub mod bar;
pub mod book;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod order;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod ticks;
pub mod trade;

pub use bar::Bar;
pub use config::{CommissionType, Direction, OcaType, QtyType, StrategyConfig, SymbolInfo};
pub use engine::Engine;
pub use error::TradeLabError;
pub use order::{Order, OrderKind};
pub use position::Position;
pub use strategy::{CloseParams, EntryParams, ExitParams};
pub use trade::Trade;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bar::Bar;
    pub use crate::config::{
        CommissionType, Direction, OcaType, QtyType, StrategyConfig, SymbolInfo,
    };
    pub use crate::engine::Engine;
    pub use crate::error::TradeLabError;
    pub use crate::strategy::{CloseParams, EntryParams, ExitParams};
    pub use crate::trade::Trade;
}
