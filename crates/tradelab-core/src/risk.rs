//! Risk-management settings and state.
//!
//! Risk rules never raise: they block new orders, clamp sizes, or halt
//! trading. Intraday caps flatten the position and halt until the next UTC
//! day; consecutive-losing-days and drawdown caps halt for good.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bar::Bar;
use crate::config::{Direction, QtyType};
use crate::engine::Engine;
use crate::order::{Order, OrderKind};

/// A cap expressed in account currency or as a percent of a reference
/// equity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskCap {
    pub value: f64,
    pub qty_type: QtyType,
}

impl RiskCap {
    /// The cap in account currency, given the reference it is measured from.
    pub fn resolve(&self, reference_equity: f64) -> f64 {
        match self.qty_type {
            QtyType::PercentOfEquity => reference_equity * self.value * 0.01,
            _ => self.value,
        }
    }
}

/// Risk-management state carried by the ledger.
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    // Settings.
    pub allowed_direction: Option<Direction>,
    pub max_position_size: Option<f64>,
    pub max_intraday_filled_orders: Option<u32>,
    pub max_intraday_loss: Option<RiskCap>,
    pub max_cons_loss_days: Option<u32>,
    pub max_drawdown: Option<RiskCap>,

    // State.
    /// Permanently halted; no further orders this run.
    pub halt_trading: bool,
    /// Halted for the remainder of the current UTC day.
    pub halted_until_next_day: bool,
    /// Orders filled so far today.
    pub intraday_filled_orders: u32,
    pub cons_loss_days: u32,
    pub current_day: Option<NaiveDate>,
    pub last_day_equity: f64,
    pub intraday_start_equity: f64,
    pub peak_equity: f64,
}

impl RiskState {
    /// True while no new orders may be issued.
    pub fn trading_blocked(&self) -> bool {
        self.halt_trading || self.halted_until_next_day
    }
}

impl Engine {
    /// Restrict entries to one direction. Reverse entries degrade to exits.
    pub fn risk_allow_entry_in(&mut self, direction: Direction) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.allowed_direction = Some(direction);
    }

    /// Cap the absolute position size; oversized entries are clamped.
    pub fn risk_max_position_size(&mut self, contracts: f64) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.max_position_size = Some(contracts);
    }

    /// After `count` filled orders in one day: flatten and halt until the
    /// next day.
    pub fn risk_max_intraday_filled_orders(&mut self, count: u32) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.max_intraday_filled_orders = Some(count);
    }

    /// When the day's loss reaches the cap: flatten and halt until the next
    /// day.
    pub fn risk_max_intraday_loss(&mut self, value: f64, qty_type: QtyType) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.max_intraday_loss = Some(RiskCap { value, qty_type });
    }

    /// After `count` consecutive losing days: halt for good.
    pub fn risk_max_cons_loss_days(&mut self, count: u32) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.max_cons_loss_days = Some(count);
    }

    /// When drawdown from the equity peak reaches the cap: halt for good.
    pub fn risk_max_drawdown(&mut self, value: f64, qty_type: QtyType) {
        if self.reentry_guard {
            return;
        }
        self.position.risk.max_drawdown = Some(RiskCap { value, qty_type });
    }

    /// Day rollover: reset intraday tracking and score the finished day.
    pub(crate) fn roll_risk_day(&mut self, bar: &Bar) {
        let day = bar.ts.date_naive();
        let equity = self.position.equity();

        let mut halt_for_cons_losses = false;
        {
            let risk = &mut self.position.risk;
            match risk.current_day {
                None => {
                    risk.current_day = Some(day);
                    risk.last_day_equity = equity;
                    risk.intraday_start_equity = equity;
                    risk.peak_equity = equity;
                }
                Some(current) if day != current => {
                    if equity < risk.last_day_equity {
                        risk.cons_loss_days += 1;
                    } else {
                        risk.cons_loss_days = 0;
                    }
                    if let Some(cap) = risk.max_cons_loss_days {
                        if risk.cons_loss_days >= cap && !risk.halt_trading {
                            risk.halt_trading = true;
                            halt_for_cons_losses = true;
                        }
                    }
                    risk.current_day = Some(day);
                    risk.last_day_equity = equity;
                    risk.intraday_start_equity = equity;
                    risk.intraday_filled_orders = 0;
                    risk.halted_until_next_day = false;
                }
                _ => {}
            }
            risk.peak_equity = risk.peak_equity.max(equity);
        }

        if halt_for_cons_losses {
            // Score settles at the previous close; nothing traded since.
            let price = self.position.prev_c;
            self.liquidate(price, "consecutive losing days");
        }
    }

    /// Evaluate the equity-based caps after the bar's matching.
    pub(crate) fn check_risk_triggers(&mut self) {
        let equity = self.position.equity();
        self.position.risk.peak_equity = self.position.risk.peak_equity.max(equity);

        let risk = &self.position.risk;
        if risk.halt_trading {
            return;
        }

        let mut halt_day = false;
        let mut halt_forever = false;
        let mut reason = "";

        if !risk.halted_until_next_day {
            if let Some(cap) = risk.max_intraday_filled_orders {
                if risk.intraday_filled_orders >= cap {
                    halt_day = true;
                    reason = "intraday filled-order cap";
                }
            }
            if let Some(cap) = risk.max_intraday_loss {
                let limit = cap.resolve(risk.intraday_start_equity);
                if risk.intraday_start_equity - equity >= limit {
                    halt_day = true;
                    reason = "intraday loss cap";
                }
            }
        }
        if let Some(cap) = risk.max_drawdown {
            let limit = cap.resolve(risk.peak_equity);
            if risk.peak_equity - equity >= limit {
                halt_forever = true;
                reason = "max drawdown cap";
            }
        }

        if halt_forever {
            self.position.risk.halt_trading = true;
            let price = self.position.c;
            self.liquidate(price, reason);
        } else if halt_day {
            self.position.risk.halted_until_next_day = true;
            let price = self.position.c;
            self.liquidate(price, reason);
        }
    }

    /// Cancel everything pending and market out of the position.
    fn liquidate(&mut self, price: f64, reason: &str) {
        self.position.entry_orders.clear();
        self.position.exit_orders.clear();
        if self.position.size != 0.0 {
            warn!(reason, size = self.position.size, price, "risk liquidation");
            let mut order = Order::new(None, -self.position.size, OrderKind::Close);
            order.exit_id = Some("Risk liquidation order".to_string());
            let ctx = self.fill_ctx();
            self.position.fill_order(&mut order, price, price, price, &ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::config::{StrategyConfig, SymbolInfo};
    use crate::strategy::EntryParams;
    use chrono::{TimeZone, Utc};

    fn mk_bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap();
        Bar::new(ts, open, high, low, close)
    }

    fn engine() -> Engine {
        Engine::new(
            StrategyConfig {
                initial_capital: 10_000.0,
                ..Default::default()
            },
            SymbolInfo::default(),
        )
        .unwrap()
    }

    #[test]
    fn allowed_direction_blocks_fresh_entries() {
        let mut engine = engine();
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.risk_allow_entry_in(Direction::Long);

        engine.entry("Short", Direction::Short, EntryParams { qty: Some(1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());

        engine.entry("Long", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert_eq!(engine.position().entry_orders.len(), 1);
    }

    #[test]
    fn restricted_reversal_degrades_to_exit() {
        let mut engine = engine();
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.risk_allow_entry_in(Direction::Long);
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(2.0), ..Default::default() });
        engine.process_bar(&mk_bar(2, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(engine.position_size(), 2.0);

        // The reverse entry passes the gate, but the fill only closes.
        engine.entry("Short", Direction::Short, EntryParams { qty: Some(5.0), ..Default::default() });
        engine.process_bar(&mk_bar(3, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(engine.position_size(), 0.0);
        assert!(engine.position().open_trades.is_empty());
        assert_eq!(engine.closed_trades_count(), 1);
    }

    #[test]
    fn max_position_size_clamps_entries() {
        let mut engine = engine();
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.risk_max_position_size(3.0);

        engine.entry("Long", Direction::Long, EntryParams { qty: Some(10.0), ..Default::default() });
        engine.process_bar(&mk_bar(2, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(engine.position_size(), 3.0);

        // Already at the cap: the next entry is refused outright.
        engine.entry("More", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());
    }

    #[test]
    fn intraday_filled_order_cap_halts_for_the_day() {
        let mut engine = engine();
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.risk_max_intraday_filled_orders(1);

        engine.entry("L1", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&mk_bar(2, 100.0, 101.0, 99.0, 100.0));
        // The fill hit the cap: flattened and halted for the day.
        assert_eq!(engine.position_size(), 0.0);
        assert!(engine.position().risk.halted_until_next_day);

        engine.entry("L2", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());

        // A new day lifts the halt.
        engine.process_bar(&mk_bar(3, 100.0, 101.0, 99.0, 100.0));
        assert!(!engine.position().risk.halted_until_next_day);
        engine.entry("L3", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert_eq!(engine.position().entry_orders.len(), 1);
    }

    #[test]
    fn max_drawdown_halts_permanently() {
        let mut engine = engine();
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.risk_max_drawdown(500.0, QtyType::Cash);

        engine.entry("Long", Direction::Long, EntryParams { qty: Some(10.0), ..Default::default() });
        engine.process_bar(&mk_bar(2, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(engine.position_size(), 10.0);

        // Price collapses 60 points: equity falls 600 below the peak.
        engine.process_bar(&mk_bar(3, 45.0, 45.0, 35.0, 40.0));
        assert!(engine.position().risk.halt_trading);
        assert_eq!(engine.position_size(), 0.0);

        engine.entry("Again", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());
    }

    #[test]
    fn cons_loss_days_halt_permanently() {
        let mut engine = engine();
        engine.risk_max_cons_loss_days(2);
        engine.process_bar(&mk_bar(1, 100.0, 101.0, 99.0, 100.0));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(10.0), ..Default::default() });

        // Two consecutive losing days.
        engine.process_bar(&mk_bar(2, 100.0, 100.0, 95.0, 95.0));
        engine.process_bar(&mk_bar(3, 95.0, 95.0, 90.0, 90.0));
        engine.process_bar(&mk_bar(4, 90.0, 90.0, 88.0, 89.0));
        assert!(engine.position().risk.halt_trading);
        assert_eq!(engine.position_size(), 0.0);
    }

    #[test]
    fn risk_cap_resolves_percent_against_reference() {
        let cap = RiskCap {
            value: 10.0,
            qty_type: QtyType::PercentOfEquity,
        };
        assert_eq!(cap.resolve(5000.0), 500.0);

        let cash = RiskCap {
            value: 250.0,
            qty_type: QtyType::Cash,
        };
        assert_eq!(cash.resolve(5000.0), 250.0);
    }
}
