//! The strategy-facing order API.
//!
//! These are the calls a strategy makes from its per-bar logic: create,
//! modify, or cancel pending orders, and read the ledger's aggregate
//! properties. Optional arguments travel in `Default`-able param structs so
//! call sites stay close to the scripting surface they mirror:
//!
//! ```
//! use tradelab_core::prelude::*;
//!
//! let mut engine = Engine::new(StrategyConfig::default(), SymbolInfo::default()).unwrap();
//! engine.entry("Long", Direction::Long, EntryParams { qty: Some(2.0), ..Default::default() });
//! engine.exit("TP", ExitParams {
//!     from_entry: Some("Long".into()),
//!     profit: Some(150.0),
//!     ..Default::default()
//! });
//! ```

use tracing::trace;

use crate::config::{CommissionType, Direction, OcaType, QtyType};
use crate::engine::Engine;
use crate::order::{Order, OrderKind};
use crate::ticks::{price_round, sign_of, size_round};
use crate::trade::Trade;

/// Optional arguments for [`Engine::entry`].
#[derive(Debug, Clone, Default)]
pub struct EntryParams {
    /// Contracts to buy or sell; defaults to the configured quantity policy.
    pub qty: Option<f64>,
    pub limit: Option<f64>,
    pub stop: Option<f64>,
    pub oca_name: Option<String>,
    pub oca_type: Option<OcaType>,
    pub comment: Option<String>,
    pub alert_message: Option<String>,
}

/// Optional arguments for [`Engine::exit`].
#[derive(Debug, Clone, Default)]
pub struct ExitParams {
    /// Entry order (or open trade) this exit is bound to; absent means every
    /// pending entry, else every open trade.
    pub from_entry: Option<String>,
    pub qty: Option<f64>,
    /// Percentage of the bound quantity to close, when `qty` is absent.
    pub qty_percent: Option<f64>,
    /// Take-profit distance in ticks, resolved against the entry price.
    pub profit: Option<f64>,
    /// Take-profit price.
    pub limit: Option<f64>,
    /// Stop-loss distance in ticks, resolved against the entry price.
    pub loss: Option<f64>,
    /// Stop-loss price.
    pub stop: Option<f64>,
    /// Trailing-stop activation price.
    pub trail_price: Option<f64>,
    /// Trailing-stop activation distance in ticks.
    pub trail_points: Option<f64>,
    /// Trailing-stop offset from the extreme, in ticks.
    pub trail_offset: Option<f64>,
    pub oca_name: Option<String>,
    pub comment: Option<String>,
    pub alert_message: Option<String>,
}

/// Optional arguments for [`Engine::close`].
#[derive(Debug, Clone, Default)]
pub struct CloseParams {
    pub qty: Option<f64>,
    pub qty_percent: Option<f64>,
    pub comment: Option<String>,
    pub alert_message: Option<String>,
    /// Fill on the current bar's close instead of the next bar.
    pub immediately: bool,
}

impl Engine {
    /// Create (or replace) an order to open or add to a position.
    pub fn entry(&mut self, id: &str, direction: Direction, params: EntryParams) {
        if self.reentry_guard || self.position.risk.trading_blocked() {
            return;
        }

        let qty = match params.qty {
            Some(qty) => qty,
            None => self.default_qty(),
        };
        if qty <= 0.0 {
            return;
        }

        let dir_sign = direction.sign();
        let margin = match direction {
            Direction::Long => self.config.margin_long,
            Direction::Short => self.config.margin_short,
        };
        let mut size = qty * dir_sign / margin;
        let sign = sign_of(size);

        // Pyramiding only constrains same-direction additions.
        if self.position.size != 0.0
            && self.position.sign == sign
            && self.config.pyramiding <= self.position.open_trades.len()
        {
            return;
        }

        if let Some(allowed) = self.position.risk.allowed_direction {
            if allowed.sign() != sign {
                // Blocked as a fresh position; a direction change passes
                // through so the fill can degrade it to an exit.
                if self.position.size == 0.0 || self.position.sign == sign {
                    return;
                }
            }
        }

        if let Some(max_size) = self.position.risk.max_position_size {
            if (self.position.size + size).abs() > max_size {
                let allowed = max_size - self.position.size.abs();
                if allowed <= 0.0 {
                    return;
                }
                size = allowed * sign;
            }
        }

        if let Some(cap) = self.position.risk.max_intraday_filled_orders {
            if self.position.risk.intraday_filled_orders >= cap {
                return;
            }
        }

        let size = size_round(size, self.symbol.size_round_factor);
        if size == 0.0 {
            return;
        }

        let mintick = self.symbol.mintick;
        let mut order = Order::new(Some(id.to_string()), size, OrderKind::Entry);
        order.limit = params.limit.map(|v| price_round(v, mintick, dir_sign));
        order.stop = params.stop.map(|v| price_round(v, mintick, -dir_sign));
        order.oca_name = params.oca_name;
        order.oca_type = params.oca_type;
        order.comment = params.comment;
        order.alert_message = params.alert_message;

        trace!(id, size, "entry order placed");
        self.position.entry_orders.insert(id, order);
    }

    /// Create (or replace) an exit order against a position or pending entry.
    pub fn exit(&mut self, id: &str, params: ExitParams) {
        if self.reentry_guard {
            return;
        }
        if params.qty.map_or(false, |q| q < 0.0) {
            return;
        }

        if let Some(from_entry) = params.from_entry.clone() {
            if let Some(entry_order) = self.position.entry_orders.get(&from_entry) {
                let (direction, size) = (entry_order.sign(), entry_order.size);
                self.push_exit(id, from_entry, direction, size, &params);
            } else if let Some(trade) = self
                .position
                .open_trades
                .iter()
                .find(|t| t.entry_id == from_entry)
            {
                let (direction, size) = (trade.sign(), trade.size);
                self.push_exit(id, from_entry, direction, size, &params);
            }
        } else {
            // No binding given: one exit per pending entry, else one per
            // open trade. Same-key inserts mean the last one stands.
            let pending: Vec<(String, f64, f64)> = self
                .position
                .entry_orders
                .iter()
                .map(|(entry_id, order)| (entry_id.clone(), order.sign(), order.size))
                .collect();
            if pending.is_empty() {
                let open: Vec<(String, f64, f64)> = self
                    .position
                    .open_trades
                    .iter()
                    .map(|t| (t.entry_id.clone(), t.sign(), t.size))
                    .collect();
                for (entry_id, direction, size) in open {
                    self.push_exit(id, entry_id, direction, size, &params);
                }
            } else {
                for (entry_id, direction, size) in pending {
                    self.push_exit(id, entry_id, direction, size, &params);
                }
            }
        }
    }

    fn push_exit(&mut self, id: &str, from_entry: String, direction: f64, base_size: f64, params: &ExitParams) {
        let size = match params.qty {
            Some(qty) => -direction * qty,
            None => match params.qty_percent {
                Some(pct) => -base_size * (pct * 0.01),
                None => -base_size,
            },
        };
        let size = size_round(size, self.symbol.size_round_factor);
        if size == 0.0 {
            return;
        }

        // A trailing activation level alone is not an exit trigger.
        if params.limit.is_none() && params.stop.is_none() && params.trail_price.is_some() {
            return;
        }

        let mintick = self.symbol.mintick;
        let mut order = Order::new(Some(from_entry), size, OrderKind::Close);
        order.exit_id = Some(id.to_string());
        order.limit = params.limit.map(|v| price_round(v, mintick, direction));
        order.stop = params.stop.map(|v| price_round(v, mintick, -direction));
        order.trail_price = params.trail_price.map(|v| price_round(v, mintick, direction));
        order.trail_offset = params.trail_offset.unwrap_or(0.0);
        order.profit_ticks = params.profit;
        order.loss_ticks = params.loss;
        order.trail_points_ticks = params.trail_points;
        order.oca_name = params.oca_name.clone();
        order.comment = params.comment.clone();
        order.alert_message = params.alert_message.clone();

        trace!(exit_id = id, size, "exit order placed");
        self.position.exit_orders.insert(id, order);
    }

    /// Close (part of) the position opened by entries with this id.
    pub fn close(&mut self, id: &str, params: CloseParams) {
        if self.reentry_guard {
            return;
        }
        if params.qty.map_or(false, |q| q <= 0.0) {
            return;
        }
        if self.position.size == 0.0 {
            return;
        }

        let size = match params.qty {
            Some(qty) => -self.position.sign * qty,
            None => match params.qty_percent {
                Some(pct) => -self.position.size * (pct * 0.01),
                None => -self.position.size,
            },
        };
        let size = size_round(size, self.symbol.size_round_factor);
        if size == 0.0 {
            return;
        }

        let exit_id = format!("Close entry(s) order {id}");
        let mut order = Order::new(Some(id.to_string()), size, OrderKind::Close);
        order.exit_id = Some(exit_id.clone());
        order.comment = params.comment;
        order.alert_message = params.alert_message;

        if params.immediately {
            let ctx = self.fill_ctx();
            let (c, h, l) = (self.position.c, self.position.h, self.position.l);
            self.position.fill_order(&mut order, c, h, l, &ctx);
        } else {
            self.position.exit_orders.insert(exit_id, order);
        }
    }

    /// Close the whole position, whatever entries built it.
    pub fn close_all(&mut self, comment: Option<&str>, alert_message: Option<&str>, immediately: bool) {
        if self.reentry_guard {
            return;
        }
        if self.position.size == 0.0 {
            return;
        }

        let exit_id = "Close position order";
        let mut order = Order::new(None, -self.position.size, OrderKind::Close);
        order.exit_id = Some(exit_id.to_string());
        order.comment = comment.map(str::to_string);
        order.alert_message = alert_message.map(str::to_string);

        if immediately {
            let ctx = self.fill_ctx();
            let (c, h, l) = (self.position.c, self.position.h, self.position.l);
            self.position.fill_order(&mut order, c, h, l, &ctx);
        } else {
            self.position.exit_orders.insert(exit_id, order);
        }
    }

    /// Cancel a pending order by id, whichever book holds it.
    pub fn cancel(&mut self, id: &str) {
        if self.reentry_guard {
            return;
        }
        self.position.entry_orders.remove(id);
        self.position.exit_orders.remove(id);
    }

    /// Cancel every pending order.
    pub fn cancel_all(&mut self) {
        if self.reentry_guard {
            return;
        }
        self.position.entry_orders.clear();
        self.position.exit_orders.clear();
    }

    /// Default quantity under the configured policy.
    ///
    /// Percent-of-equity solves for the quantity whose total cost (position
    /// value plus commission) equals the requested share of equity.
    fn default_qty(&self) -> f64 {
        let value = self.config.default_qty_value;
        let price = self.position.c * self.symbol.pointvalue;
        match self.config.default_qty_type {
            QtyType::Fixed => value,
            QtyType::Cash => value / price,
            QtyType::PercentOfEquity => {
                let target = self.position.equity() * value * 0.01;
                match self.config.commission_type {
                    CommissionType::Percent => {
                        target / (price * (1.0 + self.config.commission_value * 0.01))
                    }
                    CommissionType::CashPerContract => {
                        target / (price + self.config.commission_value)
                    }
                    CommissionType::CashPerOrder => {
                        ((target - self.config.commission_value) / price).max(0.0)
                    }
                }
            }
        }
    }

    // ── Module properties ──────────────────────────────────────────────

    /// Current equity: initial capital plus realized and unrealized P&L.
    pub fn equity(&self) -> f64 {
        self.position.equity()
    }

    pub fn initial_capital(&self) -> f64 {
        self.position.initial_capital()
    }

    pub fn netprofit(&self) -> f64 {
        self.position.netprofit
    }

    pub fn openprofit(&self) -> f64 {
        self.position.openprofit
    }

    pub fn grossprofit(&self) -> f64 {
        self.position.grossprofit
    }

    /// Gross loss as reported: open trades' commission counts against it.
    pub fn grossloss(&self) -> f64 {
        self.position.grossloss + self.position.open_commission
    }

    pub fn max_drawdown(&self) -> f64 {
        self.position.max_drawdown
    }

    pub fn max_runup(&self) -> f64 {
        self.position.max_runup
    }

    pub fn wintrades(&self) -> u32 {
        self.position.wintrades
    }

    pub fn eventrades(&self) -> u32 {
        self.position.eventrades
    }

    pub fn losstrades(&self) -> u32 {
        self.position.losstrades
    }

    pub fn position_size(&self) -> f64 {
        self.position.size
    }

    pub fn position_avg_price(&self) -> f64 {
        self.position.avg_price
    }

    pub fn open_trades(&self) -> &[Trade] {
        &self.position.open_trades
    }

    /// The inspectable tail of closed trades, oldest first.
    pub fn closed_trades(&self) -> impl Iterator<Item = &Trade> {
        self.position.closed_trades.iter()
    }

    /// Total closes since the start, beyond what the ring retains.
    pub fn closed_trades_count(&self) -> u64 {
        self.position.closed_trades_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;
    use crate::config::{StrategyConfig, SymbolInfo};
    use chrono::{TimeZone, Utc};

    fn mk_bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        let ts = Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap();
        Bar::new(ts, open, high, low, close)
    }

    fn engine_with(config: StrategyConfig) -> Engine {
        Engine::new(config, SymbolInfo::default()).unwrap()
    }

    fn flat_bar(day: u32) -> Bar {
        mk_bar(day, 100.0, 101.0, 99.0, 100.0)
    }

    #[test]
    fn fixed_default_qty_applies() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            default_qty_value: 3.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams::default());
        engine.process_bar(&flat_bar(2));
        assert_eq!(engine.position_size(), 3.0);
    }

    #[test]
    fn cash_default_qty_converts_at_close() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            default_qty_type: QtyType::Cash,
            default_qty_value: 500.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams::default());
        engine.process_bar(&flat_bar(2));
        assert_eq!(engine.position_size(), 5.0);
    }

    #[test]
    fn percent_of_equity_accounts_for_percent_commission() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            default_qty_type: QtyType::PercentOfEquity,
            default_qty_value: 50.0,
            commission_type: CommissionType::Percent,
            commission_value: 1.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams::default());
        engine.process_bar(&flat_bar(2));
        // Target 5000 at price 100 with 1% commission: 5000 / 101 contracts,
        // so value + commission lands on the target.
        let size = engine.position_size();
        assert!((size * 100.0 * 1.01 - 5000.0).abs() < 1e-4);
    }

    #[test]
    fn percent_of_equity_with_cash_per_order_commission() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            default_qty_type: QtyType::PercentOfEquity,
            default_qty_value: 10.0,
            commission_type: CommissionType::CashPerOrder,
            commission_value: 5.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams::default());
        engine.process_bar(&flat_bar(2));
        // (1000 - 5) / 100 contracts.
        assert!((engine.position_size() - 9.95).abs() < 1e-9);
    }

    #[test]
    fn pyramiding_limits_same_direction_entries() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            pyramiding: 1,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("L1", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));
        assert_eq!(engine.position().open_trades.len(), 1);

        // One open same-direction trade at pyramiding=1: refused.
        engine.entry("L2", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(3));
        assert_eq!(engine.position().open_trades.len(), 1);
    }

    #[test]
    fn pyramiding_allows_up_to_limit() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            pyramiding: 2,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("L1", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));
        engine.entry("L2", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(3));
        assert_eq!(engine.position().open_trades.len(), 2);
        assert_eq!(engine.position_size(), 2.0);
    }

    #[test]
    fn margin_scales_position_size() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            margin_long: 0.5,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(3.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));
        assert_eq!(engine.position_size(), 6.0);
    }

    #[test]
    fn same_id_entry_replaces_pending_order() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry(
            "Long",
            Direction::Long,
            EntryParams { qty: Some(1.0), limit: Some(90.0), ..Default::default() },
        );
        engine.entry(
            "Long",
            Direction::Long,
            EntryParams { qty: Some(2.0), limit: Some(95.0), ..Default::default() },
        );
        let order = engine.position().entry_orders.get("Long").unwrap();
        assert_eq!(order.size, 2.0);
        assert_eq!(order.limit, Some(95.0));
        assert_eq!(engine.position().entry_orders.len(), 1);
    }

    #[test]
    fn negative_and_zero_qty_requests_are_dropped() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(-1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());

        engine.exit("X", ExitParams { qty: Some(-1.0), ..Default::default() });
        assert!(engine.position().exit_orders.is_empty());

        // Close while flat is dropped too.
        engine.close("Long", CloseParams::default());
        assert!(engine.position().exit_orders.is_empty());
    }

    #[test]
    fn trail_price_alone_is_ignored() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));

        engine.exit(
            "Trail",
            ExitParams { from_entry: Some("Long".into()), trail_price: Some(102.0), ..Default::default() },
        );
        assert!(engine.position().exit_orders.is_empty());
    }

    #[test]
    fn exit_without_binding_fans_out_over_open_trades() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            pyramiding: 2,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("L1", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));
        engine.entry("L2", Direction::Long, EntryParams { qty: Some(2.0), ..Default::default() });
        engine.process_bar(&flat_bar(3));

        engine.exit("X", ExitParams { stop: Some(95.0), ..Default::default() });
        // Same key: the order bound to the newest trade stands.
        assert_eq!(engine.position().exit_orders.len(), 1);
        let order = engine.position().exit_orders.get("X").unwrap();
        assert_eq!(order.order_id.as_deref(), Some("L2"));
        assert_eq!(order.size, -2.0);
    }

    #[test]
    fn close_percent_closes_that_share() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(10.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));

        engine.close("Long", CloseParams { qty_percent: Some(40.0), ..Default::default() });
        engine.process_bar(&flat_bar(3));
        assert_eq!(engine.position_size(), 6.0);
    }

    #[test]
    fn cancel_removes_pending_orders() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry(
            "Long",
            Direction::Long,
            EntryParams { qty: Some(1.0), limit: Some(90.0), ..Default::default() },
        );
        engine.cancel("Long");
        assert!(engine.position().entry_orders.is_empty());

        engine.entry(
            "Long",
            Direction::Long,
            EntryParams { qty: Some(1.0), limit: Some(90.0), ..Default::default() },
        );
        engine.cancel_all();
        assert!(engine.position().entry_orders.is_empty());
    }

    #[test]
    fn reentry_guard_suppresses_api() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.set_reentry_guard(true);
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert!(engine.position().entry_orders.is_empty());

        engine.set_reentry_guard(false);
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(1.0), ..Default::default() });
        assert_eq!(engine.position().entry_orders.len(), 1);
    }

    #[test]
    fn grossloss_property_includes_open_commission() {
        let mut engine = engine_with(StrategyConfig {
            initial_capital: 10_000.0,
            commission_type: CommissionType::CashPerContract,
            commission_value: 0.5,
            ..Default::default()
        });
        engine.process_bar(&flat_bar(1));
        engine.entry("Long", Direction::Long, EntryParams { qty: Some(2.0), ..Default::default() });
        engine.process_bar(&flat_bar(2));
        // No realized losses yet; the open entry commission shows through.
        assert_eq!(engine.grossloss(), 1.0);
        assert_eq!(engine.grossprofit(), 0.0);
    }
}
