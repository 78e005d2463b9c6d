//! The bar processor.
//!
//! One `process_bar` call per bar: snap the OHLC quadruple to the tick grid,
//! pick the intrabar trajectory (nearest extreme first), run two matching
//! passes over the pending books, then refresh unrealized metrics, equity
//! extremes, and the cumulative stats closed trades snapshot.
//!
//! Hosts drive the engine bar by bar: `process_bar` matches the orders the
//! strategy issued on the previous bar, then the host runs its strategy
//! logic, which issues orders through the API in [`crate::strategy`].

use crate::bar::Bar;
use crate::config::{StrategyConfig, SymbolInfo};
use crate::error::Result;
use crate::order::{Order, OrderKind};
use crate::position::{FillCtx, Position};
use crate::ticks::{price_round, round_to_mintick};

/// Which pending book an order came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BookSlot {
    Entry,
    Exit,
}

/// The strategy engine: configuration, clock, and the position ledger.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) config: StrategyConfig,
    pub(crate) symbol: SymbolInfo,
    pub(crate) position: Position,
    pub(crate) bar_index: usize,
    pub(crate) time_ms: i64,
    pub(crate) prev_close: f64,
    pub(crate) bar_count: usize,
    pub(crate) reentry_guard: bool,
}

impl Engine {
    /// Build an engine from validated host configuration.
    pub fn new(config: StrategyConfig, symbol: SymbolInfo) -> Result<Self> {
        config.validate()?;
        symbol.validate()?;
        Ok(Self {
            position: Position::new(config.initial_capital),
            config,
            symbol,
            bar_index: 0,
            time_ms: 0,
            prev_close: 0.0,
            bar_count: 0,
            reentry_guard: false,
        })
    }

    /// Read access to the ledger.
    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn symbol(&self) -> &SymbolInfo {
        &self.symbol
    }

    /// Index of the bar currently (or last) processed.
    pub fn bar_index(&self) -> usize {
        self.bar_index
    }

    /// Suppress all strategy-API effects while the engine invokes user code
    /// in auxiliary contexts.
    pub fn set_reentry_guard(&mut self, on: bool) {
        self.reentry_guard = on;
    }

    pub(crate) fn fill_ctx(&self) -> FillCtx {
        FillCtx {
            config: self.config,
            symbol: self.symbol,
            bar_index: self.bar_index,
            time_ms: self.time_ms,
        }
    }

    /// Match pending orders against one bar and update all derived metrics.
    pub fn process_bar(&mut self, bar: &Bar) {
        let mintick = self.symbol.mintick;
        self.bar_index = self.bar_count;
        self.bar_count += 1;
        self.time_ms = bar.time_ms();

        let p = &mut self.position;
        p.o = round_to_mintick(bar.open, mintick);
        p.h = round_to_mintick(bar.high, mintick);
        p.l = round_to_mintick(bar.low, mintick);
        p.c = round_to_mintick(bar.close, mintick);
        p.prev_c = round_to_mintick(self.prev_close, mintick);

        p.drawdown_summ = 0.0;
        p.runup_summ = 0.0;
        p.new_closed_trades.clear();

        self.roll_risk_day(bar);

        // Nearest extreme first: open -> high -> low -> close when the high
        // sits closer to the open, else open -> low -> high -> close.
        let up_first = (self.position.h - self.position.o).abs()
            < (self.position.l - self.position.o).abs();

        self.run_pass(up_first, true);
        self.run_pass(up_first, false);

        self.update_open_trades();
        self.update_equity_extremes();
        self.check_risk_triggers();
        self.finalize_closed_trades();

        self.prev_close = self.position.c;
    }

    /// One matching pass over a snapshot of the books, entries first.
    fn run_pass(&mut self, up_first: bool, first: bool) {
        let mut ids: Vec<(BookSlot, String)> = self
            .position
            .entry_orders
            .ids()
            .into_iter()
            .map(|id| (BookSlot::Entry, id))
            .collect();
        ids.extend(
            self.position
                .exit_orders
                .ids()
                .into_iter()
                .map(|id| (BookSlot::Exit, id)),
        );

        for (slot, id) in ids {
            let book = match slot {
                BookSlot::Entry => &mut self.position.entry_orders,
                BookSlot::Exit => &mut self.position.exit_orders,
            };
            let Some((index, mut order)) = book.take(&id) else {
                continue;
            };
            let keep = if first {
                self.process_first_half(&mut order, up_first)
            } else {
                self.process_second_half(&mut order, up_first)
            };
            if keep {
                let book = match slot {
                    BookSlot::Entry => &mut self.position.entry_orders,
                    BookSlot::Exit => &mut self.position.exit_orders,
                };
                book.restore(index, id, order);
            }
        }
    }

    /// First half of the trajectory. Market orders fill here at the previous
    /// close plus adverse slippage and never persist past the bar.
    fn process_first_half(&mut self, order: &mut Order, up_first: bool) -> bool {
        if order.kind == OrderKind::Close && order.order_id.is_some() {
            self.resolve_exit_ticks(order, false);
        }

        if order.is_market() {
            let slip = self.symbol.mintick * f64::from(self.config.slippage) * order.sign();
            let fill_price = self.position.prev_c + slip;
            let (h, l) = if up_first {
                (self.position.o, self.position.l)
            } else {
                (self.position.l, self.position.o)
            };
            let ctx = self.fill_ctx();
            self.position.fill_order(order, fill_price, h, l, &ctx);
            return false;
        }

        let mut consumed = false;
        if up_first {
            consumed |= self.check_high_stop(order);
            consumed |= self.check_high(order);
        } else {
            consumed |= self.check_low_stop(order);
            consumed |= self.check_low(order);
        }
        !consumed
    }

    /// Second half of the trajectory, plus the close-price check for
    /// triggered trailing stops.
    fn process_second_half(&mut self, order: &mut Order, up_first: bool) -> bool {
        if order.kind == OrderKind::Close && order.order_id.is_some() {
            self.resolve_exit_ticks(order, true);
        }

        let mut consumed = false;
        if up_first {
            consumed |= self.check_low_stop(order);
            consumed |= self.check_low(order);
        } else {
            consumed |= self.check_high_stop(order);
            consumed |= self.check_high(order);
        }

        if !consumed && order.trail_triggered && order.stop.is_some() {
            consumed |= self.check_close(order, up_first);
        }

        // Anything still priceless dies with the bar.
        !consumed && !order.is_market()
    }

    /// Resolve deferred tick distances against the matching trade's entry
    /// price. On the second pass only orders that resolved nothing so far
    /// are considered.
    fn resolve_exit_ticks(&mut self, order: &mut Order, only_if_unresolved: bool) {
        if only_if_unresolved {
            let has_ticks = order.profit_ticks.is_some()
                || order.loss_ticks.is_some()
                || order.trail_points_ticks.is_some();
            if !(has_ticks && order.limit.is_none() && order.stop.is_none()) {
                return;
            }
        }
        let Some(order_id) = order.order_id.as_deref() else {
            return;
        };
        let Some(entry_price) = self
            .position
            .open_trades
            .iter()
            .find(|t| t.entry_id == order_id)
            .map(|t| t.entry_price)
        else {
            return;
        };

        let mintick = self.symbol.mintick;
        // A sell-to-close exit takes profit on the way up.
        let dir = if order.size < 0.0 { 1.0 } else { -1.0 };

        if let Some(profit_ticks) = order.profit_ticks {
            if order.limit.is_none() {
                let limit = entry_price + dir * mintick * profit_ticks;
                order.limit = Some(price_round(limit, mintick, dir));
            }
        }
        if let Some(loss_ticks) = order.loss_ticks {
            if order.stop.is_none() {
                let stop = entry_price - dir * mintick * loss_ticks;
                order.stop = Some(price_round(stop, mintick, -dir));
            }
        }
        if let Some(trail_points_ticks) = order.trail_points_ticks {
            if order.trail_price.is_none() {
                let trail = entry_price + dir * mintick * trail_points_ticks;
                order.trail_price = Some(price_round(trail, mintick, dir));
            }
        }
    }

    /// Buy stops against the bar high.
    fn check_high_stop(&mut self, order: &mut Order) -> bool {
        let Some(stop) = order.stop else {
            return false;
        };
        if order.size > 0.0 && stop <= self.position.h {
            let price = stop.max(self.position.o);
            let ctx = self.fill_ctx();
            let l = self.position.l;
            return self.position.fill_order(order, price, price, l, &ctx).consumed;
        }
        false
    }

    /// Sell limits against the bar high, and sell-side trailing management.
    fn check_high(&mut self, order: &mut Order) -> bool {
        let mut consumed = false;
        if let Some(limit) = order.limit {
            if order.size < 0.0 && limit <= self.position.h {
                let price = limit.max(self.position.o);
                let ctx = self.fill_ctx();
                let l = self.position.l;
                consumed = self.position.fill_order(order, price, price, l, &ctx).consumed;
            }
        }

        // A sell-side trailing stop arms above the market and rides the high.
        if let Some(trail_price) = order.trail_price {
            if order.sign() < 0.0 {
                if !order.trail_triggered && self.position.h > trail_price {
                    order.trail_triggered = true;
                }
                if order.trail_triggered {
                    let offset = self.symbol.mintick * order.trail_offset;
                    let candidate =
                        round_to_mintick(self.position.h - offset, self.symbol.mintick);
                    order.stop = Some(match order.stop {
                        Some(stop) => stop.max(candidate),
                        None => candidate,
                    });
                }
            }
        }
        consumed
    }

    /// Sell stops against the bar low.
    fn check_low_stop(&mut self, order: &mut Order) -> bool {
        let Some(stop) = order.stop else {
            return false;
        };
        if order.size < 0.0 && stop >= self.position.l {
            let price = self.position.o.min(stop);
            let ctx = self.fill_ctx();
            let h = self.position.h;
            return self.position.fill_order(order, price, h, price, &ctx).consumed;
        }
        false
    }

    /// Buy limits against the bar low, and buy-side trailing management.
    fn check_low(&mut self, order: &mut Order) -> bool {
        let mut consumed = false;
        if let Some(limit) = order.limit {
            if order.size > 0.0 && limit >= self.position.l {
                let price = self.position.o.min(limit);
                let ctx = self.fill_ctx();
                let h = self.position.h;
                consumed = self.position.fill_order(order, price, h, price, &ctx).consumed;
            }
        }

        // A buy-side trailing stop arms below the market and rides the low.
        if let Some(trail_price) = order.trail_price {
            if order.sign() > 0.0 {
                if !order.trail_triggered && self.position.l < trail_price {
                    order.trail_triggered = true;
                }
                if order.trail_triggered {
                    let offset = self.symbol.mintick * order.trail_offset;
                    let candidate =
                        round_to_mintick(self.position.l + offset, self.symbol.mintick);
                    order.stop = Some(match order.stop {
                        Some(stop) => stop.min(candidate),
                        None => candidate,
                    });
                }
            }
        }
        consumed
    }

    /// Close-price check for a triggered trailing stop: the ratcheted level
    /// fills against the final leg of the trajectory.
    fn check_close(&mut self, order: &mut Order, up_first: bool) -> bool {
        let Some(stop) = order.stop else {
            return false;
        };
        let ctx = self.fill_ctx();
        if up_first && stop <= self.position.c {
            let l = self.position.l;
            self.position.fill_order(order, stop, stop, l, &ctx).consumed
        } else if stop >= self.position.c {
            let h = self.position.h;
            self.position.fill_order(order, stop, h, stop, &ctx).consumed
        } else {
            false
        }
    }

    /// Unrealized marks and per-trade excursions for still-open trades.
    fn update_open_trades(&mut self) {
        let p = &mut self.position;
        if p.open_trades.is_empty() {
            return;
        }
        p.openprofit = p.size * (p.c - p.avg_price);

        let (c, h, l, avg_price) = (p.c, p.h, p.l, p.avg_price);
        for trade in &mut p.open_trades {
            // Mark both legs' commission for the round-trip estimate.
            trade.profit = trade.size * (c - trade.entry_price) - 2.0 * trade.commission;

            let hprofit = trade.size * (h - avg_price) - trade.commission;
            let lprofit = trade.size * (l - avg_price) - trade.commission;
            let drawdown = -hprofit.min(lprofit).min(0.0);
            trade.max_drawdown = trade.max_drawdown.max(drawdown);
            let runup = hprofit.max(lprofit).max(0.0);
            trade.max_runup = trade.max_runup.max(runup);

            let trade_value = trade.entry_value();
            if trade_value > 0.0 {
                let dd_pct = if drawdown > 0.0 {
                    drawdown / trade_value * 100.0
                } else {
                    0.0
                };
                trade.max_drawdown_percent = trade.max_drawdown_percent.max(dd_pct);
                let ru_pct = if runup > 0.0 {
                    runup / trade_value * 100.0
                } else {
                    0.0
                };
                trade.max_runup_percent = trade.max_runup_percent.max(ru_pct);
            }

            p.drawdown_summ += drawdown;
            p.runup_summ += runup;
        }
    }

    /// Fold the bar's excursion sums into the global extremes.
    fn update_equity_extremes(&mut self) {
        let p = &mut self.position;
        if p.drawdown_summ != 0.0 || p.runup_summ != 0.0 {
            p.max_drawdown = p
                .max_drawdown
                .max(p.max_equity - p.entry_equity + p.drawdown_summ);
            p.max_runup = p.max_runup.max(p.entry_equity - p.min_equity + p.runup_summ);
        }
    }

    /// Cumulative stats for trades closed this bar, mirrored back into the
    /// ring so both views agree.
    fn finalize_closed_trades(&mut self) {
        if self.position.new_closed_trades.is_empty() {
            return;
        }
        let initial_capital = self.config.initial_capital;
        let mut new_closed = std::mem::take(&mut self.position.new_closed_trades);

        for closed in &mut new_closed {
            let p = &mut self.position;
            let previous_cum_profit = p.cum_profit - closed.profit;

            closed.max_drawdown = -closed.profit.min(-closed.max_drawdown).min(0.0);
            closed.max_runup = closed.profit.max(closed.max_runup).max(0.0);

            p.cum_profit = p.equity() - initial_capital - p.openprofit;
            closed.cum_profit = p.cum_profit;
            closed.cum_max_drawdown = p.max_drawdown;
            closed.cum_max_runup = p.max_runup;

            if closed.exit_bar_index == Some(closed.entry_bar_index) {
                // Same-bar round trip: intrabar extremes cannot exceed the
                // realized result.
                let hprofit = closed.size * (p.h - closed.entry_price) - closed.commission;
                let lprofit = closed.size * (p.l - closed.entry_price) - closed.commission;
                closed.max_drawdown = (-hprofit.min(lprofit).min(0.0)).min(closed.profit);
                closed.max_runup = hprofit.max(lprofit).max(0.0).min(closed.profit);
            }

            let trade_value = closed.entry_value();
            if trade_value > 0.0 {
                let dd_pct = if closed.max_drawdown > 0.0 {
                    closed.max_drawdown / trade_value * 100.0
                } else {
                    0.0
                };
                closed.max_drawdown_percent = closed.max_drawdown_percent.max(dd_pct);
                let ru_pct = if closed.max_runup > 0.0 {
                    closed.max_runup / trade_value * 100.0
                } else {
                    0.0
                };
                closed.max_runup_percent = closed.max_runup_percent.max(ru_pct);
            }

            let denominator = initial_capital + previous_cum_profit;
            closed.cum_profit_percent = if denominator == 0.0 {
                0.0
            } else {
                closed.profit / denominator * 100.0
            };
            closed.profit_percent = if trade_value == 0.0 {
                0.0
            } else {
                closed.profit / trade_value * 100.0
            };

            // Anchor subsequent drawdown accounting past this realization.
            p.entry_equity += closed.profit;
        }

        // The ring's tail holds the same trades; overwrite with the
        // finalized values (eviction may have dropped leading ones).
        let ring_len = self.position.closed_trades.len();
        let n = new_closed.len().min(ring_len);
        let offset = ring_len - n;
        let skip = new_closed.len() - n;
        for (i, closed) in new_closed.iter().skip(skip).enumerate() {
            self.position.closed_trades[offset + i] = closed.clone();
        }
        self.position.new_closed_trades = new_closed;
    }
}
