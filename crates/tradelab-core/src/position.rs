//! The position ledger.
//!
//! Holds pending orders, open trades, the closed-trade ring, realized
//! counters, and equity extrema, and performs the actual fills: reversal
//! splitting, FIFO close walks with partial-fill rescaling, and commission
//! realization under the three commission models.

use std::collections::VecDeque;

use tracing::debug;

use crate::book::PendingOrders;
use crate::config::{CommissionType, StrategyConfig, SymbolInfo};
use crate::order::{Order, OrderKind};
use crate::risk::RiskState;
use crate::ticks::sign_of;
use crate::trade::Trade;

/// Closed trades kept inspectable; older ones evict silently.
pub const CLOSED_TRADE_CAPACITY: usize = 9000;

/// Per-bar constants threaded through the fill paths.
#[derive(Debug, Clone, Copy)]
pub struct FillCtx {
    pub config: StrategyConfig,
    pub symbol: SymbolInfo,
    pub bar_index: usize,
    pub time_ms: i64,
}

/// What a fill did to the order that produced it.
#[derive(Debug, Clone, Copy, Default)]
pub struct FillResult {
    /// The position changed sides (a reversal split ran to completion).
    pub side_changed: bool,
    /// The order is finished and must not return to its book.
    pub consumed: bool,
}

/// The position ledger: one per strategy instance.
#[derive(Debug, Clone)]
pub struct Position {
    /// Pending entry orders keyed by order id.
    pub entry_orders: PendingOrders,
    /// Pending exit orders keyed by exit id.
    pub exit_orders: PendingOrders,

    /// Open trades in entry order; closes drain the oldest first.
    pub open_trades: Vec<Trade>,
    /// Ring of the most recent closed trades.
    pub closed_trades: VecDeque<Trade>,
    /// Total closes since the start; not capped by the ring.
    pub closed_trades_count: u64,
    /// Trades closed during the current bar.
    pub new_closed_trades: Vec<Trade>,

    pub wintrades: u32,
    pub eventrades: u32,
    pub losstrades: u32,

    pub netprofit: f64,
    pub openprofit: f64,
    pub grossprofit: f64,
    pub grossloss: f64,
    pub cum_profit: f64,

    /// Net position size; exactly the sum of open trade sizes.
    pub size: f64,
    pub sign: f64,
    pub avg_price: f64,
    /// Sum of `|size| * entry_price` over open trades.
    pub entry_summ: f64,
    /// Commission carried by still-open trades.
    pub open_commission: f64,

    /// Equity when the current position opened.
    pub entry_equity: f64,
    pub max_equity: f64,
    pub min_equity: f64,
    /// Per-bar excursion scratch, rebuilt every bar.
    pub drawdown_summ: f64,
    pub runup_summ: f64,
    pub max_drawdown: f64,
    pub max_runup: f64,

    // Current bar snapped to the tick grid, plus the previous close.
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub prev_c: f64,

    pub risk: RiskState,

    initial_capital: f64,
}

impl Position {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            entry_orders: PendingOrders::default(),
            exit_orders: PendingOrders::default(),
            open_trades: Vec::new(),
            closed_trades: VecDeque::with_capacity(CLOSED_TRADE_CAPACITY),
            closed_trades_count: 0,
            new_closed_trades: Vec::new(),
            wintrades: 0,
            eventrades: 0,
            losstrades: 0,
            netprofit: 0.0,
            openprofit: 0.0,
            grossprofit: 0.0,
            grossloss: 0.0,
            cum_profit: 0.0,
            size: 0.0,
            sign: 0.0,
            avg_price: 0.0,
            entry_summ: 0.0,
            open_commission: 0.0,
            entry_equity: 0.0,
            max_equity: f64::NEG_INFINITY,
            min_equity: f64::INFINITY,
            drawdown_summ: 0.0,
            runup_summ: 0.0,
            max_drawdown: 0.0,
            max_runup: 0.0,
            o: 0.0,
            h: 0.0,
            l: 0.0,
            c: 0.0,
            prev_c: 0.0,
            risk: RiskState::default(),
            initial_capital,
        }
    }

    /// Current equity: initial capital plus realized and unrealized P&L.
    pub fn equity(&self) -> f64 {
        self.initial_capital + self.netprofit + self.openprofit
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    /// Fill an order at `price`; `h`/`l` are the extremes the intrabar
    /// traversal witnesses after the fill moment, used to attribute per-bar
    /// excursions.
    ///
    /// A fill that would flip the position side splits in two: a closing leg
    /// that drains every open trade (so the new side starts from a clean
    /// average entry price) and an opening leg for the remainder. Exit orders
    /// never reverse; they clamp to a flat exit instead.
    pub fn fill_order(&mut self, order: &mut Order, price: f64, h: f64, l: f64, ctx: &FillCtx) -> FillResult {
        let tol = 1.0 / ctx.symbol.size_round_factor;
        let mut new_size = self.size + order.size;
        if new_size != 0.0 && new_size.abs() <= tol {
            new_size = 0.0;
        }
        let new_sign = sign_of(new_size);

        if self.size != 0.0 && new_sign != self.sign && new_size != 0.0 {
            if order.kind == OrderKind::Close {
                order.size = -self.size;
                let fill = self.fill(order, price, h, l, ctx);
                return FillResult {
                    side_changed: false,
                    consumed: fill.consumed,
                };
            }

            // Closing leg: no order id, so it drains every open trade; the
            // exit id echoes the entry order that caused the reversal.
            let mut closing = order.clone();
            closing.kind = OrderKind::Close;
            closing.size = -self.size;
            closing.order_id = None;
            closing.exit_id = order.order_id.clone();
            self.fill(&mut closing, price, h, l, ctx);

            if let Some(allowed) = self.risk.allowed_direction {
                if allowed.sign() != new_sign {
                    // Restricted direction: the reversal degrades to an exit.
                    return FillResult {
                        side_changed: false,
                        consumed: true,
                    };
                }
            }

            order.size = new_size;
            self.fill(order, price, h, l, ctx);
            FillResult {
                side_changed: true,
                consumed: true,
            }
        } else {
            self.fill(order, price, h, l, ctx)
        }
    }

    /// The single-sided fill path: either a close walk over open trades or a
    /// new leg.
    fn fill(&mut self, order: &mut Order, price: f64, h: f64, l: f64, ctx: &FillCtx) -> FillResult {
        let commission_type = ctx.config.commission_type;
        let commission_value = ctx.config.commission_value;
        let tol = 1.0 / ctx.symbol.size_round_factor;

        let mut result = FillResult::default();

        if self.size != 0.0 && order.kind != OrderKind::Entry && order.sign() != self.sign {
            // Close walk: drain matching trades oldest-first.
            let mut new_closed: Vec<Trade> = Vec::new();
            let mut closed_trade_size = 0.0;
            let mut any_closed = false;

            let mut retained: Vec<Trade> = Vec::with_capacity(self.open_trades.len());
            let open_trades = std::mem::take(&mut self.open_trades);
            for mut trade in open_trades {
                let matches = order
                    .order_id
                    .as_deref()
                    .map_or(true, |id| id == trade.entry_id);
                if order.size == 0.0 || !matches {
                    retained.push(trade);
                    continue;
                }
                any_closed = true;

                let mut size = if order.size.abs() <= trade.size.abs() {
                    order.size
                } else {
                    -trade.size
                };
                let pnl = -size * (price - trade.entry_price);

                let mut closed = trade.clone();
                let ratio = 1.0 + size / closed.size;
                if closed.size != -size {
                    // Partial close: the retained leg keeps `ratio` of the
                    // running allocations, the closed slice the rest. Percent
                    // commission scales with the closing notional.
                    trade.commission *= ratio;
                    if commission_type == CommissionType::Percent {
                        closed.commission *= (1.0 - ratio) * commission_value * 0.01 * price;
                    } else {
                        closed.commission *= 1.0 - ratio;
                    }
                    trade.max_drawdown *= ratio;
                    trade.max_runup *= ratio;
                    closed.max_drawdown *= 1.0 - ratio;
                    closed.max_runup *= 1.0 - ratio;
                }

                // Excursion P&L witnessed after the fill moment.
                let hprofit = -size * (h - closed.entry_price) - closed.commission;
                let lprofit = -size * (l - closed.entry_price) - closed.commission;
                self.drawdown_summ += -hprofit.min(lprofit).min(0.0);
                self.runup_summ += hprofit.max(lprofit).max(0.0);

                closed.size = -size;
                closed.exit_id = order.exit_id.clone().unwrap_or_default();
                closed.exit_bar_index = Some(ctx.bar_index);
                closed.exit_time = Some(ctx.time_ms);
                closed.exit_price = Some(price);
                closed.profit = pnl;
                if let Some(comment) = &order.comment {
                    closed.exit_comment = comment.clone();
                }

                // The slice's entry-leg commission leaves the open bucket.
                self.open_commission -= closed.commission;

                match commission_type {
                    CommissionType::CashPerOrder => {
                        // Flat per order: realized once after the walk and
                        // allocated across the closed slices.
                        closed_trade_size += size.abs();
                    }
                    CommissionType::Percent | CommissionType::CashPerContract => {
                        let mut commission = size.abs() * commission_value;
                        if commission_type == CommissionType::Percent {
                            commission *= 0.01 * price;
                        }
                        closed.commission += commission;
                        self.netprofit -= commission;
                        closed.profit -= closed.commission;
                    }
                }

                let entry_value = closed.size.abs() * closed.entry_price;
                closed.profit_percent = if entry_value == 0.0 {
                    0.0
                } else {
                    pnl / entry_value * 100.0
                };

                self.netprofit += pnl;

                self.size += size;
                if self.size != 0.0 && self.size.abs() <= tol {
                    // Absorb the rounding residue so trade and order
                    // bookkeeping stay consistent.
                    size -= self.size;
                    self.size = 0.0;
                }
                self.sign = sign_of(self.size);
                trade.size += size;
                order.size -= size;

                if closed.profit == 0.0 {
                    self.eventrades += 1;
                } else if closed.profit > 0.0 {
                    self.wintrades += 1;
                    self.grossprofit += closed.profit;
                } else {
                    self.losstrades += 1;
                    self.grossloss -= closed.profit;
                }

                if self.size != 0.0 {
                    self.entry_summ -= closed.entry_price * closed.size.abs();
                    self.avg_price = self.entry_summ / self.size.abs();
                    self.openprofit = self.size * (self.c - self.avg_price);
                } else {
                    self.avg_price = 0.0;
                    self.openprofit = 0.0;
                }

                closed.exit_equity = Some(self.equity());

                debug!(
                    exit_id = %closed.exit_id,
                    size = closed.size,
                    price,
                    profit = closed.profit,
                    "trade closed"
                );

                let fully_drained = trade.size == 0.0;
                if !fully_drained && pnl > 0.0 {
                    // Keep the open-excursion accounting centered after a
                    // profitable partial close: the commission splits between
                    // the drawdown bucket and the equity anchor.
                    self.runup_summ -= closed.commission;
                    self.drawdown_summ += closed.commission / 2.0;
                    self.entry_equity += closed.commission / 2.0;
                }

                new_closed.push(closed);
                if !fully_drained {
                    retained.push(trade);
                }
            }
            self.open_trades = retained;

            if any_closed {
                if let Some(exit_id) = &order.exit_id {
                    self.exit_orders.remove(exit_id);
                }
                if commission_type == CommissionType::CashPerOrder {
                    self.netprofit -= commission_value;
                    for closed in &mut new_closed {
                        closed.commission += commission_value * closed.size.abs() / closed_trade_size;
                    }
                }
                self.risk.intraday_filled_orders += 1;
                result.consumed = true;
            }

            for closed in new_closed {
                if self.closed_trades.len() == CLOSED_TRADE_CAPACITY {
                    self.closed_trades.pop_front();
                }
                self.closed_trades.push_back(closed.clone());
                self.closed_trades_count += 1;
                self.new_closed_trades.push(closed);
            }
        } else if order.kind != OrderKind::Close {
            // New leg.
            let commission = match commission_type {
                CommissionType::CashPerOrder => commission_value,
                CommissionType::Percent => order.size.abs() * commission_value * 0.01 * price,
                CommissionType::CashPerContract => order.size.abs() * commission_value,
            };

            let before_equity = self.equity();
            self.netprofit -= commission;

            let entry_equity = self.equity();
            if self.open_trades.is_empty() {
                self.max_equity = self.max_equity.max(entry_equity);
                self.min_equity = self.min_equity.min(entry_equity);
                self.entry_equity = entry_equity;
            }

            let trade = Trade::open(
                order.order_id.clone().unwrap_or_default(),
                order.size,
                ctx.bar_index,
                ctx.time_ms,
                price,
                commission,
                order.comment.clone().unwrap_or_default(),
                before_equity,
            );
            debug!(entry_id = %trade.entry_id, size = trade.size, price, "trade opened");
            self.open_trades.push(trade);
            self.size += order.size;
            self.sign = sign_of(self.size);

            self.entry_summ += price * order.size.abs();
            self.avg_price = if self.size == 0.0 {
                0.0
            } else {
                self.entry_summ / self.size.abs()
            };
            self.openprofit = self.size * (self.c - self.avg_price);
            self.open_commission += commission;

            // Detached orders have no book entry left; drop any sibling that
            // still shares the key.
            if order.kind == OrderKind::Entry {
                if let Some(id) = &order.order_id {
                    self.entry_orders.remove(id);
                }
            } else if let Some(exit_id) = &order.exit_id {
                self.exit_orders.remove(exit_id);
            }

            self.risk.intraday_filled_orders += 1;
            result.consumed = true;
        }

        if self.open_trades.is_empty() {
            self.entry_summ = 0.0;
            self.avg_price = 0.0;
            self.openprofit = 0.0;
            self.open_commission = 0.0;
        }

        result
    }
}
