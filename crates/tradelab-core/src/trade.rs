//! Open position legs and closed trades.

use serde::{Deserialize, Serialize};

use crate::ticks::sign_of;

/// One position leg.
///
/// Lives in the ledger's open list while `size` is nonzero, and moves to the
/// closed ring as a copy with exit context populated. A partial close shrinks
/// the open leg toward zero and rescales its running allocations by the
/// retained fraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Signed size; positive is long.
    pub size: f64,

    pub entry_id: String,
    pub entry_bar_index: usize,
    /// Entry time, milliseconds since the Unix epoch.
    pub entry_time: i64,
    pub entry_price: f64,
    pub entry_comment: String,
    /// Equity before this entry's commission was debited.
    pub entry_equity: f64,

    pub exit_id: String,
    pub exit_bar_index: Option<usize>,
    pub exit_time: Option<i64>,
    pub exit_price: Option<f64>,
    pub exit_comment: String,
    pub exit_equity: Option<f64>,

    /// Commission allocated to this leg so far.
    pub commission: f64,

    /// Per-trade extremes in account currency and percent of entry notional.
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub max_runup: f64,
    pub max_runup_percent: f64,

    /// Realized on close; unrealized round-trip mark while open.
    pub profit: f64,
    pub profit_percent: f64,

    // Snapshotted from the ledger at the moment of close.
    pub cum_profit: f64,
    pub cum_profit_percent: f64,
    pub cum_max_drawdown: f64,
    pub cum_max_runup: f64,
}

impl Trade {
    /// Open a new leg; exit context stays empty until a close fills.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        entry_id: String,
        size: f64,
        entry_bar_index: usize,
        entry_time: i64,
        entry_price: f64,
        commission: f64,
        entry_comment: String,
        entry_equity: f64,
    ) -> Self {
        Self {
            size,
            entry_id,
            entry_bar_index,
            entry_time,
            entry_price,
            entry_comment,
            entry_equity,
            exit_id: String::new(),
            exit_bar_index: None,
            exit_time: None,
            exit_price: None,
            exit_comment: String::new(),
            exit_equity: None,
            commission,
            max_drawdown: 0.0,
            max_drawdown_percent: 0.0,
            max_runup: 0.0,
            max_runup_percent: 0.0,
            profit: 0.0,
            profit_percent: 0.0,
            cum_profit: 0.0,
            cum_profit_percent: 0.0,
            cum_max_drawdown: 0.0,
            cum_max_runup: 0.0,
        }
    }

    /// Direction of the leg: -1, 0 or +1.
    pub fn sign(&self) -> f64 {
        sign_of(self.size)
    }

    pub fn is_closed(&self) -> bool {
        self.exit_bar_index.is_some()
    }

    /// Notional at entry: `|size| * entry_price`.
    pub fn entry_value(&self) -> f64 {
        self.size.abs() * self.entry_price
    }
}
