//! Trade tape export.
//!
//! One row per trade with every attribute. Timestamps serialize as UTC
//! datetimes from their millisecond epoch, floats round to 10 decimals, and
//! unset exit context serializes as empty cells.

use std::path::Path;

use chrono::{DateTime, SecondsFormat};

use crate::error::{Result, TradeLabError};
use crate::trade::Trade;

const HEADER: [&str; 24] = [
    "size",
    "entry_id",
    "entry_bar_index",
    "entry_time",
    "entry_price",
    "entry_comment",
    "entry_equity",
    "exit_id",
    "exit_bar_index",
    "exit_time",
    "exit_price",
    "exit_comment",
    "exit_equity",
    "commission",
    "max_drawdown",
    "max_drawdown_percent",
    "max_runup",
    "max_runup_percent",
    "profit",
    "profit_percent",
    "cum_profit",
    "cum_profit_percent",
    "cum_max_drawdown",
    "cum_max_runup",
];

/// Render trades as a CSV document.
pub fn trades_to_csv(trades: &[Trade]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(HEADER)?;

    for trade in trades {
        writer.write_record([
            num(trade.size),
            trade.entry_id.clone(),
            trade.entry_bar_index.to_string(),
            time(trade.entry_time),
            num(trade.entry_price),
            trade.entry_comment.clone(),
            num(trade.entry_equity),
            trade.exit_id.clone(),
            trade.exit_bar_index.map(|i| i.to_string()).unwrap_or_default(),
            trade.exit_time.map(time).unwrap_or_default(),
            trade.exit_price.map(num).unwrap_or_default(),
            trade.exit_comment.clone(),
            trade.exit_equity.map(num).unwrap_or_default(),
            num(trade.commission),
            num(trade.max_drawdown),
            num(trade.max_drawdown_percent),
            num(trade.max_runup),
            num(trade.max_runup_percent),
            num(trade.profit),
            num(trade.profit_percent),
            num(trade.cum_profit),
            num(trade.cum_profit_percent),
            num(trade.cum_max_drawdown),
            num(trade.cum_max_runup),
        ])?;
    }

    let data = writer
        .into_inner()
        .map_err(|e| TradeLabError::Io(e.into_error()))?;
    Ok(String::from_utf8(data)?)
}

/// Write the trade tape to a file.
pub fn write_trades_csv(path: impl AsRef<Path>, trades: &[Trade]) -> Result<()> {
    let csv = trades_to_csv(trades)?;
    std::fs::write(path, csv)?;
    Ok(())
}

/// Render trades as pretty JSON.
pub fn trades_to_json(trades: &[Trade]) -> Result<String> {
    Ok(serde_json::to_string_pretty(trades)?)
}

fn num(value: f64) -> String {
    let rounded = (value * 1e10).round() / 1e10;
    rounded.to_string()
}

fn time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
