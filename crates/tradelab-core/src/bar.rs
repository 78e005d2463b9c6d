//! Bar (OHLC) data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticks::round_to_mintick;

/// A single OHLC bar representing price action over a time period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Timestamp (start of bar period, UTC)
    pub ts: DateTime<Utc>,

    /// Opening price
    pub open: f64,

    /// Highest price during period
    pub high: f64,

    /// Lowest price during period
    pub low: f64,

    /// Closing price
    pub close: f64,
}

impl Bar {
    /// Create a new bar with all fields.
    pub fn new(ts: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
        }
    }

    /// Bar timestamp as milliseconds since the Unix epoch.
    pub fn time_ms(&self) -> i64 {
        self.ts.timestamp_millis()
    }

    /// Returns the bar's range (high - low).
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Returns a copy with all four prices snapped to the tick grid.
    pub fn snapped(&self, mintick: f64) -> Bar {
        Bar {
            ts: self.ts,
            open: round_to_mintick(self.open, mintick),
            high: round_to_mintick(self.high, mintick),
            low: round_to_mintick(self.low, mintick),
            close: round_to_mintick(self.close, mintick),
        }
    }
}
