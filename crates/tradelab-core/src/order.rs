//! Pending order instructions.

use serde::{Deserialize, Serialize};

use crate::config::OcaType;
use crate::ticks::sign_of;

/// Whether an order opens/adds to a position or closes part of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Entry,
    Close,
}

/// One pending instruction against the ledger.
///
/// `size` is signed (positive buys) and doubles as the remaining unfilled
/// quantity. Close orders are keyed by `exit_id`; an absent `order_id` on a
/// Close means "match any open trade on the opposing side".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: Option<String>,
    pub size: f64,
    pub kind: OrderKind,
    pub exit_id: Option<String>,

    pub limit: Option<f64>,
    pub stop: Option<f64>,

    /// Trailing-stop activation level.
    pub trail_price: Option<f64>,
    /// Trailing-stop distance from the extreme, in ticks.
    pub trail_offset: f64,
    /// Latched once the bar extreme crosses `trail_price`.
    pub trail_triggered: bool,

    // Deferred distances in ticks, resolved once the entry price is known.
    pub profit_ticks: Option<f64>,
    pub loss_ticks: Option<f64>,
    pub trail_points_ticks: Option<f64>,

    pub oca_name: Option<String>,
    pub oca_type: Option<OcaType>,
    pub comment: Option<String>,
    pub alert_message: Option<String>,
}

impl Order {
    /// A bare order; price levels and metadata are set field by field.
    pub fn new(order_id: Option<String>, size: f64, kind: OrderKind) -> Self {
        Self {
            order_id,
            size,
            kind,
            exit_id: None,
            limit: None,
            stop: None,
            trail_price: None,
            trail_offset: 0.0,
            trail_triggered: false,
            profit_ticks: None,
            loss_ticks: None,
            trail_points_ticks: None,
            oca_name: None,
            oca_type: None,
            comment: None,
            alert_message: None,
        }
    }

    /// Direction of the remaining quantity: -1, 0 or +1.
    pub fn sign(&self) -> f64 {
        sign_of(self.size)
    }

    /// True while no price trigger is attached.
    ///
    /// Deferred tick distances may later resolve into a limit or stop, at
    /// which point the order stops being a market order.
    pub fn is_market(&self) -> bool {
        self.limit.is_none() && self.stop.is_none() && self.trail_price.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_status_is_derived() {
        let mut order = Order::new(Some("Long".into()), -1.0, OrderKind::Close);
        assert!(order.is_market());

        // Resolving a deferred take-profit distance attaches a limit.
        order.limit = Some(101.0);
        assert!(!order.is_market());
    }

    #[test]
    fn sign_follows_remaining_size() {
        let mut order = Order::new(Some("Long".into()), 4.0, OrderKind::Entry);
        assert_eq!(order.sign(), 1.0);
        order.size = 0.0;
        assert_eq!(order.sign(), 0.0);
    }
}
