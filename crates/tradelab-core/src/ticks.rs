//! Tick-grid and lot-step rounding.
//!
//! Prices live on the symbol's tick grid and sizes on the exchange lot step.
//! Price rounding is directional so entry limits land on the conservative
//! side of the grid; size rounding floors on a decimal representation so
//! repeated entry/exit pairs cannot drift apart in binary floating point.

use rust_decimal::prelude::*;

/// Snap a price to the nearest tick.
pub fn round_to_mintick(price: f64, mintick: f64) -> f64 {
    (price / mintick).round() * mintick
}

/// Round a price onto the tick grid in the given direction.
///
/// The ratio `price / mintick` is rounded to 5 decimals before truncation so
/// values a hair under a grid line still count as on it. `dir < 0` rounds
/// toward negative infinity; any other direction rounds up unless the price
/// is already on the grid.
pub fn price_round(price: f64, mintick: f64, dir: f64) -> f64 {
    let ratio = (price / mintick * 100_000.0).round() / 100_000.0;
    let k = ratio.trunc();
    if dir < 0.0 || ratio == k {
        k * mintick
    } else {
        (k + 1.0) * mintick
    }
}

/// Floor a signed quantity to the exchange lot step.
///
/// Decimal arithmetic end to end: `floor(|qty|·rf·10)·0.1`, truncated back to
/// an integer number of steps and divided by `rf`, with the sign reapplied.
pub fn size_round(qty: f64, size_round_factor: f64) -> f64 {
    let (Some(qty_d), Some(rf)) = (Decimal::from_f64(qty), Decimal::from_f64(size_round_factor))
    else {
        return 0.0;
    };
    if rf.is_zero() {
        return 0.0;
    }
    let sign = if qty < 0.0 {
        Decimal::NEGATIVE_ONE
    } else {
        Decimal::ONE
    };
    let qrf = (qty_d.abs() * rf * Decimal::TEN).floor() * Decimal::new(1, 1);
    (sign * (qrf.trunc() / rf)).to_f64().unwrap_or(0.0)
}

/// True once `size` has collapsed within one lot step of zero.
pub fn size_is_zero(size: f64, size_round_factor: f64) -> bool {
    size.abs() <= 1.0 / size_round_factor
}

/// Sign of a quantity: -1, 0 or +1.
pub fn sign_of(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else if value > 0.0 {
        1.0
    } else {
        -1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_to_mintick_snaps_to_grid() {
        assert_eq!(round_to_mintick(100.004, 0.01), 100.0);
        assert_eq!(round_to_mintick(100.006, 0.01), 100.01);
        assert_eq!(round_to_mintick(99.996, 0.01), 100.0);
    }

    #[test]
    fn price_round_down_floors() {
        assert_eq!(price_round(100.019, 0.01, -1.0), 100.01);
        assert_eq!(price_round(100.01, 0.01, -1.0), 100.01);
    }

    #[test]
    fn price_round_up_keeps_exact_values() {
        // Already on the grid: no bump upward.
        assert_eq!(price_round(100.01, 0.01, 1.0), 100.01);
        assert_eq!(price_round(100.011, 0.01, 1.0), 100.02);
    }

    #[test]
    fn price_round_is_directional() {
        let p = 123.4567;
        assert!(price_round(p, 0.01, 1.0) >= p - 1e-9);
        assert!(price_round(p, 0.01, -1.0) <= p + 1e-9);
    }

    #[test]
    fn size_round_floors_to_lot_step() {
        assert_eq!(size_round(1.23456789012, 1e8), 1.23456789);
        assert_eq!(size_round(-1.23456789012, 1e8), -1.23456789);
        assert_eq!(size_round(10.0, 1e8), 10.0);
    }

    #[test]
    fn size_round_whole_lots() {
        assert_eq!(size_round(2.7, 1.0), 2.0);
        assert_eq!(size_round(-2.7, 1.0), -2.0);
    }

    #[test]
    fn size_is_zero_tolerance() {
        assert!(size_is_zero(5e-9, 1e8));
        assert!(!size_is_zero(2e-8, 1e8));
    }

    #[test]
    fn sign_of_values() {
        assert_eq!(sign_of(3.5), 1.0);
        assert_eq!(sign_of(-0.1), -1.0);
        assert_eq!(sign_of(0.0), 0.0);
    }
}
