//! Profit and loss of holding one option to a terminal spot.
//!
//! PnL = payoff(S_T) - purchase_price
//!
//! Total functions: any real inputs are accepted, including negative
//! purchase prices (net credit received).

/// Long call held to expiry.
#[inline]
pub fn pnl_call(strike: f64, terminal_spot: f64, purchase_price: f64) -> f64 {
    (terminal_spot - strike).max(0.0) - purchase_price
}

/// Long put held to expiry.
#[inline]
pub fn pnl_put(strike: f64, terminal_spot: f64, purchase_price: f64) -> f64 {
    (strike - terminal_spot).max(0.0) - purchase_price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_itm() {
        assert_eq!(pnl_call(100.0, 120.0, 10.0), 10.0);
    }

    #[test]
    fn test_put_otm_loses_premium() {
        assert_eq!(pnl_put(100.0, 120.0, 10.0), -10.0);
    }

    #[test]
    fn test_at_strike_both_lose_premium() {
        assert_eq!(pnl_call(100.0, 100.0, 4.5), -4.5);
        assert_eq!(pnl_put(100.0, 100.0, 4.5), -4.5);
    }

    #[test]
    fn test_put_itm() {
        assert_eq!(pnl_put(100.0, 70.0, 5.0), 25.0);
        assert_eq!(pnl_call(100.0, 70.0, 5.0), -5.0);
    }

    #[test]
    fn test_negative_purchase_price_accepted() {
        assert_eq!(pnl_call(100.0, 90.0, -2.0), 2.0);
    }
}
