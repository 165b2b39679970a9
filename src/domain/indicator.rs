//! Lookback indicators over a close-price history.
//!
//! Every function takes the history up to and including the current bar and
//! returns `None` while the history is shorter than the warmup.

/// Simple moving average of the last `period` closes.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Fractional change over `period` bars: `close[t] / close[t - period] - 1`.
/// A zero reference close yields 0.
pub fn percent_change(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() <= period {
        return None;
    }
    let current = closes[closes.len() - 1];
    let reference = closes[closes.len() - 1 - period];
    if reference == 0.0 {
        return Some(0.0);
    }
    Some(current / reference - 1.0)
}

/// Bars needed before [`sma`] is valid.
pub fn sma_warmup(period: usize) -> usize {
    period
}

/// Bars needed before [`percent_change`] is valid.
pub fn percent_change_warmup(period: usize) -> usize {
    period + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_is_none() {
        assert_eq!(sma(&[1.0, 2.0], 3), None);
        assert_eq!(sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn sma_uses_trailing_window() {
        let closes = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(sma(&closes, 3).unwrap(), 4.0);
        assert_relative_eq!(sma(&closes, 5).unwrap(), 3.0);
    }

    #[test]
    fn percent_change_basic() {
        let closes = [100.0, 105.0, 110.0];
        assert_relative_eq!(percent_change(&closes, 2).unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(
            percent_change(&closes, 1).unwrap(),
            110.0 / 105.0 - 1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn percent_change_needs_period_plus_one() {
        assert_eq!(percent_change(&[100.0, 105.0], 2), None);
        assert_eq!(percent_change_warmup(2), 3);
    }

    #[test]
    fn percent_change_zero_reference() {
        assert_eq!(percent_change(&[0.0, 5.0], 1), Some(0.0));
    }
}
