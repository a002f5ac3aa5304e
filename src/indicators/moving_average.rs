use std::collections::VecDeque;

/// Simple moving average of the last `period` values
///
/// Returns None if there are fewer than `period` values.
pub fn calculate_sma(values: &VecDeque<f64>, period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Moving average that degrades to the latest value
///
/// Early in the day there is not enough history for a full window; the
/// latest price stands in so that short and long averages compare equal
/// instead of producing a spurious crossover. Empty history yields 0.
pub fn sma_or_last(values: &VecDeque<f64>, period: usize) -> f64 {
    calculate_sma(values, period)
        .or_else(|| values.back().copied())
        .unwrap_or(0.0)
}

/// Mean of the `lookback` values preceding the latest one
pub fn trailing_mean(values: &VecDeque<f64>, lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() < lookback + 1 {
        return None;
    }

    let sum: f64 = values.iter().rev().skip(1).take(lookback).sum();
    Some(sum / lookback as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: &[f64]) -> VecDeque<f64> {
        values.iter().copied().collect()
    }

    #[test]
    fn test_sma() {
        let prices = series(&[100.0, 102.0, 104.0, 106.0, 108.0]);
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
        assert_eq!(calculate_sma(&prices, 2), Some(107.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        let prices = series(&[100.0, 102.0]);
        assert!(calculate_sma(&prices, 5).is_none());
    }

    #[test]
    fn test_sma_or_last_falls_back() {
        let prices = series(&[100.0, 102.0]);
        assert_eq!(sma_or_last(&prices, 5), 102.0);
        assert_eq!(sma_or_last(&VecDeque::new(), 5), 0.0);
    }

    #[test]
    fn test_trailing_mean_excludes_latest() {
        let values = series(&[10.0, 20.0, 30.0, 1000.0]);
        assert_eq!(trailing_mean(&values, 3), Some(20.0));
        assert!(trailing_mean(&values, 4).is_none());
    }
}
