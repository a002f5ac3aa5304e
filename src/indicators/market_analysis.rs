//! Order-flow and market-regime signals
//!
//! These feed the extended entry filter: volume bursts, execution strength,
//! best-level book imbalance and the direction of a reference index.

use serde::Serialize;
use std::collections::VecDeque;

use super::moving_average::trailing_mean;
use crate::models::OrderBookTop;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketRegime {
    Up,
    Down,
    /// Not enough index history to decide
    Unknown,
}

/// Check if volume has spiked above threshold
///
/// Returns true if latest volume > threshold * average of the `lookback`
/// samples before it. False until `lookback + 1` samples exist.
pub fn is_volume_spike(volumes: &VecDeque<f64>, lookback: usize, threshold: f64) -> bool {
    let Some(current_volume) = volumes.back() else {
        return false;
    };

    match trailing_mean(volumes, lookback) {
        Some(avg_volume) => *current_volume > threshold * avg_volume,
        None => false,
    }
}

/// Bid side outweighs the ask side at the best level
pub fn is_bid_heavy(book: Option<OrderBookTop>, ratio: f64) -> bool {
    match book {
        Some(book) => book.bid_qty > book.ask_qty * ratio,
        None => false,
    }
}

/// Classify the reference index against its own trailing average
///
/// Up when the latest index is at least `ratio` times the mean of the
/// `lookback` samples before it.
pub fn market_regime(index_history: &VecDeque<f64>, lookback: usize, ratio: f64) -> MarketRegime {
    let Some(current) = index_history.back() else {
        return MarketRegime::Unknown;
    };

    match trailing_mean(index_history, lookback) {
        Some(avg) if *current >= avg * ratio => MarketRegime::Up,
        Some(_) => MarketRegime::Down,
        None => MarketRegime::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(values: impl IntoIterator<Item = f64>) -> VecDeque<f64> {
        values.into_iter().collect()
    }

    #[test]
    fn test_volume_spike() {
        let mut volumes = series(std::iter::repeat(1000.0).take(30));
        volumes.push_back(1900.0);
        assert!(is_volume_spike(&volumes, 30, 1.8));

        *volumes.back_mut().unwrap() = 1800.0;
        assert!(!is_volume_spike(&volumes, 30, 1.8));
    }

    #[test]
    fn test_volume_spike_needs_history() {
        let volumes = series([1000.0, 1000.0, 9000.0]);
        assert!(!is_volume_spike(&volumes, 30, 1.8));
        assert!(!is_volume_spike(&VecDeque::new(), 30, 1.8));
    }

    #[test]
    fn test_bid_heavy() {
        let book = OrderBookTop {
            bid_qty: 1200.0,
            ask_qty: 1000.0,
        };
        assert!(is_bid_heavy(Some(book), 1.1));

        let book = OrderBookTop {
            bid_qty: 1100.0,
            ask_qty: 1000.0,
        };
        assert!(!is_bid_heavy(Some(book), 1.1));
        assert!(!is_bid_heavy(None, 1.1));
    }

    #[test]
    fn test_market_regime() {
        let mut index = series(std::iter::repeat(300.0).take(20));
        index.push_back(299.8);
        // 299.8 >= 0.999 * 300 = 299.7
        assert_eq!(market_regime(&index, 20, 0.999), MarketRegime::Up);

        *index.back_mut().unwrap() = 299.0;
        assert_eq!(market_regime(&index, 20, 0.999), MarketRegime::Down);

        let short = series([300.0, 301.0]);
        assert_eq!(market_regime(&short, 20, 0.999), MarketRegime::Unknown);
    }
}
