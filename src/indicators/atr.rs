//! Average True Range (ATR) building blocks
//!
//! True Range is the greatest of:
//! - High - Low
//! - Abs(High - Reference)
//! - Abs(Low - Reference)
//!
//! Intraday the high/low are the running extrema of the day and the
//! reference is the previous observed price. The ATR itself is the simple
//! mean of a bounded window of true ranges.

use std::collections::VecDeque;

/// Default true-range window
pub const ATR_PERIOD: usize = 14;

pub fn true_range(high: f64, low: f64, reference: f64) -> f64 {
    (high - low)
        .max((high - reference).abs())
        .max((low - reference).abs())
}

/// Simple mean of the stored true ranges, 0 when empty
pub fn average_true_range(true_ranges: &VecDeque<f64>) -> f64 {
    if true_ranges.is_empty() {
        return 0.0;
    }
    true_ranges.iter().sum::<f64>() / true_ranges.len() as f64
}
