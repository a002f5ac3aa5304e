use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use uuid::Uuid;

/// Default number of events kept
pub const TRADE_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeEventKind {
    Buy,
    Sell,
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub kind: TradeEventKind,
    pub quantity: u32,
    pub price: f64,
    pub message: String,
}

/// Bounded, oldest-first record of what the trader did
#[derive(Debug, Clone)]
pub struct TradeLog {
    events: VecDeque<TradeEvent>,
    capacity: usize,
}

impl TradeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(
        &mut self,
        symbol: &str,
        kind: TradeEventKind,
        quantity: u32,
        price: f64,
        message: impl Into<String>,
    ) {
        if self.capacity == 0 {
            return;
        }

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }

        self.events.push_back(TradeEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            kind,
            quantity,
            price,
            message: message.into(),
        });
    }

    pub fn info(&mut self, symbol: &str, message: impl Into<String>) {
        self.record(symbol, TradeEventKind::Info, 0, 0.0, message);
    }

    pub fn error(&mut self, symbol: &str, message: impl Into<String>) {
        self.record(symbol, TradeEventKind::Error, 0, 0.0, message);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recent `n` events, oldest first
    pub fn recent(&self, n: usize) -> Vec<TradeEvent> {
        let skip = self.events.len().saturating_sub(n);
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradeEvent> {
        self.events.iter()
    }

    pub fn count(&self, kind: TradeEventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

impl Default for TradeLog {
    fn default() -> Self {
        Self::new(TRADE_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_is_bounded_fifo() {
        let mut log = TradeLog::new(3);
        for i in 0..5 {
            log.record("005930", TradeEventKind::Buy, 1, 5000.0 + i as f64, "buy");
        }

        assert_eq!(log.len(), 3);
        let prices: Vec<f64> = log.iter().map(|e| e.price).collect();
        assert_eq!(prices, vec![5002.0, 5003.0, 5004.0]);
    }

    #[test]
    fn test_recent_and_count() {
        let mut log = TradeLog::default();
        log.info("005930", "day started");
        log.record("005930", TradeEventKind::Buy, 1, 5000.0, "initial entry");
        log.record("005930", TradeEventKind::Sell, 1, 5100.0, "take profit");

        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, TradeEventKind::Buy);
        assert_eq!(recent[1].kind, TradeEventKind::Sell);
        assert_eq!(log.recent(10).len(), 3);

        assert_eq!(log.count(TradeEventKind::Buy), 1);
        assert_eq!(log.count(TradeEventKind::Error), 0);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut log = TradeLog::new(0);
        log.info("005930", "ignored");
        assert!(log.is_empty());
    }
}
