use serde::Serialize;

use crate::models::AccountSnapshot;

/// Units held in the traded instrument and their average cost
///
/// `quantity == 0` if and only if `avg_buy_price == 0`. Every constructor and
/// mutator normalizes to keep that true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub quantity: u32,
    pub avg_buy_price: f64,
}

/// What a balance read did to the position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Holdings row found and adopted
    Updated,
    /// Holdings listed without the symbol
    Flattened,
    /// No holdings rows at all, or a malformed row
    Unchanged,
}

impl Position {
    pub fn new(quantity: u32, avg_buy_price: f64) -> Self {
        if quantity == 0 || !avg_buy_price.is_finite() || avg_buy_price <= 0.0 {
            return Self::flat();
        }
        Self {
            quantity,
            avg_buy_price,
        }
    }

    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Speculative running-average update after a buy order is sent
    pub fn apply_buy(&mut self, quantity: u32, price: f64) {
        if quantity == 0 || !price.is_finite() || price <= 0.0 {
            return;
        }

        let total = self.quantity + quantity;
        let cost = self.avg_buy_price * self.quantity as f64 + price * quantity as f64;
        self.avg_buy_price = cost / total as f64;
        self.quantity = total;
    }

    pub fn reset(&mut self) {
        *self = Self::flat();
    }

    /// Adopt what the account reports for `symbol`
    ///
    /// # Arguments
    /// * `account` - Latest balance read
    /// * `symbol` - Instrument this position tracks
    pub fn reconcile(&mut self, account: &AccountSnapshot, symbol: &str) -> Reconciliation {
        if account.holdings.is_none() {
            tracing::debug!(symbol, "Balance has no holdings rows, keeping position");
            return Reconciliation::Unchanged;
        }

        let Some(row) = account.find(symbol) else {
            self.reset();
            return Reconciliation::Flattened;
        };

        if row.quantity == 0 {
            self.reset();
            return Reconciliation::Flattened;
        }

        if !row.avg_cost.is_finite() || row.avg_cost <= 0.0 {
            tracing::warn!(
                symbol,
                quantity = row.quantity,
                avg_cost = row.avg_cost,
                "Malformed holding row, keeping position"
            );
            return Reconciliation::Unchanged;
        }

        *self = Self::new(row.quantity, row.avg_cost);
        Reconciliation::Updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Holding;

    fn account(rows: Option<Vec<(&str, u32, f64)>>) -> AccountSnapshot {
        AccountSnapshot {
            holdings: rows.map(|rows| {
                rows.into_iter()
                    .map(|(symbol, quantity, avg_cost)| Holding {
                        symbol: symbol.to_string(),
                        quantity,
                        avg_cost,
                    })
                    .collect()
            }),
            total_valuation: Some(1_000_000.0),
        }
    }

    #[test]
    fn test_constructor_normalizes() {
        assert_eq!(Position::new(0, 5000.0), Position::flat());
        assert_eq!(Position::new(2, 0.0), Position::flat());
        assert_eq!(Position::new(2, f64::NAN), Position::flat());
        assert_eq!(Position::new(2, 5000.0).avg_buy_price, 5000.0);
    }

    #[test]
    fn test_apply_buy_running_average() {
        let mut position = Position::flat();
        position.apply_buy(1, 5000.0);
        assert_eq!(position, Position::new(1, 5000.0));

        position.apply_buy(1, 5100.0);
        assert_eq!(position.quantity, 2);
        assert_eq!(position.avg_buy_price, 5050.0);

        position.apply_buy(0, 9999.0);
        assert_eq!(position.quantity, 2);
    }

    #[test]
    fn test_reconcile_adopts_account_row() {
        let mut position = Position::new(1, 4990.0);
        let outcome = position.reconcile(&account(Some(vec![("005930", 1, 5000.0)])), "005930");

        assert_eq!(outcome, Reconciliation::Updated);
        assert_eq!(position, Position::new(1, 5000.0));
    }

    #[test]
    fn test_reconcile_trims_symbol() {
        let mut position = Position::flat();
        position.reconcile(&account(Some(vec![("005930 ", 2, 5000.0)])), "005930");
        assert_eq!(position.quantity, 2);
    }

    #[test]
    fn test_reconcile_missing_rows_keeps_position() {
        let mut position = Position::new(2, 5000.0);
        let outcome = position.reconcile(&account(None), "005930");

        assert_eq!(outcome, Reconciliation::Unchanged);
        assert_eq!(position, Position::new(2, 5000.0));
    }

    #[test]
    fn test_reconcile_absent_symbol_flattens() {
        let mut position = Position::new(2, 5000.0);
        let outcome = position.reconcile(&account(Some(vec![("000660", 3, 100.0)])), "005930");

        assert_eq!(outcome, Reconciliation::Flattened);
        assert!(position.is_flat());
        assert_eq!(position.avg_buy_price, 0.0);

        let mut position = Position::new(2, 5000.0);
        position.reconcile(&account(Some(vec![])), "005930");
        assert!(position.is_flat());
    }

    #[test]
    fn test_reconcile_malformed_row_keeps_position() {
        let mut position = Position::new(1, 5000.0);
        let outcome = position.reconcile(&account(Some(vec![("005930", 2, 0.0)])), "005930");

        assert_eq!(outcome, Reconciliation::Unchanged);
        assert_eq!(position, Position::new(1, 5000.0));
    }
}
