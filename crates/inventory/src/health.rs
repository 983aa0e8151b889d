//! Read-side stock health: alert flags and turnover metrics.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::mutation::StockMutation;
use crate::stock::StockRecord;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Low,
    Healthy,
    Overstocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockHealth {
    pub available: i64,
    pub on_hand: i64,
    pub min_level: i64,
    pub max_level: Option<i64>,
    pub is_out_of_stock: bool,
    pub is_low_stock: bool,
    pub is_overstocked: bool,
    pub status: StockStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnoverMetrics {
    pub window_days: f64,
    pub sales_quantity: i64,
    /// Time-weighted average on-hand over the window.
    pub average_on_hand: f64,
    /// `None` when the average on-hand is zero.
    pub turnover_rate: Option<f64>,
    /// `None` when nothing sold in the window (stock would last forever).
    pub days_of_inventory: Option<f64>,
}

/// Pure read-side computation over stock records and their mutation history.
#[derive(Debug, Clone, Default)]
pub struct StockHealthEvaluator;

impl StockHealthEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn is_out_of_stock(&self, record: &StockRecord) -> bool {
        record.available() <= 0
    }

    pub fn is_low_stock(&self, record: &StockRecord) -> bool {
        let available = record.available();
        available > 0 && available <= record.min_level()
    }

    pub fn is_overstocked(&self, record: &StockRecord) -> bool {
        record.max_level().is_some_and(|max| record.on_hand() > max)
    }

    pub fn evaluate(&self, record: &StockRecord) -> StockHealth {
        let is_out_of_stock = self.is_out_of_stock(record);
        let is_low_stock = self.is_low_stock(record);
        let is_overstocked = self.is_overstocked(record);

        // Overstock is about on-hand, so it can coexist with a low available
        // count when most units are held; shortage wins for the summary.
        let status = if is_out_of_stock {
            StockStatus::OutOfStock
        } else if is_low_stock {
            StockStatus::Low
        } else if is_overstocked {
            StockStatus::Overstocked
        } else {
            StockStatus::Healthy
        };

        StockHealth {
            available: record.available(),
            on_hand: record.on_hand(),
            min_level: record.min_level(),
            max_level: record.max_level(),
            is_out_of_stock,
            is_low_stock,
            is_overstocked,
            status,
        }
    }

    /// Turnover over `[now - window, now]`.
    ///
    /// `mutations` is the record's log in sequence order; entries outside the
    /// window are used only to reconstruct on-hand at the window start.
    pub fn turnover(
        &self,
        record: &StockRecord,
        mutations: &[StockMutation],
        window: Duration,
        now: DateTime<Utc>,
    ) -> TurnoverMetrics {
        let window_secs = window.num_seconds().max(1) as f64;
        let window_days = window_secs / 86_400.0;
        let start = now - window;

        let in_window: Vec<&StockMutation> = mutations
            .iter()
            .filter(|m| m.occurred_at > start && m.occurred_at <= now)
            .collect();

        let sales_quantity: i64 = in_window.iter().map(|m| m.sold_units()).sum();

        // Walk back from current on-hand to on-hand at the window start.
        let mut level_at_start = record.on_hand();
        for m in in_window.iter().rev() {
            level_at_start -= m.on_hand_delta();
        }

        let mut weighted = 0.0;
        let mut cursor = start;
        let mut level = level_at_start;
        for m in &in_window {
            weighted += level as f64 * (m.occurred_at - cursor).num_milliseconds() as f64;
            cursor = m.occurred_at;
            level = m.new_stock.on_hand;
        }
        weighted += level as f64 * (now - cursor).num_milliseconds().max(0) as f64;
        let average_on_hand = weighted / (window_secs * 1000.0);

        let turnover_rate = if average_on_hand > 0.0 {
            Some(sales_quantity as f64 / average_on_hand)
        } else {
            None
        };

        let days_of_inventory = if sales_quantity > 0 {
            let daily_sales = sales_quantity as f64 / window_days;
            Some(record.on_hand() as f64 / daily_sales)
        } else {
            None
        };

        TurnoverMetrics {
            window_days,
            sales_quantity,
            average_on_hand,
            turnover_rate,
            days_of_inventory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::StockOperationType;
    use crate::stock::StockThresholds;
    use bazaar_core::{ProductId, StockKey, StoreId};

    fn record(on_hand: i64, reserved: i64, thresholds: StockThresholds) -> StockRecord {
        let now = Utc::now();
        let mut r = StockRecord::new(StockKey::new(StoreId::new(), ProductId(9)), thresholds, now);
        if on_hand > 0 {
            r = r.adjust_on_hand(on_hand, now).unwrap();
        }
        if reserved > 0 {
            r = r.increment_reserved(reserved, now).unwrap();
        }
        r
    }

    #[test]
    fn flags_follow_available_and_thresholds() {
        let eval = StockHealthEvaluator::new();

        let empty = record(0, 0, StockThresholds::default());
        assert!(eval.is_out_of_stock(&empty));
        assert!(!eval.is_low_stock(&empty));
        assert_eq!(eval.evaluate(&empty).status, StockStatus::OutOfStock);

        let fully_held = record(5, 5, StockThresholds::default());
        assert!(eval.is_out_of_stock(&fully_held));

        let low = record(10, 0, StockThresholds::default());
        assert!(eval.is_low_stock(&low));
        assert_eq!(eval.evaluate(&low).status, StockStatus::Low);

        let healthy = record(11, 0, StockThresholds::default());
        assert!(!eval.is_low_stock(&healthy));
        assert!(!eval.is_overstocked(&healthy));
        assert_eq!(eval.evaluate(&healthy).status, StockStatus::Healthy);
    }

    #[test]
    fn overstock_needs_a_configured_max() {
        let eval = StockHealthEvaluator::new();
        let unbounded = record(10_000, 0, StockThresholds::default());
        assert!(!eval.is_overstocked(&unbounded));

        let bounded = record(101, 0, StockThresholds::new(Some(5), Some(100)));
        assert!(eval.is_overstocked(&bounded));
        assert_eq!(eval.evaluate(&bounded).status, StockStatus::Overstocked);
    }

    #[test]
    fn turnover_without_sales_has_no_days_of_inventory() {
        let eval = StockHealthEvaluator::new();
        let r = record(40, 0, StockThresholds::default());
        let m = eval.turnover(&r, &[], Duration::days(30), Utc::now());
        assert_eq!(m.sales_quantity, 0);
        assert_eq!(m.days_of_inventory, None);
        assert!((m.average_on_hand - 40.0).abs() < 1e-9);
        assert_eq!(m.turnover_rate, Some(0.0));
    }

    #[test]
    fn turnover_weights_on_hand_by_time() {
        let eval = StockHealthEvaluator::new();
        let now = Utc::now();
        let key = StockKey::new(StoreId::new(), ProductId(9));
        let window = Duration::days(10);

        // 100 units for the first half of the window, 50 for the second half.
        let before = StockRecord::new(key, StockThresholds::default(), now - Duration::days(20))
            .adjust_on_hand(100, now - Duration::days(20))
            .unwrap()
            .increment_reserved(50, now - Duration::days(6))
            .unwrap();
        let after = before.commit_reserved(50, now - Duration::days(5)).unwrap();
        let sale = StockMutation::between(3, StockOperationType::Sale, 50, &before, &after, None);

        let m = eval.turnover(&after, &[sale], window, now);
        assert_eq!(m.sales_quantity, 50);
        assert!((m.average_on_hand - 75.0).abs() < 1e-6);
        assert!((m.turnover_rate.unwrap() - 50.0 / 75.0).abs() < 1e-6);
        // 5 sold per day, 50 left.
        assert!((m.days_of_inventory.unwrap() - 10.0).abs() < 1e-6);
    }

    #[test]
    fn turnover_with_zero_average_has_no_rate() {
        let eval = StockHealthEvaluator::new();
        let r = record(0, 0, StockThresholds::default());
        let m = eval.turnover(&r, &[], Duration::days(7), Utc::now());
        assert_eq!(m.turnover_rate, None);
    }
}
