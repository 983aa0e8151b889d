use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, StockKey};

use crate::mutation::StockMutation;

/// Unusual on-hand movement found in a record's mutation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAnomaly {
    pub key: StockKey,
    pub sequence: u64,
    pub delta: i64,
    /// `>= 1.0` means at or beyond the threshold.
    pub severity: f64,
    pub explanation: String,
}

/// Rolling z-score detector over on-hand deltas.
///
/// Model:
/// - Take the on-hand deltas of every mutation that moved on-hand.
/// - Compare the most recent delta against the `window` deltas before it.
/// - Flag if the z-score reaches `z_threshold`.
#[derive(Debug, Clone)]
pub struct StockAnomalyDetector {
    /// Baseline size (must be >= 2 to compute stddev).
    window: usize,
    z_threshold: f64,
}

impl Default for StockAnomalyDetector {
    fn default() -> Self {
        Self {
            window: 10,
            z_threshold: 3.0,
        }
    }
}

impl StockAnomalyDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    pub fn with_z_threshold(mut self, z_threshold: f64) -> Self {
        self.z_threshold = z_threshold;
        self
    }

    fn check_config(&self) -> DomainResult<()> {
        if self.window < 2 {
            return Err(DomainError::invalid_field(
                "window",
                "out_of_range",
                "window must be >= 2 to compute standard deviation",
            ));
        }
        if !(self.z_threshold.is_finite() && self.z_threshold > 0.0) {
            return Err(DomainError::invalid_field(
                "zThreshold",
                "out_of_range",
                "z_threshold must be a finite positive number",
            ));
        }
        Ok(())
    }

    /// Inspect the latest on-hand movement in `mutations` (one key, sequence order).
    pub fn detect(&self, mutations: &[StockMutation]) -> DomainResult<Option<StockAnomaly>> {
        self.check_config()?;

        let moves: Vec<&StockMutation> = mutations.iter().filter(|m| m.on_hand_delta() != 0).collect();
        if moves.len() < self.window + 1 {
            return Ok(None);
        }

        let Some(last) = moves.last() else {
            return Ok(None);
        };
        let baseline: Vec<f64> = moves[moves.len() - 1 - self.window..moves.len() - 1]
            .iter()
            .map(|m| m.on_hand_delta() as f64)
            .collect();

        let delta = last.on_hand_delta();
        let mean = mean(&baseline);
        let std = stddev_sample(&baseline, mean);

        if std <= f64::EPSILON {
            if (delta as f64 - mean).abs() > 0.0 {
                return Ok(Some(StockAnomaly {
                    key: last.key,
                    sequence: last.sequence,
                    delta,
                    severity: 1.0,
                    explanation: format!(
                        "{} moved by {delta} units; baseline movement is constant at {mean:.2}",
                        last.key
                    ),
                }));
            }
            return Ok(None);
        }

        let z = (delta as f64 - mean) / std;
        if z.abs() < self.z_threshold {
            return Ok(None);
        }

        Ok(Some(StockAnomaly {
            key: last.key,
            sequence: last.sequence,
            delta,
            severity: z.abs() / self.z_threshold,
            explanation: format!(
                "{} moved by {delta} units; baseline mean={mean:.2}, std={std:.2}, z={z:.2} (threshold={:.2})",
                last.key, self.z_threshold
            ),
        }))
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / (xs.len() as f64)
}

/// Sample standard deviation (n-1).
fn stddev_sample(xs: &[f64], mean: f64) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / ((xs.len() - 1) as f64);
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::StockOperationType;
    use crate::stock::{StockRecord, StockThresholds};
    use bazaar_core::{ProductId, StoreId};
    use chrono::Utc;

    fn log_of(deltas: &[i64]) -> Vec<StockMutation> {
        let now = Utc::now();
        let key = StockKey::new(StoreId::new(), ProductId(5));
        let mut record = StockRecord::new(key, StockThresholds::default(), now)
            .adjust_on_hand(100_000, now)
            .unwrap();
        let mut log = Vec::new();
        for (i, d) in deltas.iter().enumerate() {
            let next = record.adjust_on_hand(*d, now).unwrap();
            log.push(StockMutation::between(
                i as u64 + 1,
                StockOperationType::Adjustment,
                *d,
                &record,
                &next,
                None,
            ));
            record = next;
        }
        log
    }

    #[test]
    fn spike_after_steady_sales_is_flagged() {
        let log = log_of(&[-2, -3, -2, -4, -3, -2, -3, -2, -3, -2, -400]);
        let anomaly = StockAnomalyDetector::new().detect(&log).unwrap().unwrap();
        assert_eq!(anomaly.delta, -400);
        assert_eq!(anomaly.sequence, 11);
        assert!(anomaly.severity >= 1.0);
    }

    #[test]
    fn ordinary_movement_is_not_flagged() {
        let log = log_of(&[-2, -3, -2, -4, -3, -2, -3, -2, -3, -2, -3]);
        assert_eq!(StockAnomalyDetector::new().detect(&log).unwrap(), None);
    }

    #[test]
    fn short_history_is_never_flagged() {
        let log = log_of(&[-1, -1, -500]);
        assert_eq!(StockAnomalyDetector::new().detect(&log).unwrap(), None);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(StockAnomalyDetector::new().with_window(1).detect(&[]).is_err());
        assert!(StockAnomalyDetector::new().with_z_threshold(f64::NAN).detect(&[]).is_err());
    }
}
