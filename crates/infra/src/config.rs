//! Configuration loading and representation.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer (got {value:?})")]
    InvalidNumber { var: &'static str, value: String },
}

/// Inventory engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Longest wait for a per-product critical section.
    pub lock_timeout: Duration,
    /// Hold duration when `reserve` is called without one.
    pub default_reservation_ttl: Duration,
    /// Time between sweeps of expired holds.
    pub sweep_interval: Duration,
    /// Most expired holds released by one sweep.
    pub sweep_batch_size: usize,
    /// Cart inactivity after which the cart is reported as abandoned.
    pub abandoned_cart_after: Duration,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2_000),
            default_reservation_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(300),
            sweep_batch_size: 500,
            abandoned_cart_after: Duration::from_secs(60 * 60),
        }
    }
}

impl InventoryConfig {
    /// Read overrides from the process environment; unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env`, with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(ms) = read_number(&lookup, "INVENTORY_LOCK_TIMEOUT_MS")? {
            cfg.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = read_number(&lookup, "INVENTORY_RESERVATION_TTL_SECS")? {
            cfg.default_reservation_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = read_number(&lookup, "INVENTORY_SWEEP_INTERVAL_SECS")? {
            cfg.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(n) = read_number(&lookup, "INVENTORY_SWEEP_BATCH_SIZE")? {
            cfg.sweep_batch_size = n as usize;
        }
        if let Some(secs) = read_number(&lookup, "INVENTORY_ABANDONED_CART_SECS")? {
            cfg.abandoned_cart_after = Duration::from_secs(secs);
        }

        debug!(config = ?cfg, "inventory config loaded");
        Ok(cfg)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.default_reservation_ttl = ttl;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_sweep_batch_size(mut self, size: usize) -> Self {
        self.sweep_batch_size = size;
        self
    }

    pub fn with_abandoned_cart_after(mut self, after: Duration) -> Self {
        self.abandoned_cart_after = after;
        self
    }
}

fn read_number<F>(lookup: &F, var: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber { var, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn unset_environment_gives_defaults() {
        let cfg = InventoryConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg, InventoryConfig::default());
        assert_eq!(cfg.default_reservation_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = InventoryConfig::from_lookup(lookup_from(&[
            ("INVENTORY_LOCK_TIMEOUT_MS", "250"),
            ("INVENTORY_SWEEP_INTERVAL_SECS", "60"),
            ("INVENTORY_SWEEP_BATCH_SIZE", " 20 "),
        ]))
        .unwrap();
        assert_eq!(cfg.lock_timeout, Duration::from_millis(250));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.sweep_batch_size, 20);
        assert_eq!(cfg.abandoned_cart_after, Duration::from_secs(3_600));
    }

    #[test]
    fn garbage_and_zero_are_rejected() {
        let err = InventoryConfig::from_lookup(lookup_from(&[("INVENTORY_RESERVATION_TTL_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                var: "INVENTORY_RESERVATION_TTL_SECS",
                value: "soon".to_string()
            }
        );
        assert!(InventoryConfig::from_lookup(lookup_from(&[("INVENTORY_SWEEP_BATCH_SIZE", "0")])).is_err());
    }
}
