//! Wiring for the inventory engine and its read-side reports.

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;

use bazaar_core::{Clock, DomainResult, StockKey, StoreId};
use bazaar_inventory::{
    StockAnomaly, StockAnomalyDetector, StockHealth, StockHealthEvaluator, StockStatus, TurnoverMetrics,
};

use crate::carts::{AbandonedCart, CartActivityTracker};
use crate::config::InventoryConfig;
use crate::ledger::StockLedger;
use crate::reservations::ReservationManager;
use crate::store::{
    InMemoryMutationLog, InMemoryReservationStore, InMemoryStockStore, MutationLog, ReservationStore, StockStore,
};
use crate::sweeper::{AbandonedHoldSweeper, SweeperConfig, SweeperHandle};

/// One record needing attention in a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAlert {
    pub key: StockKey,
    pub health: StockHealth,
}

/// Ledger, holds, cart tracking and sweeper sharing one configuration and clock.
#[derive(Debug, Clone)]
pub struct InventoryEngine {
    config: InventoryConfig,
    ledger: Arc<StockLedger>,
    reservations: Arc<ReservationManager>,
    carts: Arc<CartActivityTracker>,
    evaluator: StockHealthEvaluator,
    detector: StockAnomalyDetector,
}

impl InventoryEngine {
    pub fn new(
        config: InventoryConfig,
        stock: Arc<dyn StockStore>,
        log: Arc<dyn MutationLog>,
        reservations: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = Arc::new(StockLedger::new(stock, log, clock, &config));
        let carts = Arc::new(CartActivityTracker::new());
        let manager = Arc::new(ReservationManager::new(
            ledger.clone(),
            reservations,
            carts.clone(),
            config.default_reservation_ttl,
        ));
        Self {
            config,
            ledger,
            reservations: manager,
            carts,
            evaluator: StockHealthEvaluator::new(),
            detector: StockAnomalyDetector::new(),
        }
    }

    /// Engine over in-memory stores, for tests and development.
    pub fn in_memory(config: InventoryConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config,
            InMemoryStockStore::arc(),
            InMemoryMutationLog::arc(),
            InMemoryReservationStore::arc(),
            clock,
        )
    }

    pub fn with_anomaly_detector(mut self, detector: StockAnomalyDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    pub fn reservations(&self) -> &Arc<ReservationManager> {
        &self.reservations
    }

    pub fn carts(&self) -> &Arc<CartActivityTracker> {
        &self.carts
    }

    pub fn sweeper(&self) -> AbandonedHoldSweeper {
        AbandonedHoldSweeper::new(
            self.reservations.clone(),
            self.carts.clone(),
            SweeperConfig::from(&self.config),
        )
    }

    /// Start the background sweeper at the configured interval.
    pub fn spawn_sweeper(&self) -> std::io::Result<SweeperHandle> {
        self.sweeper().spawn()
    }

    pub fn health(&self, key: StockKey) -> DomainResult<StockHealth> {
        let record = self.ledger.get(key)?;
        Ok(self.evaluator.evaluate(&record))
    }

    /// Turnover over the trailing `window`.
    pub fn turnover(&self, key: StockKey, window: Duration) -> DomainResult<TurnoverMetrics> {
        let record = self.ledger.get(key)?;
        let history = self.ledger.history(key, None)?;
        Ok(self
            .evaluator
            .turnover(&record, &history, window, self.ledger.now()))
    }

    /// Every record in the store that is out of stock, low or overstocked,
    /// out-of-stock first.
    pub fn stock_alerts(&self, store_id: StoreId) -> DomainResult<Vec<StockAlert>> {
        let mut alerts: Vec<StockAlert> = self
            .ledger
            .list(store_id)?
            .iter()
            .filter(|r| r.is_active())
            .map(|r| StockAlert {
                key: r.key(),
                health: self.evaluator.evaluate(r),
            })
            .filter(|a| a.health.status != StockStatus::Healthy)
            .collect();
        alerts.sort_by_key(|a| (alert_rank(a.health.status), a.key));
        Ok(alerts)
    }

    pub fn detect_anomaly(&self, key: StockKey) -> DomainResult<Option<StockAnomaly>> {
        let history = self.ledger.history(key, None)?;
        self.detector.detect(&history)
    }

    pub fn abandoned_carts(&self) -> Vec<AbandonedCart> {
        self.carts.abandoned()
    }
}

fn alert_rank(status: StockStatus) -> u8 {
    match status {
        StockStatus::OutOfStock => 0,
        StockStatus::Low => 1,
        StockStatus::Overstocked => 2,
        StockStatus::Healthy => 3,
    }
}
