//! Background reclamation of expired holds and abandoned-cart flagging.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use bazaar_core::{DomainResult, ReservationId};
use bazaar_inventory::{ReleaseReason, Reservation};

use crate::carts::{AbandonedCart, CartActivityTracker};
use crate::config::InventoryConfig;
use crate::reservations::ReservationManager;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: StdDuration,
    pub batch_size: usize,
    pub abandoned_cart_after: Duration,
    /// Name for logging and the worker thread.
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from(&InventoryConfig::default())
    }
}

impl From<&InventoryConfig> for SweeperConfig {
    fn from(cfg: &InventoryConfig) -> Self {
        Self {
            interval: cfg.sweep_interval,
            batch_size: cfg.sweep_batch_size.max(1),
            abandoned_cart_after: Duration::from_std(cfg.abandoned_cart_after).unwrap_or(Duration::hours(1)),
            name: "hold-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_interval(mut self, interval: StdDuration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub failed: usize,
    pub abandoned_carts: Vec<AbandonedCart>,
}

/// Cumulative sweeper statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweeperStats {
    pub sweeps_run: u64,
    pub holds_expired: u64,
    pub failures: u64,
    pub carts_flagged: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub uptime_secs: u64,
}

/// Releases holds whose `expires_at` has passed and flags idle carts.
///
/// Safe to run next to ordinary traffic: every release goes through the
/// reservation manager, under the same per-product critical section, and
/// releasing an already-terminal hold is a no-op.
#[derive(Debug)]
pub struct AbandonedHoldSweeper {
    manager: Arc<ReservationManager>,
    carts: Arc<CartActivityTracker>,
    config: SweeperConfig,
}

impl AbandonedHoldSweeper {
    pub fn new(manager: Arc<ReservationManager>, carts: Arc<CartActivityTracker>, config: SweeperConfig) -> Self {
        Self {
            manager,
            carts,
            config,
        }
    }

    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }

    /// Run one sweep at the clock's current time.
    pub fn sweep_once(&self) -> DomainResult<SweepReport> {
        let now = self.manager.now();
        let mut report = SweepReport::default();

        // Holds that failed this sweep stay indexed; skip them until the next one.
        let mut failed: HashSet<ReservationId> = HashSet::new();
        loop {
            let batch: Vec<Reservation> = self
                .manager
                .expired(now, self.config.batch_size + failed.len())?
                .into_iter()
                .filter(|r| !failed.contains(&r.id()))
                .collect();
            if batch.is_empty() {
                break;
            }

            for hold in batch {
                report.scanned += 1;
                match self.manager.release(hold.id(), ReleaseReason::Expired) {
                    Ok(_) => report.expired += 1,
                    Err(e) => {
                        report.failed += 1;
                        failed.insert(hold.id());
                        if e.is_fatal() {
                            error!(sweeper = %self.config.name, reservation_id = %hold.id(), error = %e, "failed to expire hold");
                        } else {
                            warn!(sweeper = %self.config.name, reservation_id = %hold.id(), error = %e, "could not expire hold; will retry next sweep");
                        }
                    }
                }
            }
        }

        report.abandoned_carts = self.carts.flag_abandoned(now, self.config.abandoned_cart_after);

        if report.expired > 0 || report.failed > 0 || !report.abandoned_carts.is_empty() {
            info!(
                sweeper = %self.config.name,
                scanned = report.scanned,
                expired = report.expired,
                failed = report.failed,
                abandoned_carts = report.abandoned_carts.len(),
                "sweep finished"
            );
        } else {
            debug!(sweeper = %self.config.name, "sweep found nothing to do");
        }
        Ok(report)
    }

    /// Spawn the sweeper on a background thread, sweeping every `interval`.
    pub fn spawn(self) -> std::io::Result<SweeperHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(SweeperStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || sweeper_loop(self, shutdown_rx, stats_clone))?;

        Ok(SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<SweeperStats>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the current sweep to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> SweeperStats {
        match self.stats.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

fn sweeper_loop(sweeper: AbandonedHoldSweeper, shutdown_rx: mpsc::Receiver<()>, stats: Arc<Mutex<SweeperStats>>) {
    let name = sweeper.config.name.clone();
    info!(sweeper = %name, interval_ms = sweeper.config.interval.as_millis() as u64, "hold sweeper started");
    let started = Instant::now();

    loop {
        let result = sweeper.sweep_once();

        if let Ok(mut s) = stats.lock() {
            s.sweeps_run += 1;
            s.uptime_secs = started.elapsed().as_secs();
            s.last_sweep_at = Some(sweeper.manager.now());
            match &result {
                Ok(report) => {
                    s.holds_expired += report.expired as u64;
                    s.failures += report.failed as u64;
                    s.carts_flagged += report.abandoned_carts.len() as u64;
                }
                Err(_) => s.failures += 1,
            }
        }
        if let Err(e) = result {
            error!(sweeper = %name, error = %e, "sweep aborted");
        }

        match shutdown_rx.recv_timeout(sweeper.config.interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
        }
    }

    info!(sweeper = %name, "hold sweeper stopped");
}
