//! Periodic scan loop.
//!
//! One timer drives all time-based behavior: round progression checks,
//! match timeout supervision, and stale-proposal expiry. Each tick is
//! idempotent, and errors on one tournament are logged without touching
//! the others, so running the loop on several replicas at once is safe.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

use crate::scheduling::MatchSchedulingCoordinator;
use crate::store::ChampionshipStore;
use crate::timeout::MatchTimeoutCoordinator;
use crate::tournament::RoundProgressionCoordinator;

/// Heartbeat loop owning the three periodic concerns.
pub struct Heartbeat {
    store: Arc<dyn ChampionshipStore>,
    progression: Arc<RoundProgressionCoordinator>,
    timeout: Arc<MatchTimeoutCoordinator>,
    scheduling: Arc<MatchSchedulingCoordinator>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        store: Arc<dyn ChampionshipStore>,
        progression: Arc<RoundProgressionCoordinator>,
        timeout: Arc<MatchTimeoutCoordinator>,
        scheduling: Arc<MatchSchedulingCoordinator>,
        interval_secs: u64,
    ) -> Self {
        Self {
            store,
            progression,
            timeout,
            scheduling,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// One full scan. Public so tests (and embedders with their own
    /// timer) can drive the engine without real time passing.
    pub async fn tick(&self) {
        match self.store.in_progress_tournaments().await {
            Ok(tournaments) => {
                for t in tournaments {
                    if let Err(e) = self.progression.evaluate(t.id).await {
                        log::error!("tournament {}: progression check failed: {e}", t.id);
                    }
                }
            }
            Err(e) => log::error!("heartbeat: tournament scan failed: {e}"),
        }

        if let Err(e) = self.timeout.tick().await {
            log::error!("heartbeat: timeout scan failed: {e}");
        }

        if let Err(e) = self.scheduling.expire_stale().await {
            log::error!("heartbeat: proposal expiry failed: {e}");
        }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        log::info!("heartbeat starting ({:?} interval)", self.interval);
        let mut ticker = interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = &mut shutdown => {
                    log::info!("heartbeat stopping");
                    break;
                }
            }
        }
    }

    /// Spawn the loop on the current runtime. Dropping or firing the
    /// returned sender stops it.
    pub fn spawn(self) -> (JoinHandle<()>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(self.run(rx));
        (handle, tx)
    }
}
