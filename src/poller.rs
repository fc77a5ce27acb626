//! Drift poller — periodic scan that catches updates missed by webhooks.
//!
//! Correctness-by-overlap, not a changefeed: deals are paged in
//! last-modified-descending order until one falls behind the cursor minus
//! a trailing buffer, and the cursor only advances to the *start* time of
//! a completed scan. Writes landing mid-scan are therefore re-checked next
//! cycle, which is cheap because the engine short-circuits no-op writes.
//! A run-lock makes an overlapping tick skip-and-log instead of running
//! two scans concurrently.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::config::PollConfig;
use crate::error::SyncError;
use crate::store::RecordStore;
use crate::sweep::SweepOrchestrator;

/// What one poll cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Deals handed to the sweeper.
    pub swept: usize,
    /// Deals whose sweep failed (scan continued).
    pub failed: usize,
    /// Scan ended at the cursor boundary rather than the end of the list.
    pub stopped_early: bool,
    /// Cycle skipped because the previous one was still running.
    pub skipped: bool,
}

impl PollStats {
    fn skipped_tick() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

pub struct DriftPoller {
    store: Arc<dyn RecordStore>,
    sweeper: Arc<SweepOrchestrator>,
    cursor: Mutex<DateTime<Utc>>,
    run_lock: Mutex<()>,
    page_size: usize,
    buffer: chrono::Duration,
}

impl DriftPoller {
    /// Cold start: the cursor opens `lookback_hours` in the past so a
    /// restart re-scans a bounded window instead of losing history.
    pub fn new(
        store: Arc<dyn RecordStore>,
        sweeper: Arc<SweepOrchestrator>,
        poll: &PollConfig,
    ) -> Self {
        Self {
            store,
            sweeper,
            cursor: Mutex::new(Utc::now() - chrono::Duration::hours(poll.lookback_hours)),
            run_lock: Mutex::new(()),
            page_size: poll.page_size,
            buffer: chrono::Duration::seconds(poll.buffer_seconds),
        }
    }

    pub async fn cursor(&self) -> DateTime<Utc> {
        *self.cursor.lock().await
    }

    #[cfg(test)]
    pub(crate) async fn set_cursor(&self, at: DateTime<Utc>) {
        *self.cursor.lock().await = at;
    }

    #[cfg(test)]
    pub(crate) fn run_lock(&self) -> &Mutex<()> {
        &self.run_lock
    }

    /// One full scan. The cursor only moves on successful completion, and
    /// it moves to the scan's start time — not its end — so the next cycle
    /// overlaps this one.
    pub async fn poll_once(&self) -> Result<PollStats, SyncError> {
        let Ok(_running) = self.run_lock.try_lock() else {
            log::warn!("poll: previous cycle still running, skipping tick");
            return Ok(PollStats::skipped_tick());
        };

        let scan_start = Utc::now();
        let cutoff = *self.cursor.lock().await - self.buffer;
        let mut stats = PollStats::default();
        let mut start = 0;

        'scan: loop {
            let page = self.store.deals_page(start, self.page_size).await?;
            if page.deals.is_empty() {
                break;
            }

            for deal in &page.deals {
                // Ordering is update_time descending: the first deal older
                // than the boundary means everything after it was already
                // seen by a previous cycle.
                if let Some(modified) = deal.update_time {
                    if modified < cutoff {
                        stats.stopped_early = true;
                        break 'scan;
                    }
                }
                match self.sweeper.sweep_deal(deal.id).await {
                    Ok(_) => stats.swept += 1,
                    Err(err) => {
                        log::warn!("poll: sweep of deal {} failed: {}", deal.id, err);
                        stats.failed += 1;
                    }
                }
            }

            if !page.more || page.deals.len() < self.page_size {
                break;
            }
            start += self.page_size;
        }

        *self.cursor.lock().await = scan_start;
        Ok(stats)
    }

    /// Poll loop, spawned once at startup when polling is enabled.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        loop {
            tokio::time::sleep(interval).await;
            match self.poll_once().await {
                Ok(stats) if stats.skipped => {}
                Ok(stats) => log::info!(
                    "poll: swept {} deals, {} failed{}",
                    stats.swept,
                    stats.failed,
                    if stats.stopped_early {
                        " (stopped at cursor)"
                    } else {
                        ""
                    }
                ),
                Err(err) => log::warn!("poll cycle failed: {}", err),
            }
        }
    }
}
