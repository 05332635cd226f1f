//! Cron-driven re-benchmarking (spec §4.4 `trigger_on_schedule`).
//!
//! One task per registered BRC: sleeps until the schedule's next fire
//! time, re-benchmarks against the BRC's stored dataset, then repeats.
//! Cancellation is cooperative via `tokio_util::sync::CancellationToken`,
//! mirroring the graceful-shutdown pattern used for the HTTP server.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::brc::BenchmarkedRequestClient;
use crate::registry::Registry;

/// Spawns one scheduler task per BRC that has a `trigger_on_schedule`
/// cron expression. Returns the `JoinHandle`s so the caller can await them
/// on shutdown.
pub fn spawn_scheduler(registry: Arc<Registry>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut known: std::collections::HashSet<i64> = std::collections::HashSet::new();
        loop {
            for brc in registry.all() {
                if known.contains(&brc.id) {
                    continue;
                }
                if let Some(expr) = brc.config().trigger_on_schedule.clone() {
                    known.insert(brc.id);
                    tokio::spawn(run_brc_schedule(brc, expr, shutdown.clone()));
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        }
    })
}

async fn run_brc_schedule(
    brc: Arc<BenchmarkedRequestClient>,
    cron_expr: String,
    shutdown: CancellationToken,
) {
    let schedule = match icvsb_core::validators::validate_cron_line(&cron_expr) {
        Ok(s) => s,
        Err(err) => {
            error!(brc_id = brc.id, %err, "invalid trigger_on_schedule, scheduler disabled for this BRC");
            return;
        }
    };

    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        info!(brc_id = brc.id, "scheduled re-benchmark firing");
        let dataset = brc.config().dataset.clone();
        if let Err(err) = brc.benchmark(&dataset).await {
            error!(brc_id = brc.id, %err, "scheduled re-benchmark failed");
        }
    }
}
