//! Periodic refresh of every session with a live push connection.

use crate::dashboard::Dashboard;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of one scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleReport {
    pub refreshed: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn is_failure(&self) -> bool {
        self.failed > 0
    }
}

/// Delay before the next pass: twice the interval after a failed one.
pub fn next_delay(interval: Duration, failed: bool) -> Duration {
    if failed {
        interval.saturating_mul(2)
    } else {
        interval
    }
}

pub async fn run_cycle(dashboard: &Dashboard) -> CycleReport {
    let mut report = CycleReport::default();
    for session in dashboard.hub().active_sessions().await {
        let snapshot = dashboard.refresh(session).await;
        report.refreshed += 1;
        if snapshot.is_failure() {
            report.failed += 1;
        }
    }
    report
}

/// Starts the background loop. Each pass runs in its own task so a panic
/// ends that pass only.
pub fn spawn(dashboard: Arc<Dashboard>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "scheduler started");
        loop {
            let pass = tokio::spawn({
                let dashboard = Arc::clone(&dashboard);
                async move { run_cycle(&dashboard).await }
            });

            let failed = match pass.await {
                Ok(report) if report.is_failure() => {
                    warn!(refreshed = report.refreshed, failed = report.failed, "refresh cycle had failures");
                    true
                }
                Ok(report) => {
                    debug!(refreshed = report.refreshed, "refresh cycle done");
                    false
                }
                Err(e) => {
                    error!(error = %e, "refresh cycle aborted");
                    true
                }
            };

            tokio::time::sleep(next_delay(interval, failed)).await;
        }
    })
}
