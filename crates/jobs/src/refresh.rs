use chaindns_application::ports::Refresher;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Calls a [`Refresher`] on a fixed interval, starting immediately.
pub struct RefreshJob {
    refresher: Arc<dyn Refresher>,
    interval_secs: u64,
    shutdown: CancellationToken,
}

impl RefreshJob {
    pub fn new(refresher: Arc<dyn Refresher>) -> Self {
        Self {
            refresher,
            interval_secs: DEFAULT_INTERVAL_SECS,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_interval(mut self, interval_secs: u64) -> Self {
        self.interval_secs = interval_secs.max(1);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn name(&self) -> &str {
        self.refresher.name()
    }

    pub async fn start(self: Arc<Self>) {
        info!(
            source = self.name(),
            interval_secs = self.interval_secs,
            "Starting refresh job"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(source = self.name(), "RefreshJob: shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.refresher.refresh().await {
                        Ok(()) => debug!(source = self.name(), "Refresh completed"),
                        Err(e) => error!(source = self.name(), error = %e, "Refresh failed"),
                    }
                }
            }
        }
    }
}
