use crate::RefreshJob;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub trait SpawnableJob: Send + Sync + 'static {
    fn with_cancellation(self, token: CancellationToken) -> Self;
    fn start_job(self: Arc<Self>) -> JoinHandle<()>;
}

impl SpawnableJob for RefreshJob {
    fn with_cancellation(self, token: CancellationToken) -> Self {
        self.with_cancellation(token)
    }

    fn start_job(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.start().await })
    }
}

fn spawn_job<J: SpawnableJob>(job: J, shutdown: &Option<CancellationToken>) -> JoinHandle<()> {
    let job = match shutdown {
        Some(token) => job.with_cancellation(token.clone()),
        None => job,
    };
    Arc::new(job).start_job()
}

pub struct JobRunner {
    refresh: Vec<RefreshJob>,
    shutdown: Option<CancellationToken>,
}

impl JobRunner {
    pub fn new() -> Self {
        Self {
            refresh: Vec::new(),
            shutdown: None,
        }
    }

    pub fn with_refresh(mut self, job: RefreshJob) -> Self {
        self.refresh.push(job);
        self
    }

    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn len(&self) -> usize {
        self.refresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refresh.is_empty()
    }

    /// Spawns every job and hands back their tasks.
    pub async fn start(self) -> Vec<JoinHandle<()>> {
        info!(jobs = self.refresh.len(), "Starting background job runner");

        let handles: Vec<JoinHandle<()>> = self
            .refresh
            .into_iter()
            .map(|job| spawn_job(job, &self.shutdown))
            .collect();

        info!("All background jobs started");
        handles
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}
