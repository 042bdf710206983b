use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

type JobHandler = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Job {
    name: String,
    interval: Duration,
    handler: JobHandler,
}

/// Independent periodic jobs, one tokio task each.
///
/// Every job runs once as soon as the scheduler starts and then on its own
/// interval. A failing run is logged and the loop carries on.
#[derive(Default)]
pub struct JobScheduler {
    pending: Vec<Job>,
    running: Vec<(String, JoinHandle<()>)>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a job. A zero interval is rejected with a warning since
    /// such a job could never wait between runs.
    pub fn add_job<F, Fut>(&mut self, name: impl Into<String>, interval: Duration, handler: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        if interval.is_zero() {
            tracing::warn!("[Scheduler] Ignoring job '{}' with zero interval", name);
            return;
        }

        tracing::info!("[Scheduler] Added job '{}' every {:?}", name, interval);
        self.pending.push(Job {
            name,
            interval,
            handler: Arc::new(move || handler().boxed()),
        });
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.pending
            .iter()
            .map(|job| job.name.as_str())
            .chain(self.running.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Spawns every registered job that is not running yet.
    pub fn start(&mut self) {
        for job in self.pending.drain(..) {
            let name = job.name.clone();
            let handle = tokio::spawn(run_job(job));
            self.running.push((name, handle));
        }
        tracing::info!("[Scheduler] Started {} jobs", self.running.len());
    }

    /// Waits for every job loop to exit.
    pub async fn join(self) {
        for (name, handle) in self.running {
            if let Err(e) = handle.await {
                tracing::error!("[Scheduler] Job '{}' terminated abnormally: {}", name, e);
            }
        }
    }
}

async fn run_job(job: Job) {
    let mut ticker = time::interval(job.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // The first tick completes immediately.
        ticker.tick().await;

        tracing::info!("[Scheduler] Running job '{}'", job.name);
        let started = Instant::now();

        // Own task, so a panicking run does not end the loop.
        match tokio::spawn((job.handler)()).await {
            Ok(Ok(())) => tracing::info!(
                "[Scheduler] Job '{}' completed in {:?}",
                job.name,
                started.elapsed()
            ),
            Ok(Err(e)) => tracing::error!("[Scheduler] Job '{}' failed: {:#}", job.name, e),
            Err(e) => tracing::error!("[Scheduler] Job '{}' panicked: {}", job.name, e),
        }
    }
}
