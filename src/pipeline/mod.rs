use crate::collect::Collector;
use crate::config::HarvestConfig;
use crate::error::Result;
use crate::metrics::{Failure, RunMetrics, RunSnapshot, RunSummary};
use crate::notify::Notifier;
use crate::sink::ReportSink;
use crate::stores::StoreTarget;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub mod governor;
pub mod queue;
pub mod tuner;
pub mod worker;

pub use governor::Governor;
pub use queue::TaskQueue;
pub use tuner::AutoTuner;
pub use worker::RetryPolicy;

/// Orchestrates one harvesting run: a governed pool of collection workers
/// drains the job queue into the submission queue, which a smaller pool of
/// submitters drains into the sink. Collection and submission overlap; the
/// run ends only when both queues are drained.
pub struct HarvestEngine {
    config: HarvestConfig,
    collector: Arc<dyn Collector>,
    sink: Arc<dyn ReportSink>,
    notifier: Arc<dyn Notifier>,
    progress: watch::Sender<RunSnapshot>,
}

impl HarvestEngine {
    pub fn new(
        config: HarvestConfig,
        collector: Arc<dyn Collector>,
        sink: Arc<dyn ReportSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (progress, _) = watch::channel(RunSnapshot::default());
        Self {
            config,
            collector,
            sink,
            notifier,
            progress,
        }
    }

    /// Live progress samples, refreshed twice a second while a run is active.
    pub fn progress(&self) -> watch::Receiver<RunSnapshot> {
        self.progress.subscribe()
    }

    pub async fn run(&self, mut targets: Vec<StoreTarget>) -> Result<RunSummary> {
        self.collector.ensure_ready().await.map_err(|err| {
            log::error!("Portal session is not usable: {}", err);
            err
        })?;

        if self.config.prioritize_by_inf_rate {
            crate::stores::prioritize_by_inf_rate(&mut targets);
        }

        let metrics = Arc::new(RunMetrics::new(targets.len()));
        if targets.is_empty() {
            log::warn!("No stores to harvest");
            let summary = metrics.summarize().await;
            self.notifier.summarize(&summary).await?;
            return Ok(summary);
        }

        let auto = &self.config.concurrency.auto;
        let initial = self.config.concurrency.initial;
        let governor = Arc::new(if auto.enabled {
            Governor::new(initial, auto.min_concurrency, auto.max_concurrency)
        } else {
            Governor::new(initial, initial, initial)
        });

        let jobs: Arc<TaskQueue<StoreTarget>> = Arc::new(TaskQueue::new());
        let submissions = Arc::new(TaskQueue::new());
        let total = targets.len();
        for target in targets {
            jobs.push(target).await;
        }

        let sampler = tokio::spawn(sample_progress(metrics.clone(), self.progress.clone()));
        let tuner = auto.enabled.then(|| {
            tokio::spawn(AutoTuner::new(auto.clone(), governor.clone(), metrics.clone()).run())
        });

        let mut submitters = Vec::new();
        for id in 0..self.config.num_submitters {
            submitters.push(tokio::spawn(worker::submission_worker(
                id,
                submissions.clone(),
                self.sink.clone(),
                metrics.clone(),
            )));
        }

        // The pool is sized for the controller's headroom; the governor keeps
        // the number of stores in flight at the current limit.
        let pool = governor.max_limit().min(total).max(1);
        log::info!(
            "Harvesting {} stores with {} workers (limit {})",
            total,
            pool,
            governor.limit().await
        );
        let retry = RetryPolicy::new(self.config.retry_count);
        let mut workers = Vec::new();
        for id in 0..pool {
            workers.push(tokio::spawn(worker::collection_worker(
                id,
                self.collector.clone(),
                jobs.clone(),
                submissions.clone(),
                governor.clone(),
                metrics.clone(),
                retry,
            )));
        }

        for handle in workers {
            if let Err(err) = handle.await {
                log::error!("Collection worker aborted: {}", err);
            }
        }

        // Workers that never obtained a session leave their jobs behind;
        // those stores still get a recorded outcome.
        while let Some(target) = jobs.try_pop().await {
            log::error!(
                "{}: never collected, no worker session available",
                target.store_name
            );
            metrics
                .record_failure(Failure::collection(&target.store_name))
                .await;
            jobs.task_done().await;
        }

        // Every queued report must reach the sink before the run ends.
        submissions.join().await;
        submissions.close().await;
        for handle in submitters {
            if let Err(err) = handle.await {
                log::error!("Submission worker aborted: {}", err);
            }
        }

        if let Some(handle) = tuner {
            handle.abort();
        }
        sampler.abort();
        self.progress.send_replace(metrics.snapshot().await);

        if let Err(err) = self.sink.close().await {
            log::error!("Sink close failed: {}", err);
        }

        let summary = metrics.summarize().await;
        self.notifier.summarize(&summary).await?;
        Ok(summary)
    }
}

async fn sample_progress(metrics: Arc<RunMetrics>, progress: watch::Sender<RunSnapshot>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;
        progress.send_replace(metrics.snapshot().await);
    }
}
