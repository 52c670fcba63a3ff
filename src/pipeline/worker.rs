use super::governor::Governor;
use super::queue::TaskQueue;
use crate::collect::{Collector, CollectorSession, StoreReport};
use crate::error::Error;
use crate::metrics::{Failure, RunMetrics};
use crate::sink::ReportSink;
use crate::stores::StoreTarget;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

/// Exponential backoff retry schedule for collection attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Delay after the given zero-based failed attempt: `2^attempt` seconds
    /// (1s, 2s, 4s, ...), capped at 64s from the seventh attempt on.
    pub fn backoff(attempt: u32) -> Duration {
        Duration::from_secs(1u64 << attempt.min(6))
    }
}

enum FetchState {
    Attempting { attempt: u32 },
    Done,
    Exhausted,
}

/// One collection worker. Opens its own session, then drains the job queue:
/// each job is admitted through the governor, fetched with retries, and ends
/// as either a queued submission or a recorded failure. The slot release and
/// the queue accounting run even if the job panics.
pub async fn collection_worker(
    id: usize,
    collector: Arc<dyn Collector>,
    jobs: Arc<TaskQueue<StoreTarget>>,
    submissions: Arc<TaskQueue<StoreReport>>,
    governor: Arc<Governor>,
    metrics: Arc<RunMetrics>,
    retry: RetryPolicy,
) {
    let mut session = match collector.open_session().await {
        Ok(session) => session,
        Err(err) => {
            log::error!("Worker {}: could not open a session: {}", id, err);
            return;
        }
    };
    log::debug!("Worker {} started", id);

    while let Some(target) = jobs.try_pop().await {
        governor.acquire().await;
        let outcome = AssertUnwindSafe(process_target(
            session.as_mut(),
            &target,
            &submissions,
            &metrics,
            retry,
        ))
        .catch_unwind()
        .await;
        governor.release().await;
        jobs.task_done().await;

        if outcome.is_err() {
            log::error!("Worker {}: panicked on {}", id, target.store_name);
            metrics
                .record_failure(Failure::collection(&target.store_name))
                .await;
        }
    }

    if let Err(err) = session.close().await {
        log::debug!("Worker {}: session close failed: {}", id, err);
    }
    log::debug!("Worker {} finished", id);
}

/// Collect one store, retrying with exponential backoff. Success pushes the
/// report onto the submission queue; exhaustion records a terminal failure.
async fn process_target(
    session: &mut dyn CollectorSession,
    target: &StoreTarget,
    submissions: &TaskQueue<StoreReport>,
    metrics: &RunMetrics,
    retry: RetryPolicy,
) {
    if target.marketplace_id.trim().is_empty() {
        log::warn!("{}: no marketplace id, skipping", target.store_name);
        metrics
            .record_failure(Failure::missing_routing(&target.store_name))
            .await;
        return;
    }

    let mut state = FetchState::Attempting { attempt: 0 };
    loop {
        match state {
            FetchState::Attempting { attempt } => {
                let start = Instant::now();
                match session.fetch(target).await {
                    Ok(report) => {
                        let took = start.elapsed();
                        log::info!(
                            "{}: collected in {:.1}s ({} orders, {} units)",
                            target.store_name,
                            took.as_secs_f64(),
                            report.orders,
                            report.units
                        );
                        metrics
                            .record_collection(
                                &target.store_name,
                                took,
                                report.orders,
                                report.units,
                            )
                            .await;
                        submissions.push(report).await;
                        state = FetchState::Done;
                    }
                    Err(err) => {
                        let next = attempt + 1;
                        if next < retry.max_attempts {
                            log::warn!(
                                "{}: attempt {}/{} failed: {}",
                                target.store_name,
                                next,
                                retry.max_attempts,
                                err
                            );
                            metrics.record_retry(&target.store_name).await;
                            sleep(RetryPolicy::backoff(attempt)).await;
                            state = FetchState::Attempting { attempt: next };
                        } else {
                            log::error!(
                                "{}: all {} attempts failed: {}",
                                target.store_name,
                                retry.max_attempts,
                                err
                            );
                            state = FetchState::Exhausted;
                        }
                    }
                }
            }
            FetchState::Done => return,
            FetchState::Exhausted => {
                metrics
                    .record_failure(Failure::collection(&target.store_name))
                    .await;
                return;
            }
        }
    }
}

/// One submission worker. Pops reports until the queue is closed and drained,
/// delivering each to the sink. A rejected or failed submission is recorded
/// but never stops the worker.
pub async fn submission_worker(
    id: usize,
    submissions: Arc<TaskQueue<StoreReport>>,
    sink: Arc<dyn ReportSink>,
    metrics: Arc<RunMetrics>,
) {
    while let Some(report) = submissions.pop().await {
        let start = Instant::now();
        match sink.submit(&report).await {
            Ok(()) => {
                log::debug!("Submitter {}: delivered {}", id, report.store);
                metrics.record_submission(start.elapsed(), report).await;
            }
            Err(Error::Submit { store, status }) => {
                log::error!("Submitter {}: {} rejected with HTTP {}", id, store, status);
                metrics.record_failure(Failure::submission(store, status)).await;
            }
            Err(err) => {
                log::error!("Submitter {}: {} failed: {}", id, report.store, err);
                metrics
                    .record_failure(Failure::submission_error(&report.store))
                    .await;
            }
        }
        submissions.task_done().await;
    }
    log::debug!("Submitter {} finished", id);
}
