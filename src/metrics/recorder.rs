use super::summary::{RunSnapshot, RunSummary};
use super::{Failure, FailureKind};
use crate::collect::StoreReport;
use std::collections::{BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// How far back a terminal failure still counts towards the failure rate.
pub const FAILURE_WINDOW: Duration = Duration::from_secs(60);

/// Shared run-scoped counters and timing lists. Workers append under the
/// lock; the controller and the end-of-run summary read from it.
pub struct RunMetrics {
    started: Instant,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    total_jobs: usize,
    collection_times: Vec<(String, Duration)>,
    submission_times: Vec<(String, Duration)>,
    retries: u64,
    retry_stores: BTreeSet<String>,
    total_orders: u64,
    total_units: u64,
    failures: Vec<Failure>,
    /// Timestamps of recent terminal collection failures, oldest first.
    failure_window: VecDeque<Instant>,
    submitted: Vec<StoreReport>,
}

impl RunMetrics {
    pub fn new(total_jobs: usize) -> Self {
        Self {
            started: Instant::now(),
            inner: Mutex::new(Inner {
                total_jobs,
                ..Inner::default()
            }),
        }
    }

    pub async fn record_collection(&self, store: &str, duration: Duration, orders: u64, units: u64) {
        let mut inner = self.inner.lock().await;
        inner.collection_times.push((store.to_string(), duration));
        inner.total_orders += orders;
        inner.total_units += units;
    }

    pub async fn record_retry(&self, store: &str) {
        let mut inner = self.inner.lock().await;
        inner.retries += 1;
        inner.retry_stores.insert(store.to_string());
    }

    /// Record a terminal failure. Collection exhaustion also feeds the
    /// rolling failure window the controller samples.
    pub async fn record_failure(&self, failure: Failure) {
        let mut inner = self.inner.lock().await;
        if failure.kind == FailureKind::Collection {
            inner.failure_window.push_back(Instant::now());
        }
        inner.failures.push(failure);
    }

    pub async fn record_submission(&self, duration: Duration, report: StoreReport) {
        let mut inner = self.inner.lock().await;
        inner
            .submission_times
            .push((report.store.clone(), duration));
        inner.submitted.push(report);
    }

    /// Prune window entries older than [`FAILURE_WINDOW`] and return how many
    /// remain.
    pub async fn recent_failures(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        while let Some(front) = inner.failure_window.front() {
            if now.duration_since(*front) > FAILURE_WINDOW {
                inner.failure_window.pop_front();
            } else {
                break;
            }
        }
        inner.failure_window.len()
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        let inner = self.inner.lock().await;
        let elapsed = self.started.elapsed().as_secs_f64();
        let submitted = inner.submitted.len() as u64;
        RunSnapshot {
            total_jobs: inner.total_jobs as u64,
            collected: inner.collection_times.len() as u64,
            submitted,
            failed: inner.failures.len() as u64,
            retries: inner.retries,
            elapsed_seconds: elapsed,
            stores_per_minute: if elapsed > 0.0 {
                submitted as f64 / (elapsed / 60.0)
            } else {
                0.0
            },
        }
    }

    pub async fn summarize(&self) -> RunSummary {
        let inner = self.inner.lock().await;
        let elapsed = self.started.elapsed().as_secs_f64();
        let total = inner.total_jobs;
        let submitted = inner.submitted.len();

        let avg_collection_seconds = average_seconds(&inner.collection_times);
        let avg_submission_seconds = average_seconds(&inner.submission_times);

        let mut sorted: Vec<f64> = inner
            .collection_times
            .iter()
            .map(|(_, d)| d.as_secs_f64())
            .collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let p95_collection_seconds = if sorted.is_empty() {
            0.0
        } else {
            let idx = ((sorted.len() as f64 * 0.95) as usize).min(sorted.len() - 1);
            sorted[idx]
        };

        let fastest = inner
            .collection_times
            .iter()
            .min_by(|a, b| a.1.cmp(&b.1))
            .map(|(s, d)| (s.clone(), d.as_secs_f64()));
        let slowest = inner
            .collection_times
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|(s, d)| (s.clone(), d.as_secs_f64()));

        let mut reports = inner.submitted.clone();
        reports.sort_by(|a, b| a.store.cmp(&b.store));

        RunSummary {
            total_jobs: total,
            collected: inner.collection_times.len(),
            submitted,
            success_rate: if total > 0 {
                submitted as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            stores_per_minute: if elapsed > 0.0 {
                submitted as f64 / (elapsed / 60.0)
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
            avg_collection_seconds,
            p95_collection_seconds,
            avg_submission_seconds,
            fastest_store: fastest,
            slowest_store: slowest,
            retries: inner.retries,
            retried_stores: inner.retry_stores.iter().cloned().collect(),
            total_orders: inner.total_orders,
            total_units: inner.total_units,
            failures: inner.failures.clone(),
            reports,
        }
    }
}

fn average_seconds(times: &[(String, Duration)]) -> f64 {
    if times.is_empty() {
        return 0.0;
    }
    times.iter().map(|(_, d)| d.as_secs_f64()).sum::<f64>() / times.len() as f64
}
