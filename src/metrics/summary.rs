use super::Failure;
use crate::collect::StoreReport;
use serde::Serialize;

/// Lightweight progress sample for the live progress bar.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSnapshot {
    pub total_jobs: u64,
    pub collected: u64,
    pub submitted: u64,
    pub failed: u64,
    pub retries: u64,
    pub elapsed_seconds: f64,
    pub stores_per_minute: f64,
}

/// Full end-of-run accounting, computed once after the submission queue has
/// drained.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_jobs: usize,
    pub collected: usize,
    pub submitted: usize,
    pub success_rate: f64,
    pub stores_per_minute: f64,
    pub elapsed_seconds: f64,
    pub avg_collection_seconds: f64,
    pub p95_collection_seconds: f64,
    pub avg_submission_seconds: f64,
    pub fastest_store: Option<(String, f64)>,
    pub slowest_store: Option<(String, f64)>,
    pub retries: u64,
    pub retried_stores: Vec<String>,
    pub total_orders: u64,
    pub total_units: u64,
    pub failures: Vec<Failure>,
    /// Submitted reports, sorted by store name.
    pub reports: Vec<StoreReport>,
}

impl RunSummary {
    /// Every job ends as exactly one recorded outcome.
    pub fn accounted_jobs(&self) -> usize {
        self.collected
            + self
                .failures
                .iter()
                .filter(|f| {
                    matches!(
                        f.kind,
                        super::FailureKind::Collection | super::FailureKind::MissingRouting
                    )
                })
                .count()
    }
}
