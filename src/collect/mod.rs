use crate::error::Result;
use crate::stores::StoreTarget;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod dashboard;

pub use dashboard::DashboardCollector;

/// The record produced by one successful collection. Every field carries a
/// safe default so a sparse remote payload never propagates nulls downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreReport {
    pub store: String,
    #[serde(default)]
    pub orders: u64,
    #[serde(default)]
    pub units: u64,
    #[serde(default)]
    pub fulfilled: u64,
    /// Units per hour, rounded for display.
    #[serde(default)]
    pub uph: String,
    /// Item-not-found rate, formatted `x.x %`.
    #[serde(default)]
    pub inf: String,
    #[serde(default)]
    pub found: String,
    #[serde(default)]
    pub cancelled: u64,
    #[serde(default)]
    pub lates: String,
    /// Available picker time as `H:MM`.
    #[serde(default)]
    pub time_available: String,
    /// Raw remote payload, kept for downstream calculation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Provides per-worker collection sessions against the remote portal.
///
/// `ensure_ready` is called once before any worker starts; a failure there
/// aborts the whole run. Each worker then owns exactly one session for its
/// lifetime, so a wedged session can never corrupt a sibling worker.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn ensure_ready(&self) -> Result<()>;

    async fn open_session(&self) -> Result<Box<dyn CollectorSession>>;
}

#[async_trait]
pub trait CollectorSession: Send {
    /// Fetch the metrics for one store. Collection workers wrap this call
    /// with their own retry policy; implementations should not loop.
    async fn fetch(&mut self, target: &StoreTarget) -> Result<StoreReport>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
