pub mod collect;
pub mod config;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod sink;
pub mod stores;

pub use collect::{Collector, CollectorSession, DashboardCollector, StoreReport};
pub use error::{Error, Result};
pub use metrics::{RunMetrics, RunSnapshot, RunSummary};
pub use pipeline::{Governor, HarvestEngine, RetryPolicy, TaskQueue};
pub use stores::StoreTarget;
