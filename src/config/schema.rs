use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HarvestConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,

    /// CSV file with one row per store account.
    #[serde(default = "default_stores_file")]
    pub stores_file: String,

    #[serde(default)]
    #[validate]
    pub portal: PortalConfig,

    #[serde(default)]
    #[validate]
    pub concurrency: ConcurrencyConfig,

    /// Attempts per store before it is recorded as failed.
    #[serde(default = "default_retry_count")]
    #[validate(range(min = 1))]
    pub retry_count: u32,

    #[serde(default = "default_num_submitters")]
    #[validate(range(min = 1))]
    pub num_submitters: usize,

    /// Sort the job list by prior INF rate (worst first) before enqueueing.
    #[serde(default)]
    pub prioritize_by_inf_rate: bool,

    #[serde(default)]
    pub sink: Option<SinkConfig>,

    /// Chat webhook that receives the end-of-run summary card.
    #[serde(default)]
    pub report_webhook_url: Option<String>,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    #[validate(url)]
    pub base_url: String,

    /// Persisted cookie jar from a prior authenticated session.
    #[serde(default = "default_storage_state")]
    pub storage_state: String,

    /// Path probed once per run to confirm the session is still valid.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,

    /// Per-store dashboard metrics endpoint.
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    #[serde(default = "default_page_timeout")]
    pub page_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_initial_concurrency")]
    #[validate(range(min = 1))]
    pub initial: usize,

    #[serde(default)]
    #[validate]
    pub auto: AutoConfig,
}

/// Bounds and thresholds for the adaptive concurrency controller.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_auto"))]
pub struct AutoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_min_concurrency")]
    #[validate(range(min = 1))]
    pub min_concurrency: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_cpu_upper")]
    pub cpu_upper_threshold: f32,

    #[serde(default = "default_cpu_lower")]
    pub cpu_lower_threshold: f32,

    #[serde(default = "default_mem_upper")]
    pub mem_upper_threshold: f32,

    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,

    #[serde(default = "default_cooldown")]
    pub cooldown_seconds: u64,

    /// Recent-failure fraction above which the limit is halved.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,

    /// Per-worker per-minute throughput assumed when estimating the failure
    /// rate. A rough heuristic, not a measured figure.
    #[serde(default = "default_ops_per_worker_minute")]
    #[validate(range(min = 1))]
    pub ops_per_worker_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Console,
    Form {
        url: String,
        /// Report field name -> remote form entry id.
        field_map: HashMap<String, String>,
    },
    Jsonl {
        path: String,
    },
    Sqlite {
        path: String,
        #[serde(default = "default_table_name")]
        table: String,
    },
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            storage_state: default_storage_state(),
            probe_path: default_probe_path(),
            metrics_path: default_metrics_path(),
            page_timeout_ms: default_page_timeout(),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial: default_initial_concurrency(),
            auto: AutoConfig::default(),
        }
    }
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_concurrency(),
            cpu_upper_threshold: default_cpu_upper(),
            cpu_lower_threshold: default_cpu_lower(),
            mem_upper_threshold: default_mem_upper(),
            check_interval_seconds: default_check_interval(),
            cooldown_seconds: default_cooldown(),
            failure_rate_threshold: default_failure_rate_threshold(),
            ops_per_worker_minute: default_ops_per_worker_minute(),
        }
    }
}

fn validate_auto(auto: &AutoConfig) -> Result<(), ValidationError> {
    if auto.min_concurrency > auto.max_concurrency {
        return Err(ValidationError::new("concurrency_bounds"));
    }
    if auto.cpu_lower_threshold >= auto.cpu_upper_threshold {
        return Err(ValidationError::new("cpu_thresholds"));
    }
    Ok(())
}

fn default_stores_file() -> String {
    "stores.csv".to_string()
}

fn default_base_url() -> String {
    "https://sellercentral.amazon.co.uk".to_string()
}

fn default_storage_state() -> String {
    "state.json".to_string()
}

fn default_probe_path() -> String {
    "/home".to_string()
}

fn default_metrics_path() -> String {
    "/snowdash/api/summationMetrics".to_string()
}

fn default_page_timeout() -> u64 {
    30_000
}

fn default_initial_concurrency() -> usize {
    4
}

fn default_retry_count() -> u32 {
    3
}

fn default_num_submitters() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_concurrency() -> usize {
    20
}

fn default_cpu_upper() -> f32 {
    90.0
}

fn default_cpu_lower() -> f32 {
    65.0
}

fn default_mem_upper() -> f32 {
    90.0
}

fn default_check_interval() -> u64 {
    5
}

fn default_cooldown() -> u64 {
    15
}

fn default_failure_rate_threshold() -> f64 {
    0.05
}

fn default_ops_per_worker_minute() -> u32 {
    30
}

fn default_table_name() -> String {
    "store_metrics".to_string()
}
