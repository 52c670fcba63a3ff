use crate::error::{Error, Result};
use crate::metrics::RunSummary;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Receives the end-of-run summary exactly once per run.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn summarize(&self, summary: &RunSummary) -> Result<()>;
}

/// Default notifier: writes the summary to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn summarize(&self, summary: &RunSummary) -> Result<()> {
        log::info!(
            "Run complete: {}/{} submitted ({:.1}%), {:.1} stores/min in {:.1}s",
            summary.submitted,
            summary.total_jobs,
            summary.success_rate,
            summary.stores_per_minute,
            summary.elapsed_seconds
        );
        log::info!(
            "Timing: avg {:.2}s, p95 {:.2}s collection, avg {:.2}s submission",
            summary.avg_collection_seconds,
            summary.p95_collection_seconds,
            summary.avg_submission_seconds
        );
        log::info!(
            "Volume: {} orders, {} units, {} retries across {} stores",
            summary.total_orders,
            summary.total_units,
            summary.retries,
            summary.retried_stores.len()
        );
        for failure in &summary.failures {
            log::warn!("Failed: {}", failure);
        }
        Ok(())
    }
}

/// Posts a chat card to the configured webhook.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, url })
    }

    fn card(summary: &RunSummary) -> Value {
        let status = if summary.failures.is_empty() {
            "Job Completed Successfully".to_string()
        } else {
            format!("Job Completed with {} Failures", summary.failures.len())
        };

        let stat = |label: &str, text: String| {
            json!({ "decoratedText": { "topLabel": label, "text": text } })
        };

        let mut widgets = vec![
            stat(
                "Success Rate",
                format!(
                    "{}/{} ({:.1}%)",
                    summary.submitted, summary.total_jobs, summary.success_rate
                ),
            ),
            stat(
                "Throughput",
                format!("{:.1} stores/min", summary.stores_per_minute),
            ),
            stat("Duration", format!("{:.1}s", summary.elapsed_seconds)),
            stat("Total Orders", summary.total_orders.to_string()),
            stat("Total Units", summary.total_units.to_string()),
            stat(
                "Retries",
                format!(
                    "{} across {} stores",
                    summary.retries,
                    summary.retried_stores.len()
                ),
            ),
            stat(
                "Collection",
                format!(
                    "avg {:.2}s, p95 {:.2}s",
                    summary.avg_collection_seconds, summary.p95_collection_seconds
                ),
            ),
        ];
        if let Some((store, seconds)) = &summary.fastest_store {
            widgets.push(stat("Fastest Store", format!("{} ({:.2}s)", store, seconds)));
        }
        if let Some((store, seconds)) = &summary.slowest_store {
            widgets.push(stat("Slowest Store", format!("{} ({:.2}s)", store, seconds)));
        }
        if !summary.failures.is_empty() {
            let listed: Vec<String> = summary.failures.iter().map(|f| f.to_string()).collect();
            widgets.push(json!({ "textParagraph": { "text": listed.join("\n") } }));
        }

        json!({
            "cardsV2": [{
                "cardId": "run-summary",
                "card": {
                    "header": { "title": status },
                    "sections": [{ "widgets": widgets }]
                }
            }]
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn summarize(&self, summary: &RunSummary) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::card(summary))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "summary webhook returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
