use crate::collect::StoreReport;
use crate::config::SinkConfig;
use crate::error::Result;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;

pub mod console;
pub mod form;
pub mod jsonl;
pub mod sqlite;

pub use console::ConsoleSink;
pub use form::FormSink;
pub use jsonl::JsonlSink;
pub use sqlite::SqliteSink;

/// Destination for collected reports. Shared by every submission worker, so
/// implementations guard their own state.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn submit(&self, report: &StoreReport) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the sink named by the configuration; no configuration means the
/// console.
pub async fn from_config(
    config: Option<&SinkConfig>,
    multi: Option<Arc<MultiProgress>>,
) -> Result<Arc<dyn ReportSink>> {
    let sink: Arc<dyn ReportSink> = match config {
        None | Some(SinkConfig::Console) => Arc::new(ConsoleSink::new(multi)),
        Some(SinkConfig::Form { url, field_map }) => {
            Arc::new(FormSink::new(url.clone(), field_map.clone())?)
        }
        Some(SinkConfig::Jsonl { path }) => Arc::new(JsonlSink::new(PathBuf::from(path))?),
        Some(SinkConfig::Sqlite { path, table }) => {
            Arc::new(SqliteSink::new(PathBuf::from(path), table.clone()).await?)
        }
    };
    Ok(sink)
}
