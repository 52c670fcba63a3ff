use super::ReportSink;
use crate::collect::StoreReport;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Appends one JSON object per line, stamped with the submission time so
/// runs on consecutive days can share a file.
pub struct JsonlSink {
    file: Mutex<File>,
}

impl JsonlSink {
    pub fn new(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ReportSink for JsonlSink {
    async fn submit(&self, report: &StoreReport) -> Result<()> {
        let mut value = serde_json::to_value(report)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "submitted_at".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        let mut file = self.file.lock().await;
        writeln!(file, "{}", serde_json::to_string(&value)?)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.file.lock().await.flush()?;
        Ok(())
    }
}
