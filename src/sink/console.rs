use super::ReportSink;
use crate::collect::StoreReport;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::sync::Arc;

/// Prints one line per report, routed through the shared progress area when
/// one is active so the bar is not garbled.
pub struct ConsoleSink {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleSink {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }

    fn line(report: &StoreReport) -> String {
        format!(
            "{}: {} orders, {} units, UPH {}, INF {}, available {}",
            report.store,
            report.orders,
            report.units,
            report.uph,
            report.inf,
            report.time_available
        )
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl ReportSink for ConsoleSink {
    async fn submit(&self, report: &StoreReport) -> Result<()> {
        let line = Self::line(report);
        if let Some(multi) = &self.multi {
            multi
                .println(&line)
                .map_err(|e| Error::Internal(e.to_string()))?;
        } else {
            println!("{}", line);
        }
        Ok(())
    }
}
