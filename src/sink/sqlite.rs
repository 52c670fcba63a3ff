use super::ReportSink;
use crate::collect::StoreReport;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// Inserts each report into a fixed-column SQLite table, creating the table
/// on first use.
pub struct SqliteSink {
    pool: SqlitePool,
    table: String,
}

impl SqliteSink {
    pub async fn new(path: PathBuf, table: String) -> Result<Self> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&conn_str).await?;

        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY,
                store TEXT NOT NULL,
                orders INTEGER NOT NULL,
                units INTEGER NOT NULL,
                fulfilled INTEGER NOT NULL,
                uph TEXT,
                inf TEXT,
                found TEXT,
                cancelled INTEGER NOT NULL,
                lates TEXT,
                time_available TEXT,
                submitted_at TEXT NOT NULL
            )",
            table
        );
        sqlx::query(&query).execute(&pool).await?;

        Ok(Self { pool, table })
    }
}

#[async_trait]
impl ReportSink for SqliteSink {
    async fn submit(&self, report: &StoreReport) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (store, orders, units, fulfilled, uph, inf, found, \
             cancelled, lates, time_available, submitted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            self.table
        );
        sqlx::query(&query)
            .bind(&report.store)
            .bind(report.orders as i64)
            .bind(report.units as i64)
            .bind(report.fulfilled as i64)
            .bind(&report.uph)
            .bind(&report.inf)
            .bind(&report.found)
            .bind(report.cancelled as i64)
            .bind(&report.lates)
            .bind(&report.time_available)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn inserts_reports_into_the_configured_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.db");
        let sink = SqliteSink::new(path.clone(), "store_metrics".to_string())
            .await
            .unwrap();

        sink.submit(&StoreReport {
            store: "Ripon".into(),
            orders: 9,
            units: 180,
            uph: "92".into(),
            ..StoreReport::default()
        })
        .await
        .unwrap();

        let row = sqlx::query("SELECT store, orders, units FROM store_metrics")
            .fetch_one(&sink.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("store"), "Ripon");
        assert_eq!(row.get::<i64, _>("orders"), 9);
        assert_eq!(row.get::<i64, _>("units"), 180);
        sink.close().await.unwrap();
    }
}
