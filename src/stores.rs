use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One store account to harvest. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreTarget {
    pub store_number: String,
    pub store_name: String,
    /// Portal routing identifiers.
    pub merchant_id: String,
    pub marketplace_id: String,
    /// Prior item-not-found rate, only used to prioritize the job order.
    #[serde(default)]
    pub inf_rate: Option<f64>,
}

/// Load the store list from a CSV file with columns
/// `store_number, merchant_id, legacy_id, store_name, marketplace_id` and an
/// optional trailing `inf_rate` column.
///
/// Malformed rows are skipped with a warning; a missing file is fatal.
pub fn load_stores<P: AsRef<Path>>(path: P) -> Result<Vec<StoreTarget>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        Error::Stores(format!("cannot open store list {}: {}", path.display(), e))
    })?;

    let mut targets = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping unreadable row {} in {}: {}", i + 2, path.display(), e);
                continue;
            }
        };

        if record.len() < 5 {
            log::warn!(
                "Skipping malformed row {} in {}: expected 5 columns, got {}",
                i + 2,
                path.display(),
                record.len()
            );
            continue;
        }

        let target = StoreTarget {
            store_number: record[0].trim().to_string(),
            merchant_id: record[1].trim().to_string(),
            store_name: record[3].trim().to_string(),
            marketplace_id: record[4].trim().to_string(),
            inf_rate: record.get(5).and_then(|v| v.trim().parse().ok()),
        };

        if target.store_name.is_empty() || target.merchant_id.is_empty() {
            log::warn!(
                "Skipping row {} in {}: missing store name or merchant id",
                i + 2,
                path.display()
            );
            continue;
        }

        targets.push(target);
    }

    log::info!("{} stores loaded from {}", targets.len(), path.display());
    Ok(targets)
}

/// Order jobs worst-INF-first so the most problematic stores are collected
/// earliest in the run. Targets without a prior rate keep their position at
/// the back.
pub fn prioritize_by_inf_rate(targets: &mut [StoreTarget]) {
    targets.sort_by(|a, b| {
        let a_rate = a.inf_rate.unwrap_or(f64::NEG_INFINITY);
        let b_rate = b.inf_rate.unwrap_or(f64::NEG_INFINITY);
        b_rate.partial_cmp(&a_rate).unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_valid_rows_and_skips_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "store_number,merchant_id,legacy_id,store_name,marketplace_id").unwrap();
        writeln!(file, "066,A1XYZ,old1,Morrisons - Leeds,MK1").unwrap();
        writeln!(file, "only,two").unwrap();
        writeln!(file, "067,A2XYZ,old2,Morrisons - York,MK1").unwrap();

        let targets = load_stores(&path).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].store_name, "Morrisons - Leeds");
        assert_eq!(targets[1].marketplace_id, "MK1");
        assert_eq!(targets[0].inf_rate, None);
    }

    #[test]
    fn optional_inf_rate_column_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "store_number,merchant_id,legacy_id,store_name,marketplace_id,inf_rate"
        )
        .unwrap();
        writeln!(file, "066,A1XYZ,old1,Morrisons - Leeds,MK1,2.4").unwrap();
        writeln!(file, "067,A2XYZ,old2,Morrisons - York,MK1,").unwrap();

        let targets = load_stores(&path).unwrap();
        assert_eq!(targets[0].inf_rate, Some(2.4));
        assert_eq!(targets[1].inf_rate, None);
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_stores("definitely_missing.csv").unwrap_err();
        assert!(matches!(err, Error::Stores(_)));
    }

    #[test]
    fn empty_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stores.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "store_number,merchant_id,legacy_id,store_name,marketplace_id").unwrap();

        let targets = load_stores(&path).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn prioritization_puts_worst_inf_first() {
        let mk = |name: &str, rate: Option<f64>| StoreTarget {
            store_number: "1".into(),
            store_name: name.into(),
            merchant_id: "m".into(),
            marketplace_id: "mk".into(),
            inf_rate: rate,
        };
        let mut targets = vec![
            mk("low", Some(0.5)),
            mk("none", None),
            mk("high", Some(4.2)),
        ];
        prioritize_by_inf_rate(&mut targets);
        assert_eq!(targets[0].store_name, "high");
        assert_eq!(targets[1].store_name, "low");
        assert_eq!(targets[2].store_name, "none");
    }
}
