use super::{Collector, CollectorSession, StoreReport};
use crate::config::PortalConfig;
use crate::error::{Error, Result};
use crate::stores::StoreTarget;
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Cookie entry from a persisted storage-state file, as written by the
/// interactive login helper.
#[derive(Debug, Clone, Deserialize)]
struct StoredCookie {
    name: String,
    value: String,
    #[serde(default)]
    domain: String,
    #[serde(default = "default_cookie_path")]
    path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct StorageState {
    #[serde(default)]
    cookies: Vec<StoredCookie>,
}

/// Collects per-store dashboard metrics over authenticated HTTP.
///
/// The authentication flow itself is out of scope here: the collector only
/// replays cookies from a storage-state file and verifies they still grant
/// access. Each worker session gets its own client and cookie jar.
pub struct DashboardCollector {
    portal: PortalConfig,
    cookies: Vec<StoredCookie>,
}

impl DashboardCollector {
    pub fn new(portal: PortalConfig) -> Result<Self> {
        let content = fs::read_to_string(&portal.storage_state).map_err(|e| {
            Error::Session(format!(
                "cannot read storage state {}: {}",
                portal.storage_state, e
            ))
        })?;
        let state: StorageState = serde_json::from_str(&content)
            .map_err(|e| Error::Session(format!("malformed storage state: {}", e)))?;

        if state.cookies.is_empty() {
            log::warn!("Storage state has no cookies; the session probe will likely fail");
        }

        Ok(Self {
            portal,
            cookies: state.cookies,
        })
    }

    fn build_client(&self) -> Result<Client> {
        let jar = Arc::new(Jar::default());
        for cookie in &self.cookies {
            let host = cookie.domain.trim_start_matches('.');
            if host.is_empty() {
                continue;
            }
            let url = Url::parse(&format!("https://{}", host))?;
            jar.add_cookie_str(
                &format!(
                    "{}={}; Domain={}; Path={}",
                    cookie.name, cookie.value, cookie.domain, cookie.path
                ),
                &url,
            );
        }

        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(Duration::from_millis(self.portal.page_timeout_ms))
            .user_agent("storepulse/0.1")
            .build()?;
        Ok(client)
    }

}

#[async_trait]
impl Collector for DashboardCollector {
    async fn ensure_ready(&self) -> Result<()> {
        let client = self.build_client()?;
        let base = Url::parse(&self.portal.base_url)?;
        let probe = base.join(&self.portal.probe_path)?;

        log::info!("Verifying session by probing {}", probe);
        let response = client.get(probe).send().await?;
        let final_url = response.url().clone();
        let status = response.status();

        if is_signin_url(&final_url) {
            return Err(Error::Session(format!(
                "probe was redirected to the sign-in page ({})",
                final_url
            )));
        }
        if !status.is_success() {
            return Err(Error::Session(format!(
                "session probe returned status {}",
                status
            )));
        }
        log::info!("Session is valid");
        Ok(())
    }

    async fn open_session(&self) -> Result<Box<dyn CollectorSession>> {
        let client = self.build_client()?;
        Ok(Box::new(DashboardSession {
            client,
            base: Url::parse(&self.portal.base_url)?,
            metrics_path: self.portal.metrics_path.clone(),
        }))
    }
}

struct DashboardSession {
    client: Client,
    base: Url,
    metrics_path: String,
}

impl DashboardSession {
    fn metrics_url(&self, target: &StoreTarget) -> Result<Url> {
        let mut url = self.base.join(&self.metrics_path)?;
        url.query_pairs_mut()
            .append_pair("cor", "mmp_EU")
            .append_pair("mons_sel_dir_mcid", &target.merchant_id)
            .append_pair("mons_sel_mkid", &target.marketplace_id);
        Ok(url)
    }
}

#[async_trait]
impl CollectorSession for DashboardSession {
    async fn fetch(&mut self, target: &StoreTarget) -> Result<StoreReport> {
        let url = self.metrics_url(target)?;
        let response = self.client.get(url).send().await?;

        if is_signin_url(response.url()) {
            return Err(Error::Session(
                "metrics request was redirected to the sign-in page".to_string(),
            ));
        }
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!(
                "{}: metrics endpoint returned status {}",
                target.store_name, status
            )));
        }

        let payload: Value = response.json().await?;
        Ok(report_from_payload(&target.store_name, payload))
    }
}

fn is_signin_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.contains("signin") || path.starts_with("/ap/")
}

/// Remote summation payload. Every field defaults to zero so a sparse
/// response still yields a complete report.
#[derive(Debug, Default, Deserialize)]
struct SummationMetrics {
    #[serde(default, rename = "OrdersShopped_V2")]
    orders: f64,
    #[serde(default, rename = "RequestedQuantity_V2")]
    units: f64,
    #[serde(default, rename = "PickedUnits_V2")]
    fulfilled: f64,
    #[serde(default, rename = "AverageUPH_V2")]
    uph: f64,
    #[serde(default, rename = "ItemNotFoundRate_V2")]
    inf_rate: f64,
    #[serde(default, rename = "ItemFoundRate_V2")]
    found_rate: f64,
    #[serde(default, rename = "ShortedUnits_V2")]
    cancelled: f64,
    #[serde(default, rename = "LatePickRate_V2")]
    late_rate: f64,
    #[serde(default, rename = "TimeAvailable_V2")]
    time_available_ms: f64,
}

pub(crate) fn report_from_payload(store_name: &str, payload: Value) -> StoreReport {
    let metrics: SummationMetrics =
        serde_json::from_value(payload.clone()).unwrap_or_default();

    StoreReport {
        store: store_name.to_string(),
        orders: metrics.orders.max(0.0) as u64,
        units: metrics.units.max(0.0) as u64,
        fulfilled: metrics.fulfilled.max(0.0) as u64,
        uph: format!("{:.0}", metrics.uph),
        inf: format_rate(metrics.inf_rate),
        found: format_rate(metrics.found_rate),
        cancelled: metrics.cancelled.max(0.0) as u64,
        lates: format_rate(metrics.late_rate),
        time_available: format_time_available(metrics.time_available_ms),
        raw: Some(payload),
    }
}

fn format_rate(rate: f64) -> String {
    format!("{:.1} %", rate)
}

/// Millisecond count from the API rendered as `H:MM`.
fn format_time_available(milliseconds: f64) -> String {
    let total_seconds = (milliseconds / 1000.0) as i64;
    let total_minutes = total_seconds.abs() / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    format!("{}:{:02}", hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn time_available_formats_as_hours_minutes() {
        assert_eq!(format_time_available(0.0), "0:00");
        assert_eq!(format_time_available(3_600_000.0), "1:00");
        assert_eq!(format_time_available(5_430_000.0), "1:30");
        // Negative adjustments still render a positive duration.
        assert_eq!(format_time_available(-600_000.0), "0:10");
    }

    #[test]
    fn full_payload_maps_to_report() {
        let payload = json!({
            "OrdersShopped_V2": 42,
            "RequestedQuantity_V2": 310,
            "PickedUnits_V2": 301,
            "AverageUPH_V2": 87.6,
            "ItemNotFoundRate_V2": 2.44,
            "ItemFoundRate_V2": 97.56,
            "ShortedUnits_V2": 4,
            "LatePickRate_V2": 1.2,
            "TimeAvailable_V2": 27_000_000.0,
        });

        let report = report_from_payload("Morrisons - Leeds", payload);
        assert_eq!(report.store, "Morrisons - Leeds");
        assert_eq!(report.orders, 42);
        assert_eq!(report.units, 310);
        assert_eq!(report.fulfilled, 301);
        assert_eq!(report.uph, "88");
        assert_eq!(report.inf, "2.4 %");
        assert_eq!(report.found, "97.6 %");
        assert_eq!(report.cancelled, 4);
        assert_eq!(report.lates, "1.2 %");
        assert_eq!(report.time_available, "7:30");
        assert!(report.raw.is_some());
    }

    #[test]
    fn sparse_payload_gets_safe_defaults() {
        let report = report_from_payload("Morrisons - York", json!({"OrdersShopped_V2": 7}));
        assert_eq!(report.orders, 7);
        assert_eq!(report.units, 0);
        assert_eq!(report.inf, "0.0 %");
        assert_eq!(report.time_available, "0:00");
    }

    #[tokio::test]
    async fn fetch_and_probe_against_mock_portal() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(ResponseTemplate::new(200).set_body_string("dashboard"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/snowdash/api/summationMetrics"))
            .and(query_param("mons_sel_dir_mcid", "A1XYZ"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "OrdersShopped_V2": 3,
                "RequestedQuantity_V2": 20,
            })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        std::fs::write(&state, r#"{"cookies": []}"#).unwrap();

        let portal = PortalConfig {
            base_url: server.uri(),
            storage_state: state.to_string_lossy().into_owned(),
            ..PortalConfig::default()
        };

        let collector = DashboardCollector::new(portal).unwrap();
        collector.ensure_ready().await.unwrap();

        let mut session = collector.open_session().await.unwrap();
        let target = StoreTarget {
            store_number: "066".into(),
            store_name: "Morrisons - Leeds".into(),
            merchant_id: "A1XYZ".into(),
            marketplace_id: "MK1".into(),
            inf_rate: None,
        };
        let report = session.fetch(&target).await.unwrap();
        assert_eq!(report.orders, 3);
        assert_eq!(report.units, 20);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn probe_redirected_to_signin_fails_readiness() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/home"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("Location", "/ap/signin"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ap/signin"))
            .respond_with(ResponseTemplate::new(200).set_body_string("login"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state.json");
        std::fs::write(&state, r#"{"cookies": []}"#).unwrap();

        let portal = PortalConfig {
            base_url: server.uri(),
            storage_state: state.to_string_lossy().into_owned(),
            ..PortalConfig::default()
        };

        let collector = DashboardCollector::new(portal).unwrap();
        let err = collector.ensure_ready().await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }
}
