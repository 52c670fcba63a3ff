use super::ReportSink;
use crate::collect::StoreReport;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Posts each report as a urlencoded form, translating report field names to
/// the remote form's opaque entry ids via the configured map.
pub struct FormSink {
    client: Client,
    url: String,
    field_map: HashMap<String, String>,
}

impl FormSink {
    pub fn new(url: String, field_map: HashMap<String, String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url,
            field_map,
        })
    }

    /// Form parameters for one report. Fields missing from the report are
    /// sent empty rather than omitted so the remote form's validation is
    /// deterministic.
    fn params(&self, report: &StoreReport) -> Result<Vec<(String, String)>> {
        let value = serde_json::to_value(report)?;
        let mut params: Vec<(String, String)> = self
            .field_map
            .iter()
            .map(|(field, entry)| {
                let text = match value.get(field) {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(v) => v.to_string(),
                };
                (entry.clone(), text)
            })
            .collect();
        params.sort();
        Ok(params)
    }
}

#[async_trait]
impl ReportSink for FormSink {
    async fn submit(&self, report: &StoreReport) -> Result<()> {
        let params = self.params(report)?;
        let response = self.client.post(&self.url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Submit {
                store: report.store.clone(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn field_map() -> HashMap<String, String> {
        HashMap::from([
            ("store".to_string(), "entry.101".to_string()),
            ("orders".to_string(), "entry.102".to_string()),
            ("inf".to_string(), "entry.103".to_string()),
        ])
    }

    fn report() -> StoreReport {
        StoreReport {
            store: "York".into(),
            orders: 7,
            inf: "2.0 %".into(),
            ..StoreReport::default()
        }
    }

    #[tokio::test]
    async fn posts_mapped_entries_as_a_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/formResponse"))
            .and(body_string_contains("entry.101=York"))
            .and(body_string_contains("entry.102=7"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = FormSink::new(format!("{}/formResponse", server.uri()), field_map()).unwrap();
        sink.submit(&report()).await.unwrap();
    }

    #[tokio::test]
    async fn rejection_surfaces_store_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sink = FormSink::new(format!("{}/formResponse", server.uri()), field_map()).unwrap();
        let err = sink.submit(&report()).await.unwrap_err();
        match err {
            Error::Submit { store, status } => {
                assert_eq!(store, "York");
                assert_eq!(status, 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unmapped_fields_are_sent_empty() {
        let mut map = field_map();
        map.insert("uph".to_string(), "entry.104".to_string());
        let sink = FormSink::new("http://unused/".into(), map).unwrap();
        let params = sink.params(&report()).unwrap();
        assert!(params.contains(&("entry.104".to_string(), String::new())));
    }
}
