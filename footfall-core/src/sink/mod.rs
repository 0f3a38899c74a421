//! src/sink/mod.rs
//!
//! Secondary measurement mirror. Page views and custom events are copied to
//! a GA4-style Measurement Protocol endpoint when credentials are
//! configured; otherwise the no-op sink swallows everything. The visitor id
//! doubles as the sink's client id, so both systems see the same visitor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use footfall_common::Error;
use footfall_common::traits::sink_traits::{MeasurementEvent, MeasurementSink};

use crate::config::MeasurementConfig;
use crate::http::HttpClient;

const COLLECT_ENDPOINT: &str = "https://www.google-analytics.com/mp/collect";

pub struct GaMeasurementSink {
    http: Arc<dyn HttpClient>,
    measurement_id: String,
    api_secret: String,
    endpoint: String,
    timeout: Duration,
}

impl GaMeasurementSink {
    pub fn new(config: &MeasurementConfig, http: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            http,
            measurement_id: config.measurement_id.clone(),
            api_secret: config.api_secret.clone(),
            endpoint: COLLECT_ENDPOINT.to_string(),
            timeout,
        }
    }

    /// Point the sink somewhere else (a capture server in tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn collect_url(&self) -> String {
        format!(
            "{}?measurement_id={}&api_secret={}",
            self.endpoint, self.measurement_id, self.api_secret
        )
    }

    async fn send(&self, client_id: &str, event: serde_json::Value) -> Result<(), Error> {
        let body = json!({
            "client_id": client_id,
            "events": [event],
        });
        let resp = self.http.post_json(self.collect_url(), body, self.timeout).await?;
        if !resp.is_success() {
            return Err(Error::Backend(format!(
                "measurement endpoint returned status {}",
                resp.status
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MeasurementSink for GaMeasurementSink {
    async fn record_page_view(
        &self,
        client_id: &str,
        page_url: &str,
        page_title: &str,
    ) -> Result<(), Error> {
        self.send(
            client_id,
            json!({
                "name": "page_view",
                "params": {
                    "page_location": page_url,
                    "page_title": page_title,
                }
            }),
        )
        .await
    }

    async fn record_event(&self, client_id: &str, event: &MeasurementEvent) -> Result<(), Error> {
        let mut params = serde_json::Map::new();
        params.insert("event_category".into(), json!(event.category));
        if let Some(ref label) = event.label {
            params.insert("event_label".into(), json!(label));
        }
        if let Some(value) = event.value {
            params.insert("value".into(), json!(value));
        }
        self.send(
            client_id,
            json!({
                "name": event.action,
                "params": params,
            }),
        )
        .await
    }
}

/// Sink used when no measurement credentials are configured.
pub struct NoopSink;

#[async_trait]
impl MeasurementSink for NoopSink {
    async fn record_page_view(&self, _: &str, page_url: &str, _: &str) -> Result<(), Error> {
        debug!("[Sink] no sink configured => page view {} dropped", page_url);
        Ok(())
    }

    async fn record_event(&self, _: &str, event: &MeasurementEvent) -> Result<(), Error> {
        debug!("[Sink] no sink configured => event {} dropped", event.action);
        Ok(())
    }
}

/// Pick the sink for a config: GA-style when credentials exist, no-op
/// otherwise.
pub fn sink_from_config(
    measurement: Option<&MeasurementConfig>,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
) -> Arc<dyn MeasurementSink> {
    match measurement {
        Some(cfg) => Arc::new(GaMeasurementSink::new(cfg, http, timeout)),
        None => Arc::new(NoopSink),
    }
}
