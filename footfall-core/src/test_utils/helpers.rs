// File: footfall-core/src/test_utils/helpers.rs

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use footfall_common::Error;

use crate::config::AnalyticsConfig;
use crate::http::{HttpClient, HttpResponse};

/// One request captured by `RecordingHttpClient`, in arrival order.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

/// An `HttpClient` double that records every request and answers from a
/// scripted table. Responses resolve immediately, which keeps paused-clock
/// tests deterministic.
///
/// Matching is by URL substring, first match wins; unmatched requests get a
/// `200 {}`.
pub struct RecordingHttpClient {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<Vec<(String, u16, String)>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingHttpClient {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Script a response for any URL containing `url_part`.
    pub fn with_response(self, url_part: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .push((url_part.to_string(), status, body.to_string()));
        self
    }

    /// Script a transport-level failure for any URL containing `url_part`.
    pub fn with_error(self, url_part: &str) -> Self {
        self.errors.lock().push(url_part.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }

    /// Requests whose URL contains `url_part`.
    pub fn matching(&self, url_part: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.contains(url_part))
            .cloned()
            .collect()
    }

    fn answer(&self, url: &str) -> Result<HttpResponse, Error> {
        if let Some(part) = self.errors.lock().iter().find(|p| url.contains(p.as_str())) {
            return Err(Error::Backend(format!("scripted failure for {}", part)));
        }
        let responses = self.responses.lock();
        let (status, body) = responses
            .iter()
            .find(|(part, _, _)| url.contains(part.as_str()))
            .map(|(_, status, body)| (*status, body.clone()))
            .unwrap_or((200, "{}".to_string()));
        Ok(HttpResponse { status, body })
    }
}

impl Default for RecordingHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for RecordingHttpClient {
    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
        _timeout: Duration,
    ) -> Result<HttpResponse, Error> {
        self.requests.lock().push(RecordedRequest {
            method: "POST".to_string(),
            url: url.clone(),
            body: Some(body),
        });
        self.answer(&url)
    }

    async fn get(&self, url: String, _timeout: Duration) -> Result<HttpResponse, Error> {
        self.requests.lock().push(RecordedRequest {
            method: "GET".to_string(),
            url: url.clone(),
            body: None,
        });
        self.answer(&url)
    }
}

/// A config pointed at a fake backend. Handy base for pipeline tests.
pub fn test_config() -> AnalyticsConfig {
    let mut cfg = AnalyticsConfig::new("http://backend.test");
    cfg.user_agent = "footfall-test/1.0".to_string();
    cfg
}

/// A recording client whose session open returns `session_id`.
pub fn http_with_session(session_id: &str) -> Arc<RecordingHttpClient> {
    Arc::new(RecordingHttpClient::new().with_response(
        "/api/analytics/session",
        200,
        &format!(r#"{{"session_id":"{}"}}"#, session_id),
    ))
}
