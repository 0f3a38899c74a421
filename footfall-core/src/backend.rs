//! src/backend.rs
//!
//! Typed client for the analytics backend's REST surface. This is the one
//! place that knows endpoint paths and JSON body shapes; everything above it
//! works in terms of the domain models.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use footfall_common::Error;
use footfall_common::models::alert::DevToolsAlert;
use footfall_common::models::pageview::PageViewRecord;

use crate::beacon::BeaconRequest;
use crate::http::HttpClient;

/// Body of `POST /api/analytics/session`. The backend fills in the client IP
/// and timestamps server-side.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOpenRequest {
    pub visitor_id: String,
    pub user_agent: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionOpenResponse {
    pub session_id: String,
}

/// Body of `POST /api/analytics/dev-tools-alert`. No timestamp: the backend
/// stamps alerts itself when persisting and broadcasting.
#[derive(Debug, Clone, Serialize)]
struct DevToolsAlertRequest<'a> {
    visitor_id: &'a str,
    session_id: &'a str,
    user_agent: &'a str,
    page_url: &'a str,
}

pub struct AnalyticsBackend {
    base_url: String,
    http: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl AnalyticsBackend {
    /// `base_url` is the backend origin, e.g. `http://localhost:8001`.
    pub fn new(base_url: &str, http: Arc<dyn HttpClient>, timeout: Duration) -> Result<Self, Error> {
        // Validate early so a bad URL fails the session open, not every call.
        Url::parse(base_url)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Open a session; returns the backend-assigned id.
    pub async fn open_session(&self, req: &SessionOpenRequest) -> Result<SessionOpenResponse, Error> {
        let url = format!("{}/api/analytics/session", self.base_url);
        let body = serde_json::to_value(req)?;
        let resp = self.http.post_json(url, body, self.timeout).await?;
        if !resp.is_success() {
            return Err(Error::Backend(format!(
                "session open returned status {}",
                resp.status
            )));
        }
        let parsed: SessionOpenResponse = serde_json::from_str(&resp.body)?;
        Ok(parsed)
    }

    /// Report one page view (entry ping or dwell flush).
    pub async fn record_page_view(&self, record: &PageViewRecord) -> Result<(), Error> {
        let url = format!("{}/api/analytics/pageview", self.base_url);
        let body = serde_json::to_value(record)?;
        let resp = self.http.post_json(url, body, self.timeout).await?;
        if !resp.is_success() {
            return Err(Error::Backend(format!(
                "pageview returned status {}",
                resp.status
            )));
        }
        Ok(())
    }

    /// Report a dev-tools detection.
    pub async fn post_alert(&self, alert: &DevToolsAlert) -> Result<(), Error> {
        let url = format!("{}/api/analytics/dev-tools-alert", self.base_url);
        let req = DevToolsAlertRequest {
            visitor_id: &alert.visitor_id,
            session_id: &alert.session_id,
            user_agent: &alert.user_agent,
            page_url: &alert.page_url,
        };
        let body = serde_json::to_value(&req)?;
        let resp = self.http.post_json(url, body, self.timeout).await?;
        if !resp.is_success() {
            return Err(Error::Backend(format!(
                "dev-tools alert returned status {}",
                resp.status
            )));
        }
        Ok(())
    }

    /// Beacon closing the session with the total time spent, in seconds.
    /// Sent as a GET so it can ride out client teardown.
    pub fn session_end_beacon(&self, session_id: &str, total_time_secs: u64) -> BeaconRequest {
        BeaconRequest::Get {
            url: format!(
                "{}/api/analytics/session/{}/end?total_time={}",
                self.base_url, session_id, total_time_secs
            ),
        }
    }

    /// Beacon carrying the final page's dwell record.
    pub fn page_view_beacon(&self, record: &PageViewRecord) -> Result<BeaconRequest, Error> {
        Ok(BeaconRequest::PostJson {
            url: format!("{}/api/analytics/pageview", self.base_url),
            body: serde_json::to_value(record)?,
        })
    }
}
