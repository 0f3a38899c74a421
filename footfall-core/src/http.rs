//! HTTP client abstraction for the backend and sink calls
//!
//! Every network call the pipeline makes goes through this trait so tests can
//! substitute a scripted implementation and assert on exactly what was sent,
//! without real sockets. The default implementation wraps reqwest.
//!
//! Calls carry an explicit per-request timeout because the pipeline's
//! fail-open policy depends on every request terminating promptly; nothing
//! here retries.

use std::time::Duration;

use async_trait::async_trait;
use footfall_common::Error;

/// Status and body of a completed request. Non-2xx responses are returned
/// here (not as `Err`); callers decide what failure means.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A generic trait for making HTTP requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpResponse, Error>;

    async fn get(&self, url: String, timeout: Duration) -> Result<HttpResponse, Error>;
}

#[derive(Clone)]
pub struct DefaultHttpClient {
    client: reqwest::Client,
}

impl DefaultHttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for DefaultHttpClient {
    async fn post_json(
        &self,
        url: String,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<HttpResponse, Error> {
        let response = self.client
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }

    async fn get(&self, url: String, timeout: Duration) -> Result<HttpResponse, Error> {
        let response = self.client
            .get(&url)
            .timeout(timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(HttpResponse { status, body })
    }
}
