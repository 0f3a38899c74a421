// File: footfall-common/src/traits/sink_traits.rs

use async_trait::async_trait;
use crate::error::Error;

/// A custom event reported to the measurement sink, in the
/// category / action / label / value shape the sink protocol expects.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEvent {
    pub category: String,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<i64>,
}

impl MeasurementEvent {
    pub fn new(category: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            action: action.into(),
            label: None,
            value: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: i64) -> Self {
        self.value = Some(value);
        self
    }
}

/// Secondary analytics mirror (a third-party measurement endpoint).
///
/// The sink is best-effort on top of best-effort: callers report into it
/// unconditionally, regardless of backend session state, and log-and-drop
/// any error it returns. `client_id` is the visitor id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    async fn record_page_view(
        &self,
        client_id: &str,
        page_url: &str,
        page_title: &str,
    ) -> Result<(), Error>;

    async fn record_event(&self, client_id: &str, event: &MeasurementEvent) -> Result<(), Error>;
}
