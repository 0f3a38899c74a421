// File: footfall-common/src/models/alert.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single dev-tools-open detection, produced on the closed-to-open edge
/// only. The backend assigns its own timestamp when persisting; the one here
/// is the client-side detection instant carried on pushed broadcasts.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct DevToolsAlert {
    pub visitor_id: String,
    pub session_id: String,
    pub user_agent: String,
    pub page_url: String,
    pub timestamp: DateTime<Utc>,
}
