// File: footfall-common/src/models/pageview.rs

use serde::{Deserialize, Serialize};

/// One page visit record as reported to the backend.
///
/// `time_spent` is whole seconds. A record with `time_spent == 0` is the
/// entry ping fired the moment a page becomes current; dwell records are
/// only reported once the visit exceeds five seconds.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct PageViewRecord {
    pub visitor_id: String,
    pub session_id: String,
    pub page_url: String,
    pub page_title: String,
    pub time_spent: u64,
}
