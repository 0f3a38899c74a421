// File: footfall-common/src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One backend-tracked visit. The `session_id` is assigned by the backend
/// when the session is opened and is treated as opaque text on this side.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Session {
    pub session_id: String,
    pub visitor_id: String,
    pub user_agent: String,
    pub referrer: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Client-side lifecycle of the single tracked session.
///
/// The open attempt happens exactly once. `Inert` is terminal: a failed open
/// is never retried, and every downstream recorder treats it as
/// "tracking disabled".
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Uninitialized,
    Opening,
    Established(Session),
    Inert,
}

impl SessionState {
    /// The backend session id, if one was ever assigned.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionState::Established(s) => Some(s.session_id.as_str()),
            _ => None,
        }
    }

    pub fn is_established(&self) -> bool {
        matches!(self, SessionState::Established(_))
    }

    /// True once the single open attempt has resolved either way.
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionState::Established(_) | SessionState::Inert)
    }
}
