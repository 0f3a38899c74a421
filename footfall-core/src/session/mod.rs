//! src/session/mod.rs
//!
//! Single-attempt session lifecycle. The open POST is tried exactly once,
//! under a bounded timeout; success parks the backend-assigned id in
//! `Established`, any failure parks the manager in `Inert` for the rest of
//! the client's life. Downstream recorders ask for a snapshot and treat a
//! missing id as "tracking disabled".

use chrono::Utc;
use parking_lot::RwLock;
use std::time::Duration;
use tracing::{info, warn};

use footfall_common::models::session::{Session, SessionState};

use crate::backend::{AnalyticsBackend, SessionOpenRequest};

pub struct SessionManager {
    state: RwLock<SessionState>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::Uninitialized),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.read().session_id().map(str::to_string)
    }

    pub fn is_established(&self) -> bool {
        self.state.read().is_established()
    }

    /// Run the one open attempt. Returns the established session on success;
    /// on any failure (transport, timeout, non-2xx, unparseable body) the
    /// manager goes `Inert` and stays there. Calling this a second time is
    /// ignored.
    pub async fn initialize(
        &self,
        backend: &AnalyticsBackend,
        request: SessionOpenRequest,
        timeout: Duration,
    ) -> Option<Session> {
        {
            let mut state = self.state.write();
            if !matches!(*state, SessionState::Uninitialized) {
                warn!("[Session] initialize called more than once => ignoring");
                return None;
            }
            *state = SessionState::Opening;
        }

        let attempt = tokio::time::timeout(timeout, backend.open_session(&request)).await;
        match attempt {
            Ok(Ok(resp)) => {
                let session = Session {
                    session_id: resp.session_id,
                    visitor_id: request.visitor_id,
                    user_agent: request.user_agent,
                    referrer: request.referrer,
                    started_at: Utc::now(),
                    ended_at: None,
                };
                info!("[Session] established => session_id={}", session.session_id);
                *self.state.write() = SessionState::Established(session.clone());
                Some(session)
            }
            Ok(Err(e)) => {
                warn!("[Session] open failed => {}; tracking disabled for this run", e);
                *self.state.write() = SessionState::Inert;
                None
            }
            Err(_) => {
                warn!(
                    "[Session] open timed out after {:?}; tracking disabled for this run",
                    timeout
                );
                *self.state.write() = SessionState::Inert;
                None
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::backend::AnalyticsBackend;
    use crate::test_utils::helpers::{http_with_session, RecordingHttpClient};

    fn open_request() -> SessionOpenRequest {
        SessionOpenRequest {
            visitor_id: "v-1".into(),
            user_agent: "ua".into(),
            referrer: Some("https://search.example".into()),
        }
    }

    #[tokio::test]
    async fn successful_open_establishes_session() {
        let http = http_with_session("s-42");
        let backend =
            AnalyticsBackend::new("http://backend.test", http.clone(), Duration::from_secs(5))
                .unwrap();
        let mgr = SessionManager::new();
        assert!(!mgr.snapshot().is_settled());

        let session = mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await
            .expect("session should open");
        assert_eq!(session.session_id, "s-42");
        assert_eq!(mgr.session_id().as_deref(), Some("s-42"));
        assert!(mgr.is_established());
        assert!(mgr.snapshot().is_settled());

        let posts = http.matching("/api/analytics/session");
        assert_eq!(posts.len(), 1);
        let body = posts[0].body.as_ref().unwrap();
        assert_eq!(body["visitor_id"], "v-1");
        assert_eq!(body["referrer"], "https://search.example");
    }

    #[tokio::test]
    async fn transport_failure_goes_inert() {
        let http = Arc::new(RecordingHttpClient::new().with_error("/api/analytics/session"));
        let backend =
            AnalyticsBackend::new("http://backend.test", http, Duration::from_secs(5)).unwrap();
        let mgr = SessionManager::new();

        let session = mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await;
        assert!(session.is_none());
        assert_eq!(mgr.snapshot(), SessionState::Inert);
        // Inert counts as settled: the one attempt has resolved.
        assert!(mgr.snapshot().is_settled());
    }

    #[tokio::test]
    async fn non_2xx_goes_inert() {
        let http =
            Arc::new(RecordingHttpClient::new().with_response("/api/analytics/session", 500, "boom"));
        let backend =
            AnalyticsBackend::new("http://backend.test", http, Duration::from_secs(5)).unwrap();
        let mgr = SessionManager::new();

        assert!(mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await
            .is_none());
        assert_eq!(mgr.snapshot(), SessionState::Inert);
    }

    #[tokio::test]
    async fn unparseable_body_goes_inert() {
        let http = Arc::new(
            RecordingHttpClient::new().with_response("/api/analytics/session", 200, "not json"),
        );
        let backend =
            AnalyticsBackend::new("http://backend.test", http, Duration::from_secs(5)).unwrap();
        let mgr = SessionManager::new();

        assert!(mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await
            .is_none());
        assert_eq!(mgr.snapshot(), SessionState::Inert);
    }

    #[tokio::test]
    async fn open_is_attempted_only_once() {
        let http = Arc::new(RecordingHttpClient::new().with_error("/api/analytics/session"));
        let backend =
            AnalyticsBackend::new("http://backend.test", http.clone(), Duration::from_secs(5))
                .unwrap();
        let mgr = SessionManager::new();

        assert!(mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await
            .is_none());
        // A second attempt must not touch the network.
        assert!(mgr
            .initialize(&backend, open_request(), Duration::from_secs(5))
            .await
            .is_none());
        assert_eq!(http.matching("/api/analytics/session").len(), 1);
    }
}
