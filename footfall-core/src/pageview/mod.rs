//! src/pageview/mod.rs
//!
//! Page-time accounting. Each navigation flushes the previous page's dwell
//! (when it clears the five-second bar), makes the new page current, and
//! fires an unconditional zero-duration entry ping so short visits still
//! count. Delivery happens on a spawned task; the caller returns immediately
//! and never sees a network outcome.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use footfall_common::models::pageview::PageViewRecord;
use footfall_common::traits::sink_traits::MeasurementSink;

use crate::backend::AnalyticsBackend;
use crate::eventbus::{AnalyticsEvent, EventBus};
use crate::session::SessionManager;

/// Dwell at or below this many seconds is noise and is not reported.
const MIN_REPORTED_DWELL_SECS: u64 = 5;

struct CurrentPage {
    url: String,
    title: String,
    entered_at: Instant,
}

pub struct PageViewRecorder {
    visitor_id: String,
    session: Arc<SessionManager>,
    backend: Arc<AnalyticsBackend>,
    sink: Arc<dyn MeasurementSink>,
    bus: Arc<EventBus>,
    current: RwLock<Option<CurrentPage>>,
}

impl PageViewRecorder {
    pub fn new(
        visitor_id: String,
        session: Arc<SessionManager>,
        backend: Arc<AnalyticsBackend>,
        sink: Arc<dyn MeasurementSink>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            visitor_id,
            session,
            backend,
            sink,
            bus,
            current: RwLock::new(None),
        }
    }

    /// Record a navigation. Fire-and-forget: the previous page's dwell flush,
    /// the new page's entry ping, and the sink mirror all happen on a spawned
    /// task, strictly in that order.
    pub fn track_page_view(&self, page_url: &str, page_title: &str) {
        // Swap the current page under the lock; everything slow happens after.
        let previous = {
            let mut current = self.current.write();
            let previous = current.take().map(|page| {
                let dwell = page.entered_at.elapsed();
                (page, dwell)
            });
            *current = Some(CurrentPage {
                url: page_url.to_string(),
                title: page_title.to_string(),
                entered_at: Instant::now(),
            });
            previous
        };

        let visitor_id = self.visitor_id.clone();
        let session = self.session.clone();
        let backend = self.backend.clone();
        let sink = self.sink.clone();
        let bus = self.bus.clone();
        let url = page_url.to_string();
        let title = page_title.to_string();

        tokio::spawn(async move {
            // Dwell flush for the page we just left.
            if let Some((page, dwell)) = previous {
                if let Some(session_id) = session.session_id() {
                    let secs = dwell.as_secs();
                    if secs > MIN_REPORTED_DWELL_SECS {
                        let record = PageViewRecord {
                            visitor_id: visitor_id.clone(),
                            session_id,
                            page_url: page.url,
                            page_title: page.title,
                            time_spent: secs,
                        };
                        bus.publish(AnalyticsEvent::PageViewRecorded(record.clone())).await;
                        if let Err(e) = backend.record_page_view(&record).await {
                            warn!("[PageView] dwell flush failed => {}", e);
                        }
                    } else {
                        debug!("[PageView] dwell {}s under threshold => not reported", secs);
                    }
                }
            }

            // Entry ping for the page we just landed on.
            if let Some(session_id) = session.session_id() {
                let record = PageViewRecord {
                    visitor_id: visitor_id.clone(),
                    session_id,
                    page_url: url.clone(),
                    page_title: title.clone(),
                    time_spent: 0,
                };
                bus.publish(AnalyticsEvent::PageViewRecorded(record.clone())).await;
                if let Err(e) = backend.record_page_view(&record).await {
                    warn!("[PageView] entry ping failed => {}", e);
                }
            }

            // Sink mirror goes out regardless of backend session state.
            if let Err(e) = sink.record_page_view(&visitor_id, &url, &title).await {
                warn!("[PageView] sink mirror failed => {}", e);
            }
        });
    }

    /// URL of the page currently being timed, if any.
    pub fn current_page_url(&self) -> Option<String> {
        self.current.read().as_ref().map(|p| p.url.clone())
    }

    /// Take the final dwell record for shutdown delivery. Applies the same
    /// five-second bar and session gate as a navigation flush; the current
    /// page is cleared either way.
    pub fn take_unload_record(&self) -> Option<PageViewRecord> {
        let (page, dwell) = {
            let mut current = self.current.write();
            let page = current.take()?;
            let dwell = page.entered_at.elapsed();
            (page, dwell)
        };
        let session_id = self.session.session_id()?;
        let secs = dwell.as_secs();
        if secs <= MIN_REPORTED_DWELL_SECS {
            debug!("[PageView] final dwell {}s under threshold => not reported", secs);
            return None;
        }
        Some(PageViewRecord {
            visitor_id: self.visitor_id.clone(),
            session_id,
            page_url: page.url,
            page_title: page.title,
            time_spent: secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::backend::SessionOpenRequest;
    use crate::sink::NoopSink;
    use crate::test_utils::helpers::http_with_session;

    async fn recorder_with_session() -> Arc<PageViewRecorder> {
        let http = http_with_session("s-1");
        let backend = Arc::new(
            AnalyticsBackend::new("http://backend.test", http, Duration::from_secs(5)).unwrap(),
        );
        let session = Arc::new(SessionManager::new());
        let request = SessionOpenRequest {
            visitor_id: "v-1".to_string(),
            user_agent: "ua".to_string(),
            referrer: None,
        };
        session
            .initialize(&backend, request, Duration::from_secs(5))
            .await
            .unwrap();
        Arc::new(PageViewRecorder::new(
            "v-1".to_string(),
            session,
            backend,
            Arc::new(NoopSink),
            Arc::new(EventBus::new()),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn dwell_is_truncated_to_whole_seconds() {
        let recorder = recorder_with_session().await;

        recorder.track_page_view("/", "Home");
        tokio::time::sleep(Duration::from_millis(11_500)).await;

        let record = recorder.take_unload_record().unwrap();
        assert_eq!(record.time_spent, 11);
    }

    #[tokio::test(start_paused = true)]
    async fn a_truncated_dwell_must_still_clear_the_bar() {
        let recorder = recorder_with_session().await;

        // 5.9s truncates to 5 and is filtered; nothing short of a full
        // six seconds is reported.
        recorder.track_page_view("/", "Home");
        tokio::time::sleep(Duration::from_millis(5_900)).await;
        assert!(recorder.take_unload_record().is_none());

        recorder.track_page_view("/", "Home");
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(recorder.take_unload_record().map(|r| r.time_spent), Some(6));
    }
}
