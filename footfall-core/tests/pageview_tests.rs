//! tests/pageview_tests.rs
//!
//! Page-view recording under a paused clock: entry pings, the dwell
//! threshold, whole-second truncation, and the backend gate when no
//! session exists.

use std::sync::Arc;
use std::time::Duration;

use footfall_core::backend::{AnalyticsBackend, SessionOpenRequest};
use footfall_core::config::MeasurementConfig;
use footfall_core::eventbus::{AnalyticsEvent, EventBus};
use footfall_core::pageview::PageViewRecorder;
use footfall_core::session::SessionManager;
use footfall_core::sink::{GaMeasurementSink, NoopSink};
use footfall_core::test_utils::{RecordingHttpClient, http_with_session};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn opened_session(
    http: &Arc<RecordingHttpClient>,
) -> (Arc<SessionManager>, Arc<AnalyticsBackend>) {
    let backend = Arc::new(
        AnalyticsBackend::new("http://backend.test", http.clone(), TIMEOUT).unwrap(),
    );
    let session = Arc::new(SessionManager::new());
    let request = SessionOpenRequest {
        visitor_id: "v-1".to_string(),
        user_agent: "ua".to_string(),
        referrer: None,
    };
    let opened = session.initialize(&backend, request, TIMEOUT).await;
    assert!(opened.is_some(), "scripted session open should succeed");
    (session, backend)
}

fn recorder(
    session: Arc<SessionManager>,
    backend: Arc<AnalyticsBackend>,
    bus: Arc<EventBus>,
) -> Arc<PageViewRecorder> {
    Arc::new(PageViewRecorder::new(
        "v-1".to_string(),
        session,
        backend,
        Arc::new(NoopSink),
        bus,
    ))
}

/// Backend page-view bodies, in arrival order, as (page_url, time_spent).
fn pageview_posts(http: &RecordingHttpClient) -> Vec<(String, u64)> {
    http.matching("/api/analytics/pageview")
        .iter()
        .map(|r| {
            let body = r.body.as_ref().unwrap();
            (
                body["page_url"].as_str().unwrap().to_string(),
                body["time_spent"].as_u64().unwrap(),
            )
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn each_navigation_sends_an_entry_ping() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let recorder = recorder(session, backend, Arc::new(EventBus::new()));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(pageview_posts(&http), vec![("/".to_string(), 0)]);
}

#[tokio::test(start_paused = true)]
async fn short_dwell_is_not_flushed() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let recorder = recorder(session, backend, Arc::new(EventBus::new()));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_secs(3)).await;
    recorder.track_page_view("/about", "About");
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Only the two entry pings; a 3s stay is below the reporting threshold.
    assert_eq!(
        pageview_posts(&http),
        vec![("/".to_string(), 0), ("/about".to_string(), 0)]
    );
}

#[tokio::test(start_paused = true)]
async fn long_dwell_is_flushed_before_the_next_entry() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let recorder = recorder(session, backend, Arc::new(EventBus::new()));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_secs(12)).await;
    recorder.track_page_view("/about", "About");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        pageview_posts(&http),
        vec![
            ("/".to_string(), 0),
            ("/".to_string(), 12),
            ("/about".to_string(), 0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn fractional_dwell_is_floored_before_the_threshold() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let recorder = recorder(session, backend, Arc::new(EventBus::new()));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_millis(5_600)).await;
    recorder.track_page_view("/about", "About");
    tokio::time::sleep(Duration::from_millis(12_400)).await;
    recorder.track_page_view("/contact", "Contact");
    tokio::time::sleep(Duration::from_millis(10)).await;

    // 5.6s floors to 5 and stays under the threshold; 12.4s is reported
    // as 12, never rounded up.
    assert_eq!(
        pageview_posts(&http),
        vec![
            ("/".to_string(), 0),
            ("/about".to_string(), 0),
            ("/about".to_string(), 12),
            ("/contact".to_string(), 0),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn flushed_records_land_on_the_bus() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe(None).await;
    let recorder = recorder(session, backend, bus);

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_secs(8)).await;
    recorder.track_page_view("/about", "About");

    // Entry ping for "/".
    let first = rx.recv().await.unwrap();
    let AnalyticsEvent::PageViewRecorded(record) = first else {
        panic!("expected a page view, got {:?}", first);
    };
    assert_eq!(record.page_url, "/");
    assert_eq!(record.time_spent, 0);
    assert_eq!(record.session_id, "s-1");

    // Dwell flush for "/".
    let second = rx.recv().await.unwrap();
    let AnalyticsEvent::PageViewRecorded(record) = second else {
        panic!("expected a page view, got {:?}", second);
    };
    assert_eq!(record.page_url, "/");
    assert_eq!(record.time_spent, 8);
}

#[tokio::test(start_paused = true)]
async fn no_session_means_sink_only() {
    // Session open fails; the recorder still mirrors to the sink.
    let http = Arc::new(RecordingHttpClient::new().with_error("/api/analytics/session"));
    let backend = Arc::new(
        AnalyticsBackend::new("http://backend.test", http.clone(), TIMEOUT).unwrap(),
    );
    let session = Arc::new(SessionManager::new());
    let request = SessionOpenRequest {
        visitor_id: "v-1".to_string(),
        user_agent: "ua".to_string(),
        referrer: None,
    };
    assert!(session.initialize(&backend, request, TIMEOUT).await.is_none());

    let measurement = MeasurementConfig {
        measurement_id: "G-TEST".to_string(),
        api_secret: "secret".to_string(),
    };
    let sink = Arc::new(GaMeasurementSink::new(&measurement, http.clone(), TIMEOUT));
    let recorder = Arc::new(PageViewRecorder::new(
        "v-1".to_string(),
        session,
        backend,
        sink,
        Arc::new(EventBus::new()),
    ));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(pageview_posts(&http).is_empty());
    let collects = http.matching("google-analytics.com/mp/collect");
    assert_eq!(collects.len(), 1);
    let body = collects[0].body.as_ref().unwrap();
    assert_eq!(body["events"][0]["name"], "page_view");
    assert_eq!(body["events"][0]["params"]["page_location"], "/");
}

#[tokio::test(start_paused = true)]
async fn unload_record_respects_the_threshold() {
    let http = http_with_session("s-1");
    let (session, backend) = opened_session(&http).await;
    let recorder = recorder(session, backend, Arc::new(EventBus::new()));

    recorder.track_page_view("/", "Home");
    tokio::time::sleep(Duration::from_secs(12)).await;

    let record = recorder.take_unload_record().unwrap();
    assert_eq!(record.page_url, "/");
    assert_eq!(record.time_spent, 12);

    // The record was taken; a second unload has nothing to report.
    assert!(recorder.take_unload_record().is_none());

    recorder.track_page_view("/about", "About");
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(recorder.take_unload_record().is_none());
}
