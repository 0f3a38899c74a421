// File: footfall-core/src/client.rs

//! The top-level analytics client. Wires identity, session, page views,
//! the dev-tools detector, the realtime channel, and the measurement
//! sink onto one event bus, and owns the shutdown sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

use footfall_common::Error;
use footfall_common::models::alert::DevToolsAlert;
use footfall_common::models::session::SessionState;
use footfall_common::traits::host_traits::ViewportSource;
use footfall_common::traits::identity_traits::CookieJar;
use footfall_common::traits::sink_traits::{MeasurementEvent, MeasurementSink};

use crate::backend::{AnalyticsBackend, SessionOpenRequest};
use crate::beacon::{BeaconQueue, spawn_beacon_worker_task};
use crate::config::AnalyticsConfig;
use crate::detector::{InspectTrap, spawn_detector_task};
use crate::eventbus::{AnalyticsEvent, EventBus};
use crate::http::{DefaultHttpClient, HttpClient};
use crate::identity::CookieIdentityStore;
use crate::pageview::PageViewRecorder;
use crate::realtime::{ChannelStatus, RealtimeChannel, spawn_alert_dispatcher_task};
use crate::session::SessionManager;
use crate::sink::sink_from_config;

/// How long `shutdown` waits for a background task to wind down on its
/// own before aborting it.
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// One visitor's analytics pipeline.
///
/// `create` returns immediately; the session handshake runs in the
/// background and every tracking call is safe to make before it
/// settles (backend-bound work is dropped until a session exists, the
/// measurement sink is fed regardless). All tracking methods are
/// fire-and-forget.
pub struct AnalyticsClient {
    config: AnalyticsConfig,
    visitor_id: String,
    bus: Arc<EventBus>,
    session: Arc<SessionManager>,
    backend: Arc<AnalyticsBackend>,
    sink: Arc<dyn MeasurementSink>,
    recorder: Arc<PageViewRecorder>,
    trap: Arc<InspectTrap>,
    beacon_queue: Arc<BeaconQueue>,
    beacon_worker: Mutex<Option<JoinHandle<()>>>,
    channel: Arc<RwLock<Option<RealtimeChannel>>>,
    detector_task: Mutex<Option<JoinHandle<()>>>,
    forwarder_task: Mutex<Option<JoinHandle<()>>>,
    dispatcher_tasks: Mutex<Vec<JoinHandle<()>>>,
    init_task: Mutex<Option<JoinHandle<()>>>,
    settled_rx: watch::Receiver<bool>,
    started_at: Instant,
    shutting_down: AtomicBool,
}

impl AnalyticsClient {
    /// Builds the client with the default reqwest-backed transport.
    pub async fn create(
        config: AnalyticsConfig,
        jar: Arc<dyn CookieJar>,
        viewport: Arc<dyn ViewportSource>,
    ) -> Result<Arc<Self>, Error> {
        let http: Arc<dyn HttpClient> = Arc::new(DefaultHttpClient::new());
        Self::create_with_http(config, jar, viewport, http).await
    }

    /// Builds the client on top of an explicit HTTP transport.
    pub async fn create_with_http(
        config: AnalyticsConfig,
        jar: Arc<dyn CookieJar>,
        viewport: Arc<dyn ViewportSource>,
        http: Arc<dyn HttpClient>,
    ) -> Result<Arc<Self>, Error> {
        info!("[Analytics] starting client => backend={}", config.backend_url);

        // 1) Durable visitor identity.
        let identity =
            CookieIdentityStore::new(jar, &config.cookie_name, config.cookie_ttl_days);
        let visitor_id = identity.get_or_create().await.visitor_id;
        info!("[Analytics] visitor => {}", visitor_id);

        // 2) Event bus, backend client, measurement sink.
        let bus = Arc::new(EventBus::new());
        let backend = Arc::new(AnalyticsBackend::new(
            &config.backend_url,
            http.clone(),
            config.http_timeout,
        )?);
        let sink = sink_from_config(config.measurement.as_ref(), http.clone(), config.http_timeout);

        // 3) Beacon queue, so final records survive teardown.
        let (beacon_queue, beacon_worker) =
            spawn_beacon_worker_task(http.clone(), config.http_timeout);

        // 4) Session state and the page-view recorder.
        let session = Arc::new(SessionManager::new());
        let recorder = Arc::new(PageViewRecorder::new(
            visitor_id.clone(),
            session.clone(),
            backend.clone(),
            sink.clone(),
            bus.clone(),
        ));

        // 5) Dev-tools detector (viewport polling + inspect trap).
        let trap = Arc::new(InspectTrap::new());
        let detector_task = spawn_detector_task(
            config.detector.clone(),
            viewport,
            trap.clone(),
            session.clone(),
            recorder.clone(),
            visitor_id.clone(),
            config.user_agent.clone(),
            bus.clone(),
        );

        // 6) Alert forwarder: bus -> backend + sink mirror.
        let forwarder_task =
            spawn_alert_forwarder_task(bus.clone(), backend.clone(), sink.clone());

        // 7) Single session-open attempt; the realtime channel follows on success.
        let (settled_tx, settled_rx) = watch::channel(false);
        let channel: Arc<RwLock<Option<RealtimeChannel>>> = Arc::new(RwLock::new(None));
        let init_task = spawn_session_init_task(
            config.clone(),
            visitor_id.clone(),
            session.clone(),
            backend.clone(),
            bus.clone(),
            channel.clone(),
            http,
            settled_tx,
        );

        let client = Arc::new(Self {
            config,
            visitor_id,
            bus,
            session,
            backend,
            sink,
            recorder,
            trap,
            beacon_queue,
            beacon_worker: Mutex::new(Some(beacon_worker)),
            channel,
            detector_task: Mutex::new(Some(detector_task)),
            forwarder_task: Mutex::new(Some(forwarder_task)),
            dispatcher_tasks: Mutex::new(Vec::new()),
            init_task: Mutex::new(Some(init_task)),
            settled_rx,
            started_at: Instant::now(),
            shutting_down: AtomicBool::new(false),
        });
        Ok(client)
    }

    /// The durable visitor id this client runs under.
    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    /// Snapshot of the session lifecycle state.
    pub fn session_state(&self) -> SessionState {
        self.session.snapshot()
    }

    /// The backend-assigned session id, once established.
    pub fn session_id(&self) -> Option<String> {
        self.session.session_id()
    }

    /// Current realtime channel status. `Disconnected` while no
    /// channel exists (session pending or never opened).
    pub fn channel_status(&self) -> ChannelStatus {
        self.channel
            .read()
            .as_ref()
            .map(|c| c.status())
            .unwrap_or(ChannelStatus::Disconnected)
    }

    /// The bus every pipeline event flows through. Hosts can subscribe
    /// for their own consumers.
    pub fn event_bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Handle the host wires into its inspect/devtools hook. Tripping
    /// it feeds the detector; only the first trip ever counts.
    pub fn inspect_trap(&self) -> Arc<InspectTrap> {
        self.trap.clone()
    }

    /// Resolves once the session-open attempt has finished, whichever
    /// way it went. Useful before scripted navigation or teardown.
    pub async fn wait_until_settled(&self) {
        let mut rx = self.settled_rx.clone();
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Records a navigation: flushes the previous page's dwell, pings
    /// the new page, and mirrors it to the measurement sink.
    pub fn track_page_view(&self, page_url: &str, page_title: &str) {
        self.recorder.track_page_view(page_url, page_title);
    }

    /// Mirrors an arbitrary event to the measurement sink. Nothing is
    /// sent to the backend.
    pub fn track_event(&self, category: &str, action: &str, label: Option<&str>, value: Option<i64>) {
        let mut event = MeasurementEvent::new(category, action);
        if let Some(label) = label {
            event = event.with_label(label);
        }
        if let Some(value) = value {
            event = event.with_value(value);
        }
        let sink = self.sink.clone();
        let visitor_id = self.visitor_id.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.record_event(&visitor_id, &event).await {
                warn!("[Analytics] event mirror failed => {:?}", e);
            }
        });
    }

    /// Reports how far down a page the visitor scrolled, as a percent.
    pub fn track_scroll_depth(&self, depth_percent: u32) {
        let label = format!("{}%", depth_percent);
        self.track_event(
            "Engagement",
            "scroll_depth",
            Some(&label),
            Some(depth_percent as i64),
        );
    }

    /// Asks the realtime channel to place this connection in the admin
    /// room. Dropped with a warning if no channel is open yet.
    pub fn join_admin_room(&self, token: &str) {
        let guard = self.channel.read();
        match guard.as_ref() {
            Some(channel) => channel.join_admin_room(token),
            None => warn!("[Analytics] no realtime channel => join_admin dropped"),
        }
    }

    /// Registers a callback for dev-tools alerts pushed over the
    /// realtime channel. May be called any number of times.
    pub fn on_dev_tools_alert<F>(&self, callback: F)
    where
        F: Fn(DevToolsAlert) + Send + 'static,
    {
        let task = spawn_alert_dispatcher_task(self.bus.clone(), callback);
        self.dispatcher_tasks.lock().push(task);
    }

    /// Tears the pipeline down in order: final beacons are queued and
    /// drained under the grace period, then the channel and background
    /// tasks are stopped. Idempotent.
    pub async fn shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("[Analytics] shutting down...");

        // 1) Stop the session-open attempt if it is still in flight.
        //    Unload with no session means the final records are gated
        //    off anyway.
        let init = self.init_task.lock().take();
        if let Some(init) = init {
            init.abort();
        }

        // 2) Queue the final records: session end first, then the
        //    current page's dwell.
        let total_secs = self.started_at.elapsed().as_secs();
        if let Some(session_id) = self.session.session_id() {
            self.beacon_queue
                .enqueue(self.backend.session_end_beacon(&session_id, total_secs));
        }
        if let Some(record) = self.recorder.take_unload_record() {
            match self.backend.page_view_beacon(&record) {
                Ok(beacon) => self.beacon_queue.enqueue(beacon),
                Err(e) => warn!("[Analytics] could not build page-view beacon => {:?}", e),
            }
        }

        // 3) Drain the beacon queue under the grace period.
        self.beacon_queue.close();
        let worker = self.beacon_worker.lock().take();
        if let Some(mut worker) = worker {
            if timeout(self.config.beacon_grace, &mut worker).await.is_err() {
                warn!("[Analytics] beacon drain exceeded grace period => aborting");
                worker.abort();
            }
        }

        // 4) Signal every bus-driven task, then close the channel.
        self.bus.shutdown();
        let channel = self.channel.write().take();
        if let Some(channel) = channel {
            channel.close().await;
        }

        // 5) Join the remaining tasks, aborting stragglers.
        let detector = self.detector_task.lock().take();
        if let Some(mut task) = detector {
            if timeout(TASK_JOIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
        let forwarder = self.forwarder_task.lock().take();
        if let Some(mut task) = forwarder {
            if timeout(TASK_JOIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
        let dispatchers = std::mem::take(&mut *self.dispatcher_tasks.lock());
        for task in dispatchers {
            task.abort();
        }

        info!("[Analytics] shutdown complete.");
    }
}

/// Runs the one session-open attempt and, on success, brings up the
/// realtime channel next to it.
#[allow(clippy::too_many_arguments)]
fn spawn_session_init_task(
    config: AnalyticsConfig,
    visitor_id: String,
    session: Arc<SessionManager>,
    backend: Arc<AnalyticsBackend>,
    bus: Arc<EventBus>,
    channel_slot: Arc<RwLock<Option<RealtimeChannel>>>,
    http: Arc<dyn HttpClient>,
    settled_tx: watch::Sender<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let request = SessionOpenRequest {
            visitor_id,
            user_agent: config.user_agent.clone(),
            referrer: config.referrer.clone(),
        };
        let opened = session
            .initialize(&backend, request, config.http_timeout)
            .await;
        if let Some(opened) = opened {
            bus.publish(AnalyticsEvent::SessionStarted(opened.clone()))
                .await;
            match RealtimeChannel::connect(
                config.channel.clone(),
                backend.base_url(),
                &opened.session_id,
                http,
                bus.clone(),
            ) {
                Ok(channel) => {
                    *channel_slot.write() = Some(channel);
                }
                Err(e) => warn!("[Analytics] realtime channel unavailable => {:?}", e),
            }
        }
        let _ = settled_tx.send(true);
    })
}

/// Forwards detector alerts off the bus: POSTs them to the backend and
/// mirrors them to the measurement sink.
fn spawn_alert_forwarder_task(
    bus: Arc<EventBus>,
    backend: Arc<AnalyticsBackend>,
    sink: Arc<dyn MeasurementSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut rx = bus.subscribe(None).await;
        let mut shutdown_rx = bus.shutdown_rx.clone();
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(AnalyticsEvent::DevToolsDetected(alert)) => {
                            info!("[Analytics] dev tools detected => page={}", alert.page_url);
                            if let Err(e) = backend.post_alert(&alert).await {
                                warn!("[Analytics] alert post failed => {:?}", e);
                            }
                            let event = MeasurementEvent::new("Security", "dev_tools_opened")
                                .with_label(alert.page_url.clone());
                            if let Err(e) = sink.record_event(&alert.visitor_id, &event).await {
                                warn!("[Analytics] alert mirror failed => {:?}", e);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        debug!("[Analytics] alert forwarder sees shutdown.");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingHttpClient, test_config};
    use footfall_common::models::visitor::{CookieRecord, SameSite};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use footfall_common::models::viewport::ViewportSample;

    struct FixedJar {
        visitor_id: String,
    }

    #[async_trait]
    impl CookieJar for FixedJar {
        async fn load(&self, name: &str) -> Result<Option<CookieRecord>, Error> {
            Ok(Some(CookieRecord {
                name: name.to_string(),
                value: self.visitor_id.clone(),
                expires_at: Utc::now() + ChronoDuration::days(1),
                same_site: SameSite::Lax,
            }))
        }

        async fn store(&self, _record: &CookieRecord) -> Result<(), Error> {
            Ok(())
        }

        async fn remove(&self, _name: &str) -> Result<(), Error> {
            Ok(())
        }
    }

    struct StaticViewport;

    impl ViewportSource for StaticViewport {
        fn sample(&self) -> ViewportSample {
            ViewportSample::new(1280, 720, 1280, 720)
        }
    }

    async fn client_with(
        config: AnalyticsConfig,
        http: Arc<RecordingHttpClient>,
    ) -> Arc<AnalyticsClient> {
        let jar = Arc::new(FixedJar {
            visitor_id: "visitor-1".to_string(),
        });
        let viewport = Arc::new(StaticViewport);
        AnalyticsClient::create_with_http(config, jar, viewport, http)
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn session_opens_in_the_background() {
        let http = Arc::new(
            RecordingHttpClient::new()
                .with_response("/api/analytics/session", 200, r#"{"session_id":"s-9"}"#)
                .with_error("/api/analytics/poll"),
        );
        let client = client_with(test_config(), http.clone()).await;

        client.wait_until_settled().await;
        assert_eq!(client.session_id().as_deref(), Some("s-9"));
        assert!(matches!(client.session_state(), SessionState::Established(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_settles_inert() {
        let http = Arc::new(
            RecordingHttpClient::new().with_error("/api/analytics/session"),
        );
        let client = client_with(test_config(), http.clone()).await;

        client.wait_until_settled().await;
        assert_eq!(client.session_id(), None);
        assert!(matches!(client.session_state(), SessionState::Inert));
        assert_eq!(client.channel_status(), ChannelStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn scroll_depth_reaches_the_sink_only() {
        let mut config = test_config();
        config.measurement = Some(crate::config::MeasurementConfig {
            measurement_id: "G-TEST".to_string(),
            api_secret: "secret".to_string(),
        });
        let http = Arc::new(
            RecordingHttpClient::new().with_error("/api/analytics/session"),
        );
        let client = client_with(config, http.clone()).await;
        client.wait_until_settled().await;

        client.track_scroll_depth(75);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let collects = http.matching("google-analytics.com/mp/collect");
        assert_eq!(collects.len(), 1);
        let body = collects[0].body.clone().unwrap();
        assert_eq!(body["events"][0]["name"], "scroll_depth");
        assert_eq!(body["events"][0]["params"]["event_label"], "75%");
        assert_eq!(body["events"][0]["params"]["value"], 75);
        assert!(http.matching("backend.test").iter().all(|r| r.url.contains("/session")));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_is_idempotent() {
        let http = Arc::new(
            RecordingHttpClient::new().with_error("/api/analytics/session"),
        );
        let client = client_with(test_config(), http).await;
        client.wait_until_settled().await;
        client.shutdown().await;
        client.shutdown().await;
    }
}
