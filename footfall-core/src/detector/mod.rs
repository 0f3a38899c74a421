//! src/detector/mod.rs
//!
//! Dev-tools-open detection. Two heuristics feed the same alert path:
//!
//! - the dimension heuristic polls the viewport and treats a large
//!   outer-minus-inner delta as a docked inspection pane. Edge-triggered:
//!   one alert per closed-to-open transition, the flag rearms when both
//!   deltas drop back under the threshold, and closing never emits.
//! - the inspect trap is a host-wired trigger for whatever console-hook
//!   machinery the environment offers. It fires at most once per client
//!   lifetime and is best-effort by nature.
//!
//! Both paths emit only while a session is established. Alerts land on the
//! event bus; the client's forwarder takes them to the backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use footfall_common::models::alert::DevToolsAlert;
use footfall_common::models::viewport::ViewportSample;
use footfall_common::traits::host_traits::ViewportSource;

use crate::config::DetectorConfig;
use crate::eventbus::{AnalyticsEvent, EventBus};
use crate::pageview::PageViewRecorder;
use crate::session::SessionManager;

/// A `ViewportSource` fed by the host. Call `set` from the resize handler;
/// the detector samples whatever was set last.
#[derive(Clone, Default)]
pub struct SharedViewport {
    sample: Arc<RwLock<ViewportSample>>,
}

impl SharedViewport {
    pub fn new(initial: ViewportSample) -> Self {
        Self {
            sample: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, sample: ViewportSample) {
        *self.sample.write() = sample;
    }
}

impl ViewportSource for SharedViewport {
    fn sample(&self) -> ViewportSample {
        *self.sample.read()
    }
}

/// Host-visible handle for the secondary heuristic. The first `trigger`
/// wakes the detector; every later one is swallowed by the latch.
#[derive(Default)]
pub struct InspectTrap {
    notify: Notify,
    fired: AtomicBool,
}

impl InspectTrap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report that the host's inspection hook tripped. Sync and infallible,
    /// callable from any thread.
    pub fn trigger(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            debug!("[Detector] inspect trap already fired => ignoring");
            return;
        }
        self.notify.notify_one();
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    async fn tripped(&self) {
        self.notify.notified().await;
    }
}

/// Spawns the polling task. It runs until the bus signals shutdown.
pub fn spawn_detector_task(
    config: DetectorConfig,
    viewport: Arc<dyn ViewportSource>,
    trap: Arc<InspectTrap>,
    session: Arc<SessionManager>,
    recorder: Arc<PageViewRecorder>,
    visitor_id: String,
    user_agent: String,
    bus: Arc<EventBus>,
) -> JoinHandle<()> {
    let mut shutdown_rx = bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!(
            "[Detector] task started; poll={:?} threshold={}px",
            config.poll_interval, config.threshold_px
        );

        let mut ticker = interval(config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut open = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sample = viewport.sample();
                    let exceeded = sample.exceeds_threshold(config.threshold_px);
                    if exceeded && !open {
                        open = true;
                        debug!(
                            "[Detector] dimension edge => dw={} dh={}",
                            sample.width_delta(), sample.height_delta()
                        );
                        emit_alert(&session, &recorder, &visitor_id, &user_agent, &bus).await;
                    } else if !exceeded && open {
                        // Back under threshold: rearm quietly.
                        open = false;
                        debug!("[Detector] deltas back under threshold => rearmed");
                    }
                }
                _ = trap.tripped() => {
                    debug!("[Detector] inspect trap tripped");
                    emit_alert(&session, &recorder, &visitor_id, &user_agent, &bus).await;
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("[Detector] task exited.");
    })
}

/// Publish one alert, if a session exists. Without one the edge is consumed
/// silently and is not replayed later.
async fn emit_alert(
    session: &SessionManager,
    recorder: &PageViewRecorder,
    visitor_id: &str,
    user_agent: &str,
    bus: &EventBus,
) {
    let Some(session_id) = session.session_id() else {
        debug!("[Detector] no session => alert dropped");
        return;
    };
    let alert = DevToolsAlert {
        visitor_id: visitor_id.to_string(),
        session_id,
        user_agent: user_agent.to_string(),
        page_url: recorder.current_page_url().unwrap_or_default(),
        timestamp: Utc::now(),
    };
    bus.publish(AnalyticsEvent::DevToolsDetected(alert)).await;
}
