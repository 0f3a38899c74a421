//! src/eventbus/mod.rs
//!
//! Provides an in-process event bus that supports guaranteed delivery
//! to multiple subscribers via bounded MPSC queues. The pipeline's tasks
//! publish onto it; the client's forwarder and any host subscribers
//! (the admin dashboard, tests) consume from it.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

use footfall_common::models::alert::DevToolsAlert;
use footfall_common::models::pageview::PageViewRecord;
use footfall_common::models::session::Session;

/// Everything the pipeline announces about itself.
#[derive(Debug, Clone)]
pub enum AnalyticsEvent {
    /// The single session open attempt succeeded.
    SessionStarted(Session),

    /// A page view record was handed to the delivery path. Fired for both
    /// entry pings and dwell flushes, before the network attempt resolves.
    PageViewRecorded(PageViewRecord),

    /// A local heuristic fired on this client. The forwarder task posts
    /// these to the backend.
    DevToolsDetected(DevToolsAlert),

    /// An alert pushed down the realtime channel (some client, possibly
    /// this one, tripped a detector). This is what admin subscribers see.
    AlertBroadcast(DevToolsAlert),
}

impl AnalyticsEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AnalyticsEvent::SessionStarted(_) => "session_started",
            AnalyticsEvent::PageViewRecorded(_) => "page_view_recorded",
            AnalyticsEvent::DevToolsDetected(_) => "dev_tools_detected",
            AnalyticsEvent::AlertBroadcast(_) => "alert_broadcast",
        }
    }
}

/// Each subscriber gets its own `mpsc::Sender<AnalyticsEvent>` for guaranteed
/// delivery.
///
/// - If the subscriber's channel buffer fills, `publish` will await
///   until there's space (backpressure).
/// - If the subscriber has dropped the `Receiver`, the channel is closed
///   and sending returns an error.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<AnalyticsEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Default size for each subscriber's buffer. Adjust as needed.
const DEFAULT_BUFFER_SIZE: usize = 512;

impl EventBus {
    /// Create a new, empty event bus.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(vec![])),
            shutdown_tx: tx,
            shutdown_rx: rx,
        }
    }

    pub fn shutdown(&self) {
        // Setting watch to true
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Returns a receiver on which events will be delivered.
    pub async fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<AnalyticsEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        let mut subs = self.subscribers.lock().await;
        subs.push(tx);
        rx
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: AnalyticsEvent) {
        let senders = {
            let subs = self.subscribers.lock().await;
            subs.clone()
        };
        for s in senders {
            let _ = s.send(event.clone()).await;
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
