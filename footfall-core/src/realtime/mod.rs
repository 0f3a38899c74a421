//! src/realtime/mod.rs
//!
//! Live alert delivery. Opened only once a session id is known. The channel
//! prefers a WebSocket to the backend and falls back to request polling when
//! the socket cannot be established; a dropped transport gets a fixed number
//! of fixed-backoff reconnects and then the channel goes quiet for good.
//! Nothing in here surfaces an error to the host: status is tracked and
//! logged, inbound alerts are published on the event bus.

pub mod protocol;

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use footfall_common::Error;
use footfall_common::models::alert::DevToolsAlert;

use crate::config::ChannelConfig;
use crate::eventbus::{AnalyticsEvent, EventBus};
use crate::http::HttpClient;
use crate::realtime::protocol::{ChannelMessage, PollResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Pause between polling-fallback requests.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatus {
    Connected,
    Disconnected,
    Reconnecting,
}

enum LoopOutcome {
    Shutdown,
    Dropped,
}

enum PollOutcome {
    Shutdown,
    Failed { ever_connected: bool },
}

/// Handle on the live channel. Created via [`RealtimeChannel::connect`];
/// must be closed explicitly during client shutdown so the socket and its
/// tasks do not leak.
pub struct RealtimeChannel {
    status: Arc<RwLock<ChannelStatus>>,
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
    runtime_task: Mutex<Option<JoinHandle<()>>>,
    dispatcher_tasks: Mutex<Vec<JoinHandle<()>>>,
    bus: Arc<EventBus>,
}

impl RealtimeChannel {
    /// Start the channel runtime against `base_url`, scoped to `session_id`.
    pub fn connect(
        config: ChannelConfig,
        base_url: &str,
        session_id: &str,
        http: Arc<dyn HttpClient>,
        bus: Arc<EventBus>,
    ) -> Result<Self, Error> {
        let endpoints = ChannelEndpoints::from_base(base_url, session_id)?;
        let status = Arc::new(RwLock::new(ChannelStatus::Disconnected));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<ChannelMessage>();
        let runtime_task = spawn_channel_task(
            config,
            endpoints,
            http,
            bus.clone(),
            status.clone(),
            outbound_rx,
        );
        Ok(Self {
            status,
            outbound_tx: Mutex::new(Some(outbound_tx)),
            runtime_task: Mutex::new(Some(runtime_task)),
            dispatcher_tasks: Mutex::new(Vec::new()),
            bus,
        })
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.read().clone()
    }

    /// Ask the backend to add this connection to the admin alert room. The
    /// token is forwarded as-is; a closed channel drops the request with a
    /// warning.
    pub fn join_admin_room(&self, token: &str) {
        let guard = self.outbound_tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                let msg = ChannelMessage::JoinAdmin { token: token.to_string() };
                if tx.send(msg).is_err() {
                    warn!("[Realtime] runtime gone => join_admin dropped");
                }
            }
            None => warn!("[Realtime] channel closed => join_admin dropped"),
        }
    }

    /// Register a callback for pushed alerts. May be called multiple times;
    /// each callback gets its own dispatcher task and every alert.
    pub fn on_dev_tools_alert<F>(&self, callback: F)
    where
        F: Fn(DevToolsAlert) + Send + 'static,
    {
        let handle = spawn_alert_dispatcher_task(self.bus.clone(), callback);
        self.dispatcher_tasks.lock().push(handle);
    }

    /// Close the transport and stop every task the channel owns. Idempotent.
    pub async fn close(&self) {
        self.outbound_tx.lock().take();

        let task = self.runtime_task.lock().take();
        if let Some(mut task) = task {
            if timeout(Duration::from_secs(2), &mut task).await.is_err() {
                warn!("[Realtime] runtime did not stop in time => aborting");
                task.abort();
            }
        }

        for handle in self.dispatcher_tasks.lock().drain(..) {
            handle.abort();
        }
        *self.status.write() = ChannelStatus::Disconnected;
    }
}

struct ChannelEndpoints {
    ws_url: String,
    poll_url: String,
    session_id: String,
}

impl ChannelEndpoints {
    fn from_base(base_url: &str, session_id: &str) -> Result<Self, Error> {
        let mut ws = Url::parse(base_url)?;
        let ws_scheme = match ws.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        ws.set_scheme(ws_scheme)
            .map_err(|_| Error::Channel(format!("cannot derive websocket URL from {}", base_url)))?;
        ws.set_path("/api/analytics/ws");
        ws.set_query(Some(&format!("session_id={}", session_id)));

        Ok(Self {
            ws_url: ws.to_string(),
            poll_url: format!("{}/api/analytics/poll", base_url.trim_end_matches('/')),
            session_id: session_id.to_string(),
        })
    }

    fn poll_get_url(&self, cursor: u64) -> String {
        format!("{}?session_id={}&cursor={}", self.poll_url, self.session_id, cursor)
    }

    fn poll_post_url(&self) -> String {
        format!("{}?session_id={}", self.poll_url, self.session_id)
    }
}

fn spawn_channel_task(
    config: ChannelConfig,
    endpoints: ChannelEndpoints,
    http: Arc<dyn HttpClient>,
    bus: Arc<EventBus>,
    status: Arc<RwLock<ChannelStatus>>,
    mut outbound_rx: mpsc::UnboundedReceiver<ChannelMessage>,
) -> JoinHandle<()> {
    let mut shutdown_rx = bus.shutdown_rx.clone();

    tokio::spawn(async move {
        info!("[Realtime] channel task started => {}", endpoints.ws_url);
        let mut reconnects_left = config.reconnect_attempts;

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let ws = match timeout(config.connect_timeout, connect_async(endpoints.ws_url.as_str())).await {
                Ok(Ok((ws, _response))) => Some(ws),
                Ok(Err(e)) => {
                    warn!("[Realtime] websocket connect failed => {}", e);
                    None
                }
                Err(_) => {
                    warn!(
                        "[Realtime] websocket connect timed out after {:?}",
                        config.connect_timeout
                    );
                    None
                }
            };

            let shutdown = if let Some(ws) = ws {
                info!("[Realtime] websocket connected");
                *status.write() = ChannelStatus::Connected;
                reconnects_left = config.reconnect_attempts;
                match run_websocket(ws, &mut outbound_rx, &bus, &mut shutdown_rx).await {
                    LoopOutcome::Shutdown => true,
                    LoopOutcome::Dropped => {
                        warn!("[Realtime] websocket dropped");
                        false
                    }
                }
            } else {
                info!("[Realtime] falling back to request polling");
                match run_polling(
                    &endpoints,
                    http.as_ref(),
                    config.connect_timeout,
                    &mut outbound_rx,
                    &bus,
                    &status,
                    &mut shutdown_rx,
                )
                .await
                {
                    PollOutcome::Shutdown => true,
                    PollOutcome::Failed { ever_connected } => {
                        if ever_connected {
                            reconnects_left = config.reconnect_attempts;
                        }
                        false
                    }
                }
            };

            if shutdown {
                break;
            }

            if reconnects_left == 0 {
                info!("[Realtime] reconnect attempts exhausted => giving up");
                break;
            }
            reconnects_left -= 1;
            *status.write() = ChannelStatus::Reconnecting;

            tokio::select! {
                _ = sleep(config.reconnect_backoff) => {}
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        *status.write() = ChannelStatus::Disconnected;
        info!("[Realtime] channel task exited.");
    })
}

/// Drive one live WebSocket until it drops or shutdown is signalled.
async fn run_websocket(
    ws: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<ChannelMessage>,
    bus: &EventBus,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LoopOutcome {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            maybe_msg = read.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(txt))) => {
                        dispatch_inbound(&txt, bus).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("[Realtime] websocket closed by server: {:?}", frame);
                        return LoopOutcome::Dropped;
                    }
                    Some(Ok(_other)) => {
                        // ping/pong or binary; nothing to do
                    }
                    Some(Err(e)) => {
                        warn!("[Realtime] websocket error => {}", e);
                        return LoopOutcome::Dropped;
                    }
                    None => {
                        info!("[Realtime] websocket stream ended.");
                        return LoopOutcome::Dropped;
                    }
                }
            }
            maybe_out = outbound_rx.recv() => {
                match maybe_out {
                    Some(msg) => {
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = write.send(Message::Text(json.into())).await {
                                    warn!("[Realtime] send failed => {}", e);
                                    return LoopOutcome::Dropped;
                                }
                            }
                            Err(e) => {
                                warn!("[Realtime] could not encode outbound message => {}", e);
                            }
                        }
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        return LoopOutcome::Shutdown;
                    }
                }
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = write.send(Message::Close(None)).await;
                    return LoopOutcome::Shutdown;
                }
            }
        }
    }
}

async fn dispatch_inbound(raw: &str, bus: &EventBus) {
    match serde_json::from_str::<ChannelMessage>(raw) {
        Ok(ChannelMessage::DevToolsAlert(alert)) => {
            debug!("[Realtime] alert pushed => page={}", alert.page_url);
            bus.publish(AnalyticsEvent::AlertBroadcast(alert)).await;
        }
        Ok(other) => {
            debug!("[Realtime] ignoring inbound message: {:?}", other);
        }
        Err(e) => {
            debug!("[Realtime] unhandled inbound payload => {}", e);
        }
    }
}

/// Request-polling fallback. Runs until the transport fails, the channel is
/// closed, or shutdown is signalled.
async fn run_polling(
    endpoints: &ChannelEndpoints,
    http: &dyn HttpClient,
    request_timeout: Duration,
    outbound_rx: &mut mpsc::UnboundedReceiver<ChannelMessage>,
    bus: &EventBus,
    status: &RwLock<ChannelStatus>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> PollOutcome {
    let mut cursor = 0u64;
    let mut ever_connected = false;

    loop {
        if *shutdown_rx.borrow() {
            return PollOutcome::Shutdown;
        }

        match http.get(endpoints.poll_get_url(cursor), request_timeout).await {
            Ok(resp) if resp.is_success() => {
                if !ever_connected {
                    info!("[Realtime] polling transport established");
                    *status.write() = ChannelStatus::Connected;
                    ever_connected = true;
                }
                match serde_json::from_str::<PollResponse>(&resp.body) {
                    Ok(poll) => {
                        cursor = poll.cursor;
                        for msg in poll.events {
                            if let ChannelMessage::DevToolsAlert(alert) = msg {
                                bus.publish(AnalyticsEvent::AlertBroadcast(alert)).await;
                            }
                        }
                    }
                    Err(e) => {
                        debug!("[Realtime] bad poll body => {}", e);
                    }
                }
            }
            Ok(resp) => {
                warn!("[Realtime] poll returned status {}", resp.status);
                return PollOutcome::Failed { ever_connected };
            }
            Err(e) => {
                warn!("[Realtime] poll failed => {}", e);
                return PollOutcome::Failed { ever_connected };
            }
        }

        // Wait out the poll interval, shipping queued outbound messages as
        // they arrive.
        tokio::select! {
            _ = sleep(POLL_INTERVAL) => {}
            maybe_out = outbound_rx.recv() => {
                match maybe_out {
                    Some(msg) => {
                        if let Err(e) = post_outbound(endpoints, http, request_timeout, &msg).await {
                            warn!("[Realtime] outbound post failed => {}", e);
                        }
                    }
                    None => return PollOutcome::Shutdown,
                }
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return PollOutcome::Shutdown;
                }
            }
        }
    }
}

async fn post_outbound(
    endpoints: &ChannelEndpoints,
    http: &dyn HttpClient,
    request_timeout: Duration,
    msg: &ChannelMessage,
) -> Result<(), Error> {
    let body = serde_json::to_value(msg)?;
    let resp = http.post_json(endpoints.poll_post_url(), body, request_timeout).await?;
    if !resp.is_success() {
        return Err(Error::Channel(format!(
            "outbound post returned status {}",
            resp.status
        )));
    }
    Ok(())
}

/// One dispatcher per registered callback: forwards every pushed alert from
/// the bus to the callback until shutdown.
pub fn spawn_alert_dispatcher_task<F>(bus: Arc<EventBus>, callback: F) -> JoinHandle<()>
where
    F: Fn(DevToolsAlert) + Send + 'static,
{
    tokio::spawn(async move {
        let mut rx = bus.subscribe(None).await;
        let mut shutdown_rx = bus.shutdown_rx.clone();
        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(AnalyticsEvent::AlertBroadcast(alert)) => callback(alert),
                        Some(_other) => {}
                        None => break,
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[Realtime] alert dispatcher exited.");
    })
}
