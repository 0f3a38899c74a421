//! src/beacon.rs
//!
//! Teardown-surviving delivery queue. Callers enqueue synchronously and walk
//! away; a worker task owns the queued requests and keeps sending until the
//! queue is closed and drained. `shutdown` closes the queue and waits for the
//! drain under a bounded grace period, so final records get their delivery
//! attempt even while the rest of the pipeline is being torn down.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::http::HttpClient;

/// One queued request. GETs carry everything in the URL so they stay
/// deliverable with no surrounding context.
#[derive(Debug, Clone)]
pub enum BeaconRequest {
    Get { url: String },
    PostJson { url: String, body: serde_json::Value },
}

impl BeaconRequest {
    pub fn url(&self) -> &str {
        match self {
            BeaconRequest::Get { url } => url,
            BeaconRequest::PostJson { url, .. } => url,
        }
    }
}

/// Sending half of the queue. Enqueue never blocks and never fails; once the
/// queue is closed, further beacons are dropped with a warning.
pub struct BeaconQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<BeaconRequest>>>,
}

impl BeaconQueue {
    pub fn enqueue(&self, req: BeaconRequest) {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(req).is_err() {
                    warn!("[BeaconQueue] worker gone => beacon dropped");
                }
            }
            None => {
                warn!("[BeaconQueue] queue closed => beacon dropped");
            }
        }
    }

    /// Close the queue. Already-enqueued requests are still delivered; the
    /// worker exits once they are done.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

/// Spawns the delivery worker. Returns the queue handle and the worker's
/// `JoinHandle` so shutdown logic can await the final drain.
pub fn spawn_beacon_worker_task(
    http: Arc<dyn HttpClient>,
    timeout: Duration,
) -> (Arc<BeaconQueue>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<BeaconRequest>();

    let handle = tokio::spawn(async move {
        info!("[BeaconQueue] worker task started.");

        while let Some(req) = rx.recv().await {
            deliver(http.as_ref(), &req, timeout).await;
        }

        info!("[BeaconQueue] queue closed => worker exiting after drain.");
    });

    let queue = Arc::new(BeaconQueue {
        tx: Mutex::new(Some(tx)),
    });
    (queue, handle)
}

async fn deliver(http: &dyn HttpClient, req: &BeaconRequest, timeout: Duration) {
    let result = match req {
        BeaconRequest::Get { url } => http.get(url.clone(), timeout).await,
        BeaconRequest::PostJson { url, body } => {
            http.post_json(url.clone(), body.clone(), timeout).await
        }
    };
    match result {
        Ok(resp) if resp.is_success() => {
            debug!("[BeaconQueue] delivered => {}", req.url());
        }
        Ok(resp) => {
            warn!("[BeaconQueue] {} returned status {}", req.url(), resp.status);
        }
        Err(e) => {
            warn!("[BeaconQueue] delivery failed for {} => {}", req.url(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::helpers::RecordingHttpClient;

    #[tokio::test]
    async fn drains_backlog_after_close() {
        let http = Arc::new(RecordingHttpClient::new());
        let (queue, handle) = spawn_beacon_worker_task(http.clone(), Duration::from_secs(1));

        queue.enqueue(BeaconRequest::Get { url: "http://x/one".into() });
        queue.enqueue(BeaconRequest::PostJson {
            url: "http://x/two".into(),
            body: serde_json::json!({"n": 2}),
        });
        queue.close();

        handle.await.unwrap();

        let urls = http.urls();
        assert_eq!(urls, vec!["http://x/one", "http://x/two"]);
    }

    #[tokio::test]
    async fn enqueue_after_close_is_dropped() {
        let http = Arc::new(RecordingHttpClient::new());
        let (queue, handle) = spawn_beacon_worker_task(http.clone(), Duration::from_secs(1));

        queue.close();
        assert!(queue.is_closed());
        queue.enqueue(BeaconRequest::Get { url: "http://x/late".into() });

        handle.await.unwrap();
        assert!(http.urls().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_the_drain() {
        let http = Arc::new(
            RecordingHttpClient::new().with_error("/broken"),
        );
        let (queue, handle) = spawn_beacon_worker_task(http.clone(), Duration::from_secs(1));

        queue.enqueue(BeaconRequest::Get { url: "http://x/broken".into() });
        queue.enqueue(BeaconRequest::Get { url: "http://x/fine".into() });
        queue.close();

        handle.await.unwrap();
        assert_eq!(http.urls().len(), 2);
    }
}
