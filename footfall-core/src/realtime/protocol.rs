//! src/realtime/protocol.rs
//!
//! Wire envelopes for the realtime channel. Everything is JSON of the shape
//! `{"event": "...", "data": {...}}`, over the WebSocket or the polling
//! fallback alike.

use serde::{Deserialize, Serialize};

use footfall_common::models::alert::DevToolsAlert;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ChannelMessage {
    /// Client to server: join the privileged alert room. The token is a
    /// bearer credential issued elsewhere; it is forwarded, never inspected.
    JoinAdmin { token: String },

    /// Server to room members: some client tripped a detector.
    DevToolsAlert(DevToolsAlert),
}

/// Response body of the polling fallback's GET. `cursor` is opaque to the
/// client and echoed back on the next request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollResponse {
    pub cursor: u64,
    pub events: Vec<ChannelMessage>,
}
