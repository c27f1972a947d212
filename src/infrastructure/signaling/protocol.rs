//! Signaling gateway wire protocol
//!
//! JSON text frames, one object per frame, discriminated by `type`.
//! Every per-call frame carries the `call_ref` the call was opened with.

use serde::{Deserialize, Serialize};

/// Frames sent to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Register { token: String },
    UpdateToken { token: String },
    Connect { call_ref: String, to: String, from: String },
    Accept { call_ref: String },
    Reject { call_ref: String },
    Disconnect { call_ref: String },
    Mute { call_ref: String, muted: bool },
    /// Gain in 0.0..=1.0
    Volume { call_ref: String, level: f32 },
    Digits { call_ref: String, digits: String },
}

/// Frames received from the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    Registered,
    Unregistered,
    TokenWillExpire,
    Incoming {
        call_ref: String,
        #[serde(default)]
        call_sid: Option<String>,
        from: String,
        to: String,
    },
    /// Provider call id assigned to an outbound call
    CallSid { call_ref: String, call_sid: String },
    Ringing { call_ref: String },
    Accepted { call_ref: String },
    Disconnected { call_ref: String },
    Cancelled { call_ref: String },
    Rejected { call_ref: String },
    Muted { call_ref: String, muted: bool },
    Error {
        #[serde(default)]
        call_ref: Option<String>,
        message: String,
    },
}
