//! Call value objects

use crate::domain::shared::error::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Offer presented to the agent by the transport
    Inbound,
    /// Call placed by the agent
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }
}

/// Softphone call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// No call; the dial pad is enabled
    Idle,
    /// Outbound call requested, transport negotiating
    Connecting,
    /// Remote side alerting (outbound) or offer awaiting the agent (inbound)
    Ringing,
    /// Media established
    Connected,
    /// Held by the agent
    Hold,
    /// Call finished; shown until the grace delay elapses
    Ended,
}

impl CallStatus {
    /// Check if status transition is valid
    pub fn can_transition_to(&self, next: &CallStatus) -> bool {
        use CallStatus::*;

        match (self, next) {
            (Idle, Connecting) => true,
            (Idle, Ringing) => true,

            (Connecting, Ringing) => true,
            (Connecting, Connected) => true,
            (Connecting, Idle) => true,
            (Connecting, Ended) => true,

            (Ringing, Connected) => true,
            (Ringing, Idle) => true,
            (Ringing, Ended) => true,

            (Connected, Hold) => true,
            (Connected, Ended) => true,

            (Hold, Connected) => true,
            (Hold, Ended) => true,

            (Ended, Idle) => true,

            _ => false,
        }
    }

    /// Idle and Ended are terminal-equivalent: no live call exists
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Idle | CallStatus::Ended)
    }

    /// The call timer only ticks in these states
    pub fn is_timed(&self) -> bool {
        matches!(self, CallStatus::Connected | CallStatus::Hold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "idle",
            CallStatus::Connecting => "connecting",
            CallStatus::Ringing => "ringing",
            CallStatus::Connected => "connected",
            CallStatus::Hold => "hold",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call left the live states
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// Either side hung up an established or alerting call
    Disconnected,
    /// Caller withdrew the offer before it was answered
    Cancelled,
    /// Offer declined, by the agent or the remote side
    Rejected,
    /// Transport-level failure; no human terminated the call
    Failed(String),
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Disconnected => "disconnected",
            EndReason::Cancelled => "cancelled",
            EndReason::Rejected => "rejected",
            EndReason::Failed(_) => "failed",
        }
    }

    /// Human-terminated calls get a post-call report prompt
    pub fn wants_report(&self) -> bool {
        !matches!(self, EndReason::Failed(_))
    }
}

/// Playback volume in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(u8);

impl Volume {
    pub const MAX: u8 = 100;

    pub fn new(level: u8) -> Result<Self, DomainError> {
        if level > Self::MAX {
            return Err(DomainError::ValidationError(format!(
                "volume must be between 0 and {}, got {}",
                Self::MAX,
                level
            )));
        }
        Ok(Self(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// Level as the 0.0..=1.0 gain the transport expects
    pub fn normalized(&self) -> f32 {
        f32::from(self.0) / f32::from(Self::MAX)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(Self::MAX)
    }
}
