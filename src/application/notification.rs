//! Notifications pushed to the agent UI

use crate::domain::call::value_object::{CallDirection, CallStatus};
use crate::domain::session::value_object::SessionStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Things the UI layer needs to react to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Notification {
    SessionStatusChanged {
        status: SessionStatus,
    },
    CallStatusChanged {
        status: CallStatus,
        direction: Option<CallDirection>,
        remote_party: Option<String>,
    },
    /// Pending-answer notification for an inbound offer
    IncomingCall {
        from: String,
        to: String,
    },
    IncomingCallCleared,
    /// Offer auto-rejected because a call is already in progress
    BusyRejected {
        from: String,
    },
    MuteChanged {
        muted: bool,
    },
    VolumeChanged {
        level: u8,
    },
    DialBufferChanged {
        digits: String,
    },
    TimerTick {
        elapsed_secs: u64,
        formatted: String,
    },
    ReportPromptOpened {
        provider_call_id: String,
        originating_number: String,
    },
    ReportPromptClosed {
        provider_call_id: String,
    },
    ReportSubmitted {
        provider_call_id: String,
    },
    ReportSubmissionFailed {
        provider_call_id: String,
        error: String,
    },
    HistoryRefreshed {
        number: Option<String>,
    },
    TokenRenewed,
    TokenRenewalFailed {
        error: String,
    },
    Error {
        message: String,
    },
}

/// Notification broadcaster
#[derive(Clone)]
pub struct NotificationBroadcaster {
    tx: broadcast::Sender<Notification>,
}

impl NotificationBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Publish a notification
    pub fn publish(&self, notification: Notification) {
        // No subscribers is fine
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for NotificationBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
