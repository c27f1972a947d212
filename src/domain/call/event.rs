//! Call domain events

use crate::domain::call::value_object::{CallDirection, CallStatus, EndReason};
use crate::domain::shared::value_objects::ProviderCallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Implemented by every call event
pub trait DomainEvent: Send + Sync {
    fn event_type(&self) -> &'static str;

    fn occurred_at(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
}

/// Base struct for all call events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEventBase {
    pub metadata: EventMetadata,
    pub provider_call_id: Option<ProviderCallId>,
}

impl CallEventBase {
    pub fn new(event_type: &str, provider_call_id: Option<ProviderCallId>) -> Self {
        Self {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                occurred_at: Utc::now(),
                event_type: event_type.to_string(),
            },
            provider_call_id,
        }
    }
}

/// Call record created for a dial or an inbound offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallCreated {
    pub base: CallEventBase,
    pub direction: CallDirection,
    pub remote_party: String,
}

impl DomainEvent for CallCreated {
    fn event_type(&self) -> &'static str {
        "call.created"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Call status changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStatusChanged {
    pub base: CallEventBase,
    pub from: CallStatus,
    pub to: CallStatus,
}

impl DomainEvent for CallStatusChanged {
    fn event_type(&self) -> &'static str {
        "call.status_changed"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Agent mute flag changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMuteChanged {
    pub base: CallEventBase,
    pub muted: bool,
}

impl DomainEvent for CallMuteChanged {
    fn event_type(&self) -> &'static str {
        "call.mute_changed"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Call left the live states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnded {
    pub base: CallEventBase,
    pub reason: EndReason,
    pub duration_seconds: Option<i64>,
}

impl DomainEvent for CallEnded {
    fn event_type(&self) -> &'static str {
        "call.ended"
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.base.metadata.occurred_at
    }
}

/// Union of all call events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    Created(CallCreated),
    StatusChanged(CallStatusChanged),
    MuteChanged(CallMuteChanged),
    Ended(CallEnded),
}

impl CallEvent {
    pub fn base(&self) -> &CallEventBase {
        match self {
            CallEvent::Created(e) => &e.base,
            CallEvent::StatusChanged(e) => &e.base,
            CallEvent::MuteChanged(e) => &e.base,
            CallEvent::Ended(e) => &e.base,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            CallEvent::Created(e) => e.event_type(),
            CallEvent::StatusChanged(e) => e.event_type(),
            CallEvent::MuteChanged(e) => e.event_type(),
            CallEvent::Ended(e) => e.event_type(),
        }
    }
}
