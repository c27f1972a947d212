//! Voice transport port
//!
//! The softphone never speaks SIP or WebRTC itself. It drives an opaque
//! transport "device" through these traits and receives its signaling as a
//! typed event stream.

use crate::domain::session::value_object::SessionToken;
use crate::domain::shared::value_objects::{LegId, PhoneNumber, ProviderCallId};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Transport failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Registration failed: {0}")]
    Register(String),

    #[error("Transport closed")]
    Closed,
}

/// Parameters of an outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub to: PhoneNumber,
    pub from: PhoneNumber,
}

/// One call leg owned by the transport
pub trait CallLeg: Send + Sync {
    fn id(&self) -> LegId;

    /// Known once the backend has negotiated the call
    fn provider_call_id(&self) -> Option<ProviderCallId>;

    fn accept(&self) -> Result<(), TransportError>;

    fn reject(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;

    fn mute(&self, muted: bool) -> Result<(), TransportError>;

    /// Gain in 0.0..=1.0
    fn set_volume(&self, gain: f32) -> Result<(), TransportError>;

    fn send_digits(&self, digits: &str) -> Result<(), TransportError>;
}

/// The registered connection to the signaling backend
#[async_trait]
pub trait VoiceDevice: Send + Sync {
    async fn register(&self) -> Result<(), TransportError>;

    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn CallLeg>, TransportError>;

    /// Swap in a fresh token without dropping the registration
    fn update_token(&self, token: &SessionToken) -> Result<(), TransportError>;

    /// Release the underlying transport. Must not block.
    fn destroy(&self);
}

/// Builds devices; the event sender is wired in before anything can fire
#[async_trait]
pub trait DeviceFactory: Send + Sync {
    async fn create(
        &self,
        token: &SessionToken,
        events: TransportEventSender,
    ) -> Result<Arc<dyn VoiceDevice>, TransportError>;
}

pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;
pub type TransportEventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// An inbound call waiting for the agent
pub struct CallOffer {
    pub leg: Box<dyn CallLeg>,
    /// Remote party identifier as presented by the backend
    pub from: String,
    /// The agent's number the call arrived on
    pub to: String,
}

impl fmt::Debug for CallOffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOffer")
            .field("leg", &self.leg.id())
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// Per-call signaling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallLegEvent {
    Ringing,
    Accepted,
    Disconnected,
    Cancelled,
    Rejected,
    /// Authoritative mute state echoed by the transport
    Muted(bool),
    Error(String),
}

impl CallLegEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CallLegEvent::Ringing => "ringing",
            CallLegEvent::Accepted => "accept",
            CallLegEvent::Disconnected => "disconnect",
            CallLegEvent::Cancelled => "cancel",
            CallLegEvent::Rejected => "reject",
            CallLegEvent::Muted(_) => "mute",
            CallLegEvent::Error(_) => "error",
        }
    }

    /// The leg is finished once this event arrives
    pub fn ends_call(&self) -> bool {
        matches!(
            self,
            CallLegEvent::Disconnected
                | CallLegEvent::Cancelled
                | CallLegEvent::Rejected
                | CallLegEvent::Error(_)
        )
    }
}

/// Everything the transport can tell the softphone
#[derive(Debug)]
pub enum TransportEvent {
    Registered,
    Unregistered,
    TokenWillExpire,
    Incoming(CallOffer),
    DeviceError(String),
    Call { leg: LegId, event: CallLegEvent },
}

impl TransportEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransportEvent::Registered => "registered",
            TransportEvent::Unregistered => "unregistered",
            TransportEvent::TokenWillExpire => "tokenWillExpire",
            TransportEvent::Incoming(_) => "incoming",
            TransportEvent::DeviceError(_) => "error",
            TransportEvent::Call { event, .. } => event.name(),
        }
    }
}
