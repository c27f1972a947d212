//! WebSocket signaling-gateway device
//!
//! A [`VoiceDevice`] backed by one WebSocket connection to a signaling
//! gateway. A writer task drains outgoing frames onto the socket; a reader
//! task turns gateway frames into [`TransportEvent`]s.

use super::protocol::{ClientFrame, GatewayFrame};
use crate::domain::session::SessionToken;
use crate::domain::shared::value_objects::{LegId, ProviderCallId};
use crate::domain::transport::{
    CallLeg, CallLegEvent, CallOffer, ConnectParams, DeviceFactory, TransportError,
    TransportEvent, TransportEventSender, VoiceDevice,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// Per-call state shared between the leg handle and the reader task
struct LegHandle {
    id: LegId,
    call_ref: String,
    provider_call_id: Mutex<Option<ProviderCallId>>,
}

impl LegHandle {
    fn new(call_ref: String, provider_call_id: Option<ProviderCallId>) -> Arc<Self> {
        Arc::new(Self {
            id: LegId::new(),
            call_ref,
            provider_call_id: Mutex::new(provider_call_id),
        })
    }

    fn provider_call_id(&self) -> Option<ProviderCallId> {
        self.provider_call_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_provider_call_id(&self, id: ProviderCallId) {
        *self
            .provider_call_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(id);
    }
}

/// State shared by the device, its legs and the reader task
struct Shared {
    outgoing: mpsc::UnboundedSender<ClientFrame>,
    legs: Mutex<HashMap<String, Arc<LegHandle>>>,
}

impl Shared {
    fn legs(&self) -> MutexGuard<'_, HashMap<String, Arc<LegHandle>>> {
        self.legs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    fn open_leg(
        self: &Arc<Self>,
        call_ref: String,
        provider_call_id: Option<ProviderCallId>,
    ) -> GatewayLeg {
        let handle = LegHandle::new(call_ref.clone(), provider_call_id);
        self.legs().insert(call_ref, handle.clone());
        GatewayLeg {
            handle,
            shared: self.clone(),
        }
    }

    fn leg_id(&self, call_ref: &str) -> Option<LegId> {
        self.legs().get(call_ref).map(|handle| handle.id)
    }

    fn close_leg(&self, call_ref: &str) {
        if self.legs().remove(call_ref).is_some() {
            debug!("Closed call_ref {}", call_ref);
        }
    }

    /// Turn one gateway frame into a transport event
    fn translate(self: &Arc<Self>, frame: GatewayFrame) -> Option<TransportEvent> {
        let (call_ref, event) = match frame {
            GatewayFrame::Registered => return Some(TransportEvent::Registered),
            GatewayFrame::Unregistered => return Some(TransportEvent::Unregistered),
            GatewayFrame::TokenWillExpire => return Some(TransportEvent::TokenWillExpire),
            GatewayFrame::Incoming {
                call_ref,
                call_sid,
                from,
                to,
            } => {
                let leg = self.open_leg(call_ref, call_sid.map(ProviderCallId::new));
                return Some(TransportEvent::Incoming(CallOffer {
                    leg: Box::new(leg),
                    from,
                    to,
                }));
            }
            GatewayFrame::CallSid { call_ref, call_sid } => {
                match self.legs().get(&call_ref) {
                    Some(handle) => handle.set_provider_call_id(ProviderCallId::new(call_sid)),
                    None => debug!("call_sid for unknown call_ref {}", call_ref),
                }
                return None;
            }
            GatewayFrame::Error {
                call_ref: None,
                message,
            } => return Some(TransportEvent::DeviceError(message)),
            GatewayFrame::Error {
                call_ref: Some(call_ref),
                message,
            } => (call_ref, CallLegEvent::Error(message)),
            GatewayFrame::Ringing { call_ref } => (call_ref, CallLegEvent::Ringing),
            GatewayFrame::Accepted { call_ref } => (call_ref, CallLegEvent::Accepted),
            GatewayFrame::Disconnected { call_ref } => (call_ref, CallLegEvent::Disconnected),
            GatewayFrame::Cancelled { call_ref } => (call_ref, CallLegEvent::Cancelled),
            GatewayFrame::Rejected { call_ref } => (call_ref, CallLegEvent::Rejected),
            GatewayFrame::Muted { call_ref, muted } => (call_ref, CallLegEvent::Muted(muted)),
        };

        match self.leg_id(&call_ref) {
            Some(leg) => {
                if event.ends_call() {
                    self.close_leg(&call_ref);
                }
                Some(TransportEvent::Call { leg, event })
            }
            None => {
                debug!("{} for unknown call_ref {}", event.name(), call_ref);
                None
            }
        }
    }
}

/// One call on the gateway
pub struct GatewayLeg {
    handle: Arc<LegHandle>,
    shared: Arc<Shared>,
}

impl GatewayLeg {
    fn call_ref(&self) -> String {
        self.handle.call_ref.clone()
    }
}

impl CallLeg for GatewayLeg {
    fn id(&self) -> LegId {
        self.handle.id
    }

    fn provider_call_id(&self) -> Option<ProviderCallId> {
        self.handle.provider_call_id()
    }

    fn accept(&self) -> Result<(), TransportError> {
        self.shared.send(ClientFrame::Accept {
            call_ref: self.call_ref(),
        })
    }

    fn reject(&self) -> Result<(), TransportError> {
        self.shared.close_leg(&self.handle.call_ref);
        self.shared.send(ClientFrame::Reject {
            call_ref: self.call_ref(),
        })
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.shared.close_leg(&self.handle.call_ref);
        self.shared.send(ClientFrame::Disconnect {
            call_ref: self.call_ref(),
        })
    }

    fn mute(&self, muted: bool) -> Result<(), TransportError> {
        self.shared.send(ClientFrame::Mute {
            call_ref: self.call_ref(),
            muted,
        })
    }

    fn set_volume(&self, gain: f32) -> Result<(), TransportError> {
        self.shared.send(ClientFrame::Volume {
            call_ref: self.call_ref(),
            level: gain.clamp(0.0, 1.0),
        })
    }

    fn send_digits(&self, digits: &str) -> Result<(), TransportError> {
        self.shared.send(ClientFrame::Digits {
            call_ref: self.call_ref(),
            digits: digits.to_string(),
        })
    }
}

pub struct GatewayDevice {
    shared: Arc<Shared>,
    token: Mutex<SessionToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait]
impl VoiceDevice for GatewayDevice {
    async fn register(&self) -> Result<(), TransportError> {
        let token = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .value()
            .to_string();
        self.shared
            .send(ClientFrame::Register { token })
            .map_err(|e| TransportError::Register(e.to_string()))
    }

    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn CallLeg>, TransportError> {
        let call_ref = LegId::new().to_string();
        let leg = self.shared.open_leg(call_ref.clone(), None);
        if let Err(e) = self.shared.send(ClientFrame::Connect {
            call_ref: call_ref.clone(),
            to: params.to.to_string(),
            from: params.from.to_string(),
        }) {
            self.shared.close_leg(&call_ref);
            return Err(TransportError::Connect(e.to_string()));
        }
        debug!("Connect requested as {}", call_ref);
        Ok(Box::new(leg))
    }

    fn update_token(&self, token: &SessionToken) -> Result<(), TransportError> {
        self.shared.send(ClientFrame::UpdateToken {
            token: token.value().to_string(),
        })?;
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        Ok(())
    }

    fn destroy(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        if tasks.is_empty() {
            return;
        }
        for task in tasks {
            task.abort();
        }
        self.shared.legs().clear();
        info!("Signaling gateway connection closed");
    }
}

impl Drop for GatewayDevice {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Opens gateway devices against a fixed URL
pub struct GatewayDeviceFactory {
    url: String,
}

impl GatewayDeviceFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl DeviceFactory for GatewayDeviceFactory {
    async fn create(
        &self,
        token: &SessionToken,
        events: TransportEventSender,
    ) -> Result<Arc<dyn VoiceDevice>, TransportError> {
        let (socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!("Connected to signaling gateway at {}", self.url);
        let (mut sink, mut stream) = socket.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let shared = Arc::new(Shared {
            outgoing: outgoing_tx,
            legs: Mutex::new(HashMap::new()),
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode gateway frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    warn!("Gateway write failed: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(WsMessage::Text(text)) => text,
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("Gateway read failed: {}", e);
                        let _ = events.send(TransportEvent::DeviceError(e.to_string()));
                        break;
                    }
                };
                let frame = match serde_json::from_str::<GatewayFrame>(&text) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Ignoring malformed gateway frame: {}", e);
                        continue;
                    }
                };
                if let Some(event) = reader_shared.translate(frame) {
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }
            debug!("Gateway connection ended");
            let _ = events.send(TransportEvent::Unregistered);
        });

        Ok(Arc::new(GatewayDevice {
            shared,
            token: Mutex::new(token.clone()),
            tasks: Mutex::new(vec![writer, reader]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> (Arc<Shared>, mpsc::UnboundedReceiver<ClientFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Shared {
                outgoing: tx,
                legs: Mutex::new(HashMap::new()),
            }),
            rx,
        )
    }

    #[test]
    fn test_incoming_opens_leg_and_routes_call_events() {
        let (shared, mut rx) = shared();

        let event = shared
            .translate(GatewayFrame::Incoming {
                call_ref: "in-1".to_string(),
                call_sid: Some("CA1".to_string()),
                from: "+15550001111".to_string(),
                to: "+15559876543".to_string(),
            })
            .unwrap();
        let TransportEvent::Incoming(offer) = event else {
            panic!("expected an offer");
        };
        assert_eq!(offer.leg.provider_call_id().unwrap().as_str(), "CA1");

        offer.leg.accept().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientFrame::Accept {
                call_ref: "in-1".to_string()
            }
        );

        let event = shared
            .translate(GatewayFrame::Disconnected {
                call_ref: "in-1".to_string(),
            })
            .unwrap();
        assert!(matches!(
            event,
            TransportEvent::Call { leg, event: CallLegEvent::Disconnected } if leg == offer.leg.id()
        ));
        assert!(shared.legs().is_empty());
    }

    #[test]
    fn test_call_sid_is_attached_to_outbound_leg() {
        let (shared, _rx) = shared();
        let leg = shared.open_leg("out-1".to_string(), None);
        assert!(leg.provider_call_id().is_none());

        assert!(shared
            .translate(GatewayFrame::CallSid {
                call_ref: "out-1".to_string(),
                call_sid: "CA9".to_string(),
            })
            .is_none());
        assert_eq!(leg.provider_call_id().unwrap().as_str(), "CA9");
    }

    #[test]
    fn test_finished_legs_leave_the_leg_map() {
        let (shared, _rx) = shared();
        let _ = shared.open_leg("out-3".to_string(), None);
        let _ = shared.open_leg("out-4".to_string(), None);
        let hung_up = shared.open_leg("out-5".to_string(), None);

        assert!(shared
            .translate(GatewayFrame::Cancelled {
                call_ref: "out-3".to_string(),
            })
            .is_some());
        assert!(shared
            .translate(GatewayFrame::Error {
                call_ref: Some("out-4".to_string()),
                message: "media failure".to_string(),
            })
            .is_some());
        hung_up.disconnect().unwrap();
        assert!(shared.legs().is_empty());

        // Frames for a closed call_ref are dropped
        assert!(shared
            .translate(GatewayFrame::Disconnected {
                call_ref: "out-5".to_string(),
            })
            .is_none());
    }

    #[test]
    fn test_rejected_offer_leaves_the_leg_map() {
        let (shared, mut rx) = shared();
        let event = shared
            .translate(GatewayFrame::Incoming {
                call_ref: "in-2".to_string(),
                call_sid: None,
                from: "+15550001111".to_string(),
                to: "+15559876543".to_string(),
            })
            .unwrap();
        let TransportEvent::Incoming(offer) = event else {
            panic!("expected an offer");
        };
        assert_eq!(shared.legs().len(), 1);

        offer.leg.reject().unwrap();
        assert!(shared.legs().is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            ClientFrame::Reject {
                call_ref: "in-2".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_call_ref_is_dropped() {
        let (shared, _rx) = shared();
        assert!(shared
            .translate(GatewayFrame::Ringing {
                call_ref: "nope".to_string()
            })
            .is_none());
    }

    #[test]
    fn test_error_without_call_ref_is_device_error() {
        let (shared, _rx) = shared();
        let event = shared
            .translate(GatewayFrame::Error {
                call_ref: None,
                message: "denied".to_string(),
            })
            .unwrap();
        assert!(matches!(event, TransportEvent::DeviceError(m) if m == "denied"));
    }

    #[test]
    fn test_leg_fails_once_writer_is_gone() {
        let (shared, rx) = shared();
        let leg = shared.open_leg("out-2".to_string(), None);
        drop(rx);
        assert_eq!(leg.disconnect(), Err(TransportError::Closed));
    }
}
