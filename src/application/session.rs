//! Transport session
//!
//! Owns the one registered device for the agent's softphone view. The
//! session never blocks: token issuance, device construction and
//! registration run in [`open_device`], whose result is handed back to
//! [`TransportSession::complete_initialize`] by the runtime.

use crate::application::error::{SoftphoneError, SoftphoneResult};
use crate::application::metrics;
use crate::domain::session::issuer::TokenIssuer;
use crate::domain::session::value_object::{AgentIdentity, SessionStatus, SessionToken};
use crate::domain::shared::error::ServiceError;
use crate::domain::shared::value_objects::SessionEpoch;
use crate::domain::transport::{DeviceFactory, TransportEventSender, VoiceDevice};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What the UI sees of the session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub agent: AgentIdentity,
    pub token_expires_approx: Option<DateTime<Utc>>,
    pub renewal_in_flight: bool,
    pub closed: bool,
}

pub struct TransportSession {
    identity: AgentIdentity,
    /// Identifies this session instance; async completions carry it back
    epoch: SessionEpoch,
    status: SessionStatus,
    token: Option<SessionToken>,
    device: Option<Arc<dyn VoiceDevice>>,
    renewal_in_flight: bool,
    closed: bool,
}

impl TransportSession {
    pub fn new(identity: AgentIdentity) -> Self {
        Self {
            identity,
            epoch: SessionEpoch::new(),
            status: SessionStatus::Unregistered,
            token: None,
            device: None,
            renewal_in_flight: false,
            closed: false,
        }
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn device(&self) -> Option<&Arc<dyn VoiceDevice>> {
        self.device.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True if a completion tagged with `epoch` still belongs to this session
    pub fn is_current(&self, epoch: SessionEpoch) -> bool {
        !self.closed && self.epoch == epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            status: self.status,
            agent: self.identity.clone(),
            token_expires_approx: self.token.as_ref().and_then(|t| t.expires_approx().copied()),
            renewal_in_flight: self.renewal_in_flight,
            closed: self.closed,
        }
    }

    /// Mark the session as registering; returns false if it was already started
    pub fn begin_initialize(&mut self) -> bool {
        if self.closed || self.status != SessionStatus::Unregistered || self.device.is_some() {
            warn!("Transport session already initialized ({})", self.status);
            return false;
        }
        info!("Initializing transport session for agent {}", self.identity.agent_id);
        self.status = SessionStatus::Registering;
        true
    }

    /// Install the device opened by [`open_device`]
    pub fn complete_initialize(&mut self, device: Arc<dyn VoiceDevice>, token: SessionToken) {
        debug!("Session token expires around {:?}", token.expires_approx());
        self.device = Some(device);
        self.token = Some(token);
    }

    /// Token issuance or registration failed: fatal, no retry
    pub fn fail(&mut self, err: &SoftphoneError) {
        error!("Transport session failed: {}", err);
        self.status = SessionStatus::Error;
        metrics::update_session_registered(false);
    }

    pub fn on_registered(&mut self) {
        info!("Softphone registered");
        self.status = SessionStatus::Registered;
        metrics::update_session_registered(true);
    }

    /// No automatic re-register; the status is surfaced to the operator
    pub fn on_unregistered(&mut self) {
        warn!("Softphone unregistered");
        self.status = SessionStatus::Unregistered;
        metrics::update_session_registered(false);
    }

    /// Start a renewal unless one is already running
    pub fn begin_renewal(&mut self) -> bool {
        if self.device.is_none() {
            debug!("Token renewal requested without a device; ignoring");
            return false;
        }
        if self.renewal_in_flight {
            debug!("Token renewal already in flight");
            return false;
        }
        info!("Session token about to expire; renewing");
        self.renewal_in_flight = true;
        true
    }

    /// Apply a renewal result. Registration and any active call are left
    /// untouched either way.
    pub fn complete_renewal(
        &mut self,
        result: Result<SessionToken, ServiceError>,
    ) -> SoftphoneResult<()> {
        self.renewal_in_flight = false;
        let outcome = match result {
            Ok(token) => match self.device.as_ref() {
                Some(device) => device
                    .update_token(&token)
                    .map(|()| {
                        self.token = Some(token);
                    })
                    .map_err(|e| SoftphoneError::TokenRenewal(e.to_string())),
                None => Err(SoftphoneError::SessionClosed),
            },
            Err(e) => Err(SoftphoneError::TokenRenewal(e.to_string())),
        };

        match &outcome {
            Ok(()) => info!("Session token renewed"),
            Err(e) => warn!("{}", e),
        }
        metrics::record_token_renewal(outcome.is_ok());
        outcome
    }

    /// Release the device. Synchronous; an active call is dropped with it.
    pub fn teardown(&mut self) {
        if let Some(device) = self.device.take() {
            info!("Destroying transport device");
            device.destroy();
        }
        self.token = None;
        self.renewal_in_flight = false;
        self.closed = true;
        self.status = SessionStatus::Unregistered;
        metrics::update_session_registered(false);
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            device.destroy();
        }
    }
}

/// Issue a token, build the device with the event sink wired in, then register.
///
/// A device that fails to register is destroyed before returning.
pub async fn open_device(
    identity: &AgentIdentity,
    issuer: &dyn TokenIssuer,
    factory: &dyn DeviceFactory,
    events: TransportEventSender,
) -> SoftphoneResult<(Arc<dyn VoiceDevice>, SessionToken)> {
    let token = issuer
        .issue(identity)
        .await
        .map_err(|e| SoftphoneError::SessionInit(format!("token issuance failed: {}", e)))?;

    let device = factory
        .create(&token, events)
        .await
        .map_err(|e| SoftphoneError::SessionInit(e.to_string()))?;

    if let Err(e) = device.register().await {
        device.destroy();
        return Err(SoftphoneError::SessionInit(e.to_string()));
    }
    Ok((device, token))
}
