//! Call aggregate root

use crate::domain::call::event::{
    CallCreated, CallEnded, CallEvent, CallEventBase, CallMuteChanged, CallStatusChanged,
};
use crate::domain::call::value_object::{CallDirection, CallStatus, EndReason, Volume};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{LegId, PhoneNumber, ProviderCallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Call aggregate root
///
/// One call's lifecycle as seen by the softphone. Only the call controller
/// mutates it; everything else works on clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    direction: CallDirection,
    /// Number or client identifier of the other side
    remote_party: String,
    /// The number the agent places the call from (or was reached on)
    local_originating_number: PhoneNumber,
    /// Transport leg this record is bound to, once one exists
    leg_id: Option<LegId>,
    /// Assigned by the transport once negotiated
    provider_call_id: Option<ProviderCallId>,
    status: CallStatus,
    muted_by_agent: bool,
    on_hold: bool,
    /// When media was established
    started_at: Option<DateTime<Utc>>,
    volume: Volume,
    end_reason: Option<EndReason>,
    #[serde(skip)]
    events: Vec<CallEvent>,
}

impl CallRecord {
    /// Create the record for an agent-initiated call, in `Connecting`
    pub fn outbound(destination: PhoneNumber, from: PhoneNumber, volume: Volume) -> Self {
        let mut record = Self::blank(
            CallDirection::Outbound,
            destination.to_string(),
            from,
            CallStatus::Connecting,
            volume,
        );
        record.record_created();
        record
    }

    /// Create the record for an inbound offer, in `Ringing`
    pub fn inbound(
        leg_id: LegId,
        provider_call_id: Option<ProviderCallId>,
        remote_party: String,
        reached_on: PhoneNumber,
        volume: Volume,
    ) -> Self {
        let mut record = Self::blank(
            CallDirection::Inbound,
            remote_party,
            reached_on,
            CallStatus::Ringing,
            volume,
        );
        record.leg_id = Some(leg_id);
        record.provider_call_id = provider_call_id;
        record.record_created();
        record
    }

    fn blank(
        direction: CallDirection,
        remote_party: String,
        local_originating_number: PhoneNumber,
        status: CallStatus,
        volume: Volume,
    ) -> Self {
        Self {
            direction,
            remote_party,
            local_originating_number,
            leg_id: None,
            provider_call_id: None,
            status,
            muted_by_agent: false,
            on_hold: false,
            started_at: None,
            volume,
            end_reason: None,
            events: Vec::new(),
        }
    }

    /// Attach the outbound leg returned by the transport
    pub fn bind_leg(&mut self, leg_id: LegId) -> Result<()> {
        if self.leg_id.is_some() {
            return Err(DomainError::InvalidOperation(
                "call is already bound to a transport leg".to_string(),
            ));
        }
        self.leg_id = Some(leg_id);
        Ok(())
    }

    /// Remember the provider call id; the first one seen wins
    pub fn observe_provider_call_id(&mut self, id: Option<ProviderCallId>) {
        if self.provider_call_id.is_none() {
            self.provider_call_id = id;
        }
    }

    /// Transport reports the remote side alerting
    pub fn ringing(&mut self) -> Result<()> {
        self.transition_to(CallStatus::Ringing)
    }

    /// Agent answered, or the transport confirmed outbound pickup
    pub fn connect(&mut self) -> Result<()> {
        self.transition_to(CallStatus::Connected)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Flip between `Connected` and `Hold`, returning the new status
    pub fn toggle_hold(&mut self) -> Result<CallStatus> {
        let next = match self.status {
            CallStatus::Connected => CallStatus::Hold,
            CallStatus::Hold => CallStatus::Connected,
            other => {
                return Err(DomainError::InvalidOperation(format!(
                    "cannot toggle hold while {}",
                    other
                )))
            }
        };
        self.transition_to(next)?;
        self.on_hold = next == CallStatus::Hold;
        Ok(next)
    }

    /// Set the agent mute flag. Only meaningful while media is up.
    pub fn set_muted(&mut self, muted: bool) -> Result<()> {
        if !self.status.is_timed() {
            return Err(DomainError::InvalidOperation(format!(
                "cannot change mute while {}",
                self.status
            )));
        }
        if self.muted_by_agent != muted {
            self.muted_by_agent = muted;
            self.record_event(CallEvent::MuteChanged(CallMuteChanged {
                base: self.event_base("call.mute_changed"),
                muted,
            }));
        }
        Ok(())
    }

    pub fn set_volume(&mut self, volume: Volume) -> Result<()> {
        if self.status != CallStatus::Connected {
            return Err(DomainError::InvalidOperation(format!(
                "cannot change volume while {}",
                self.status
            )));
        }
        self.volume = volume;
        Ok(())
    }

    /// Move to `Ended`; the grace delay later resets to `Idle`
    pub fn end(&mut self, reason: EndReason) -> Result<()> {
        self.transition_to(CallStatus::Ended)?;
        self.finish(reason);
        Ok(())
    }

    /// Offer declined or withdrawn before pickup: straight back to `Idle`
    pub fn abandon(&mut self, reason: EndReason) -> Result<()> {
        if !matches!(self.status, CallStatus::Connecting | CallStatus::Ringing) {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot abandon a call that is {}",
                self.status
            )));
        }
        self.transition_to(CallStatus::Idle)?;
        self.finish(reason);
        Ok(())
    }

    /// Grace delay elapsed
    pub fn reset(&mut self) -> Result<()> {
        if self.status != CallStatus::Ended {
            return Err(DomainError::InvalidStateTransition(format!(
                "only an ended call can reset, call is {}",
                self.status
            )));
        }
        self.transition_to(CallStatus::Idle)
    }

    fn finish(&mut self, reason: EndReason) {
        self.on_hold = false;
        self.end_reason = Some(reason.clone());
        let duration_seconds = self
            .started_at
            .map(|started| (Utc::now() - started).num_seconds());
        self.record_event(CallEvent::Ended(CallEnded {
            base: self.event_base("call.ended"),
            reason,
            duration_seconds,
        }));
    }

    /// Transition to a new status
    fn transition_to(&mut self, next: CallStatus) -> Result<()> {
        if !self.status.can_transition_to(&next) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot transition from {:?} to {:?}",
                self.status, next
            )));
        }

        let from = self.status;
        self.status = next;
        self.record_event(CallEvent::StatusChanged(CallStatusChanged {
            base: self.event_base("call.status_changed"),
            from,
            to: next,
        }));
        Ok(())
    }

    fn record_created(&mut self) {
        self.record_event(CallEvent::Created(CallCreated {
            base: self.event_base("call.created"),
            direction: self.direction,
            remote_party: self.remote_party.clone(),
        }));
    }

    fn event_base(&self, event_type: &str) -> CallEventBase {
        CallEventBase::new(event_type, self.provider_call_id.clone())
    }

    /// Record a domain event
    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn remote_party(&self) -> &str {
        &self.remote_party
    }

    pub fn local_originating_number(&self) -> &PhoneNumber {
        &self.local_originating_number
    }

    pub fn leg_id(&self) -> Option<LegId> {
        self.leg_id
    }

    pub fn provider_call_id(&self) -> Option<&ProviderCallId> {
        self.provider_call_id.as_ref()
    }

    pub fn status(&self) -> CallStatus {
        self.status
    }

    pub fn muted_by_agent(&self) -> bool {
        self.muted_by_agent
    }

    pub fn on_hold(&self) -> bool {
        self.on_hold
    }

    pub fn started_at(&self) -> Option<&DateTime<Utc>> {
        self.started_at.as_ref()
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }
}
