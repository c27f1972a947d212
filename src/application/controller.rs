//! Call controller
//!
//! The state machine for the agent's single call. Every agent action and
//! every transport event goes through [`CallController::reduce`]; work that
//! has to happen outside the state machine (connecting, scheduling, network
//! calls, UI notifications) is returned as a list of [`Effect`]s for the
//! runtime to carry out.

use crate::application::error::{SoftphoneError, SoftphoneResult};
use crate::application::metrics;
use crate::application::notification::Notification;
use crate::domain::call::{
    CallDomainService, CallRecord, CallStatus, CallTimer, DialBuffer, DtmfDigit, EndReason, Volume,
};
use crate::domain::report::{ReportLedger, ReportPrompt};
use crate::domain::shared::value_objects::{LegId, PhoneNumber};
use crate::domain::transport::{CallLeg, CallLegEvent, CallOffer, ConnectParams, TransportError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Inputs to the state machine
pub enum CallInput {
    Dial {
        destination: String,
        from: Option<String>,
    },
    Answer,
    Reject,
    Hangup,
    ToggleMute,
    ToggleHold,
    SetVolume(u8),
    PressDigit(char),
    Backspace,
    ClearDialBuffer,
    /// Inbound offer surfaced by the transport session
    Offer(CallOffer),
    /// Result of the connect requested by `Effect::Connect` with the same attempt
    LegReady {
        attempt: u64,
        result: Result<Box<dyn CallLeg>, TransportError>,
    },
    Leg {
        leg: LegId,
        event: CallLegEvent,
    },
    Tick {
        generation: u64,
    },
    GraceElapsed {
        generation: u64,
    },
}

/// Work requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Connect { attempt: u64, params: ConnectParams },
    StartTicker { generation: u64 },
    StopTicker,
    ScheduleReset { generation: u64 },
    OpenReportPrompt(ReportPrompt),
    RefreshHistory { number: PhoneNumber },
    Notify(Notification),
}

/// Read-only view of the controller for the UI
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub status: CallStatus,
    pub call: Option<CallRecord>,
    pub dial_buffer: String,
    pub elapsed_secs: u64,
    pub elapsed: String,
    pub incoming_pending: bool,
}

pub struct CallController {
    call: Option<CallRecord>,
    leg: Option<Box<dyn CallLeg>>,
    dial_buffer: DialBuffer,
    timer: CallTimer,
    ticker_generation: u64,
    reset_generation: u64,
    /// Bumped per dial; only the latest attempt may bind a leg
    connect_attempt: u64,
    ledger: ReportLedger,
    /// Seed volume for the next call
    volume: Volume,
    incoming_pending: bool,
}

impl CallController {
    pub fn new(volume: Volume) -> Self {
        Self {
            call: None,
            leg: None,
            dial_buffer: DialBuffer::new(),
            timer: CallTimer::new(),
            ticker_generation: 0,
            reset_generation: 0,
            connect_attempt: 0,
            ledger: ReportLedger::new(),
            volume,
            incoming_pending: false,
        }
    }

    pub fn status(&self) -> CallStatus {
        self.call
            .as_ref()
            .map(CallRecord::status)
            .unwrap_or(CallStatus::Idle)
    }

    pub fn call(&self) -> Option<&CallRecord> {
        self.call.as_ref()
    }

    pub fn timer(&self) -> &CallTimer {
        &self.timer
    }

    pub fn dial_buffer(&self) -> &DialBuffer {
        &self.dial_buffer
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status(),
            call: self.call.clone(),
            dial_buffer: self.dial_buffer.as_str().to_string(),
            elapsed_secs: self.timer.elapsed_secs(),
            elapsed: self.timer.formatted(),
            incoming_pending: self.incoming_pending,
        }
    }

    /// Single entry point of the state machine.
    ///
    /// Agent actions may fail with a validation or state error and leave the
    /// controller untouched. Transport inputs never fail: problems are logged
    /// and turned into transitions.
    pub fn reduce(&mut self, input: CallInput) -> SoftphoneResult<Vec<Effect>> {
        let mut effects = Vec::new();
        match input {
            CallInput::Dial { destination, from } => {
                self.dial(&destination, from.as_deref(), &mut effects)?
            }
            CallInput::Answer => self.answer(&mut effects),
            CallInput::Reject => self.reject(&mut effects),
            CallInput::Hangup => self.hangup(&mut effects)?,
            CallInput::ToggleMute => self.toggle_mute(&mut effects)?,
            CallInput::ToggleHold => self.toggle_hold(&mut effects)?,
            CallInput::SetVolume(level) => self.set_volume(level, &mut effects)?,
            CallInput::PressDigit(c) => self.press_digit(c, &mut effects)?,
            CallInput::Backspace => {
                self.dial_buffer.backspace();
                effects.push(self.dial_buffer_changed());
            }
            CallInput::ClearDialBuffer => {
                self.dial_buffer.clear();
                effects.push(self.dial_buffer_changed());
            }
            CallInput::Offer(offer) => self.offer(offer, &mut effects),
            CallInput::LegReady { attempt, result } => {
                self.leg_ready(attempt, result, &mut effects)
            }
            CallInput::Leg { leg, event } => self.leg_event(leg, event, &mut effects),
            CallInput::Tick { generation } => self.tick(generation, &mut effects),
            CallInput::GraceElapsed { generation } => self.grace_elapsed(generation, &mut effects),
        }
        self.drain_domain_events();
        Ok(effects)
    }

    fn dial(
        &mut self,
        destination: &str,
        from: Option<&str>,
        effects: &mut Vec<Effect>,
    ) -> SoftphoneResult<()> {
        let (to, from) = CallDomainService::validate_dial(destination, from)?;
        if self.call.is_some() {
            return Err(SoftphoneError::InvalidState(format!(
                "cannot dial while {}",
                self.status()
            )));
        }

        info!("Dialing {} from {}", to, from);
        let call = CallRecord::outbound(to.clone(), from.clone(), self.volume);
        effects.push(status_changed(&call));
        self.connect_attempt += 1;
        effects.push(Effect::Connect {
            attempt: self.connect_attempt,
            params: ConnectParams { to, from },
        });
        self.call = Some(call);
        Ok(())
    }

    fn leg_ready(
        &mut self,
        attempt: u64,
        result: Result<Box<dyn CallLeg>, TransportError>,
        effects: &mut Vec<Effect>,
    ) {
        let waiting = attempt == self.connect_attempt
            && self.call.as_ref().is_some_and(|call| {
                call.status() == CallStatus::Connecting && call.leg_id().is_none()
            });

        match result {
            Ok(leg) if waiting => {
                if let Some(call) = self.call.as_mut() {
                    if let Err(e) = call.bind_leg(leg.id()) {
                        warn!("Failed to bind outbound leg: {}", e);
                        return;
                    }
                    call.observe_provider_call_id(leg.provider_call_id());
                    debug!("Outbound call bound to leg {}", leg.id());
                }
                self.leg = Some(leg);
            }
            Ok(leg) => {
                warn!("Connect completed for a call that is gone; dropping leg {}", leg.id());
                if let Err(e) = leg.disconnect() {
                    debug!("Disconnecting orphan leg failed: {}", e);
                }
            }
            Err(e) if waiting => {
                warn!("Call setup failed: {}", e);
                effects.push(Effect::Notify(Notification::Error {
                    message: SoftphoneError::CallSetup(e.to_string()).to_string(),
                }));
                self.terminate(EndReason::Failed(e.to_string()), effects);
            }
            Err(e) => debug!("Ignoring connect failure for a call that is gone: {}", e),
        }
    }

    fn offer(&mut self, offer: CallOffer, effects: &mut Vec<Effect>) {
        if self.call.is_some() {
            info!(
                "Rejecting inbound call from {} as busy (current call is {})",
                offer.from,
                self.status()
            );
            if let Err(e) = offer.leg.reject() {
                warn!("Busy reject failed: {}", e);
            }
            effects.push(Effect::Notify(Notification::BusyRejected { from: offer.from }));
            return;
        }

        let reached_on = match PhoneNumber::parse(&offer.to) {
            Ok(number) => number,
            Err(_) => {
                warn!("Inbound offer from {} has no destination number; rejecting", offer.from);
                if let Err(e) = offer.leg.reject() {
                    warn!("Reject failed: {}", e);
                }
                return;
            }
        };

        info!("Incoming call from {} on {}", offer.from, reached_on);
        let call = CallRecord::inbound(
            offer.leg.id(),
            offer.leg.provider_call_id(),
            offer.from.clone(),
            reached_on,
            self.volume,
        );
        effects.push(status_changed(&call));
        effects.push(Effect::Notify(Notification::IncomingCall {
            from: offer.from,
            to: offer.to,
        }));
        self.incoming_pending = true;
        self.call = Some(call);
        self.leg = Some(offer.leg);
    }

    fn answer(&mut self, effects: &mut Vec<Effect>) {
        if !self.has_pending_offer() {
            debug!("Answer ignored while {}", self.status());
            return;
        }
        let accepted = match self.leg.as_ref() {
            Some(leg) => leg.accept(),
            None => return,
        };
        match accepted {
            Ok(()) => self.connect(effects),
            Err(e) => {
                warn!("Accepting the call failed: {}", e);
                self.terminate(EndReason::Failed(e.to_string()), effects);
            }
        }
    }

    fn reject(&mut self, effects: &mut Vec<Effect>) {
        if !self.has_pending_offer() {
            debug!("Reject ignored while {}", self.status());
            return;
        }
        if let Some(leg) = self.leg.as_ref() {
            if let Err(e) = leg.reject() {
                warn!("Rejecting the call failed: {}", e);
            }
        }
        self.terminate(EndReason::Rejected, effects);
    }

    fn hangup(&mut self, effects: &mut Vec<Effect>) -> SoftphoneResult<()> {
        if self.has_pending_offer() {
            self.reject(effects);
            return Ok(());
        }
        match self.status() {
            CallStatus::Connecting
            | CallStatus::Ringing
            | CallStatus::Connected
            | CallStatus::Hold => {
                if let Some(leg) = self.leg.as_ref() {
                    if let Err(e) = leg.disconnect() {
                        warn!("Disconnecting the call failed: {}", e);
                    }
                }
                self.terminate(EndReason::Disconnected, effects);
                Ok(())
            }
            other => Err(SoftphoneError::InvalidState(format!(
                "no call to hang up ({})",
                other
            ))),
        }
    }

    fn toggle_mute(&mut self, effects: &mut Vec<Effect>) -> SoftphoneResult<()> {
        let call = self.live_call("mute")?;
        let muted = !call.muted_by_agent();
        call.set_muted(muted)?;
        if let Some(leg) = self.leg.as_ref() {
            if let Err(e) = leg.mute(muted) {
                warn!("Transport mute failed: {}", e);
            }
        }
        effects.push(Effect::Notify(Notification::MuteChanged { muted }));
        Ok(())
    }

    fn toggle_hold(&mut self, effects: &mut Vec<Effect>) -> SoftphoneResult<()> {
        let call = self.live_call("hold")?;
        let status = call.toggle_hold()?;
        info!("Call is now {}", status);
        effects.push(status_changed(call));
        Ok(())
    }

    fn set_volume(&mut self, level: u8, effects: &mut Vec<Effect>) -> SoftphoneResult<()> {
        let volume = Volume::new(level)?;
        let call = self.call.as_mut().ok_or_else(|| {
            SoftphoneError::InvalidState("volume can only be changed during a call".to_string())
        })?;
        call.set_volume(volume)?;
        if let Some(leg) = self.leg.as_ref() {
            if let Err(e) = leg.set_volume(volume.normalized()) {
                warn!("Transport volume change failed: {}", e);
            }
        }
        self.volume = volume;
        effects.push(Effect::Notify(Notification::VolumeChanged { level }));
        Ok(())
    }

    fn press_digit(&mut self, c: char, effects: &mut Vec<Effect>) -> SoftphoneResult<()> {
        match self.status() {
            CallStatus::Idle => {
                self.dial_buffer.push_char(c)?;
                effects.push(self.dial_buffer_changed());
                Ok(())
            }
            CallStatus::Connected => {
                let digit = DtmfDigit::from_char(c).ok_or_else(|| {
                    SoftphoneError::Validation(format!("'{}' is not a DTMF digit", c))
                })?;
                let leg = self.leg.as_ref().ok_or_else(|| {
                    SoftphoneError::InvalidState("call has no transport leg".to_string())
                })?;
                leg.send_digits(&digit.to_string())
                    .map_err(|e| SoftphoneError::Internal(e.to_string()))?;
                debug!("Sent DTMF {}", digit);
                Ok(())
            }
            other => Err(SoftphoneError::InvalidState(format!(
                "digits can only be sent on a connected call ({})",
                other
            ))),
        }
    }

    fn leg_event(&mut self, leg: LegId, event: CallLegEvent, effects: &mut Vec<Effect>) {
        let current = self.call.as_ref().and_then(CallRecord::leg_id);
        if current != Some(leg) {
            debug!("Discarding {} for stale leg {}", event.name(), leg);
            return;
        }

        let status = self.status();
        debug!("Leg event {} while {}", event.name(), status);
        match (event, status) {
            (CallLegEvent::Ringing, CallStatus::Connecting) => {
                if let Some(call) = self.call.as_mut() {
                    if call.ringing().is_ok() {
                        effects.push(status_changed(call));
                    }
                }
            }
            (CallLegEvent::Accepted, CallStatus::Connecting | CallStatus::Ringing) => {
                self.connect(effects)
            }
            (
                CallLegEvent::Disconnected | CallLegEvent::Cancelled | CallLegEvent::Rejected,
                CallStatus::Ended,
            ) => {
                debug!("Call already ended; terminal event ignored");
            }
            (CallLegEvent::Disconnected, _) => self.terminate(EndReason::Disconnected, effects),
            (CallLegEvent::Cancelled, _) => self.terminate(EndReason::Cancelled, effects),
            (CallLegEvent::Rejected, _) => self.terminate(EndReason::Rejected, effects),
            (CallLegEvent::Muted(muted), status) if status.is_timed() => {
                if let Some(call) = self.call.as_mut() {
                    if call.muted_by_agent() != muted {
                        debug!("Transport overrides mute flag to {}", muted);
                    }
                    if call.set_muted(muted).is_ok() {
                        effects.push(Effect::Notify(Notification::MuteChanged { muted }));
                    }
                }
            }
            (CallLegEvent::Error(message), status) if !status.is_terminal() => {
                warn!("Transport error on call: {}", message);
                effects.push(Effect::Notify(Notification::Error {
                    message: message.clone(),
                }));
                self.terminate(EndReason::Failed(message), effects);
            }
            (event, status) => debug!("Ignoring {} while {}", event.name(), status),
        }
    }

    fn tick(&mut self, generation: u64, effects: &mut Vec<Effect>) {
        if generation != self.ticker_generation || !self.status().is_timed() {
            return;
        }
        self.timer.tick();
        effects.push(Effect::Notify(Notification::TimerTick {
            elapsed_secs: self.timer.elapsed_secs(),
            formatted: self.timer.formatted(),
        }));
    }

    fn grace_elapsed(&mut self, generation: u64, effects: &mut Vec<Effect>) {
        if generation != self.reset_generation {
            return;
        }
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if call.reset().is_ok() {
            effects.push(status_changed(call));
            self.drain_domain_events();
            self.call = None;
            self.leg = None;
        }
    }

    /// Ringing/Connecting to Connected, starting the timer at zero
    fn connect(&mut self, effects: &mut Vec<Effect>) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if let Some(leg) = self.leg.as_ref() {
            call.observe_provider_call_id(leg.provider_call_id());
        }
        if let Err(e) = call.connect() {
            warn!("Cannot connect: {}", e);
            return;
        }
        info!("Call connected with {}", call.remote_party());
        effects.push(status_changed(call));

        if std::mem::take(&mut self.incoming_pending) {
            effects.push(Effect::Notify(Notification::IncomingCallCleared));
        }

        self.timer.start();
        self.ticker_generation += 1;
        effects.push(Effect::StartTicker {
            generation: self.ticker_generation,
        });
    }

    /// Shared exit path for every way a call can end.
    ///
    /// Offers that never connected go straight back to Idle; everything else
    /// goes through Ended and the grace delay.
    fn terminate(&mut self, reason: EndReason, effects: &mut Vec<Effect>) {
        let Some(call) = self.call.as_mut() else {
            return;
        };
        if let Some(leg) = self.leg.as_ref() {
            call.observe_provider_call_id(leg.provider_call_id());
        }

        if self.timer.is_running() {
            self.timer.stop();
            effects.push(Effect::StopTicker);
        }

        if std::mem::take(&mut self.incoming_pending) {
            effects.push(Effect::Notify(Notification::IncomingCallCleared));
        }

        let abandon = matches!(reason, EndReason::Cancelled | EndReason::Rejected)
            && matches!(call.status(), CallStatus::Connecting | CallStatus::Ringing);

        let transitioned = if abandon {
            call.abandon(reason.clone())
        } else {
            call.end(reason.clone())
        };
        if let Err(e) = transitioned {
            warn!("Cannot end call: {}", e);
            return;
        }
        info!("Call with {} ended ({})", call.remote_party(), reason.as_str());
        effects.push(status_changed(call));

        if reason.wants_report() {
            match call.provider_call_id() {
                Some(id) => {
                    if let Some(prompt) = self.ledger.open(id, call.local_originating_number()) {
                        effects.push(Effect::OpenReportPrompt(prompt));
                    } else {
                        debug!("Report prompt for {} already opened", id);
                    }
                }
                None => warn!("Call ended without a provider call id; no report prompt"),
            }
        }

        effects.push(Effect::RefreshHistory {
            number: call.local_originating_number().clone(),
        });

        if abandon {
            self.drain_domain_events();
            self.call = None;
        } else {
            self.reset_generation += 1;
            effects.push(Effect::ScheduleReset {
                generation: self.reset_generation,
            });
        }
        self.leg = None;
    }

    fn has_pending_offer(&self) -> bool {
        self.incoming_pending && self.status() == CallStatus::Ringing
    }

    fn live_call(&mut self, action: &str) -> SoftphoneResult<&mut CallRecord> {
        match self.call.as_mut() {
            Some(call) if call.status().is_timed() => Ok(call),
            Some(call) => Err(SoftphoneError::InvalidState(format!(
                "cannot {} while {}",
                action,
                call.status()
            ))),
            None => Err(SoftphoneError::InvalidState(format!(
                "cannot {} without a call",
                action
            ))),
        }
    }

    fn dial_buffer_changed(&self) -> Effect {
        Effect::Notify(Notification::DialBufferChanged {
            digits: self.dial_buffer.as_str().to_string(),
        })
    }

    /// Publish the aggregate's pending events as metrics
    fn drain_domain_events(&mut self) {
        if let Some(call) = self.call.as_mut() {
            for event in call.take_events() {
                debug!(event = event.event_type(), "call event");
                metrics::record_call_event(&event);
            }
        }
    }
}

fn status_changed(call: &CallRecord) -> Effect {
    Effect::Notify(Notification::CallStatusChanged {
        status: call.status(),
        direction: Some(call.direction()),
        remote_party: Some(call.remote_party().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::ProviderCallId;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct LegLog {
        accepted: usize,
        rejected: usize,
        disconnected: usize,
        muted: Vec<bool>,
        volumes: Vec<f32>,
        digits: Vec<String>,
    }

    struct FakeLeg {
        id: LegId,
        provider_call_id: Option<ProviderCallId>,
        log: Arc<Mutex<LegLog>>,
    }

    impl CallLeg for FakeLeg {
        fn id(&self) -> LegId {
            self.id
        }

        fn provider_call_id(&self) -> Option<ProviderCallId> {
            self.provider_call_id.clone()
        }

        fn accept(&self) -> Result<(), TransportError> {
            self.log.lock().unwrap().accepted += 1;
            Ok(())
        }

        fn reject(&self) -> Result<(), TransportError> {
            self.log.lock().unwrap().rejected += 1;
            Ok(())
        }

        fn disconnect(&self) -> Result<(), TransportError> {
            self.log.lock().unwrap().disconnected += 1;
            Ok(())
        }

        fn mute(&self, muted: bool) -> Result<(), TransportError> {
            self.log.lock().unwrap().muted.push(muted);
            Ok(())
        }

        fn set_volume(&self, gain: f32) -> Result<(), TransportError> {
            self.log.lock().unwrap().volumes.push(gain);
            Ok(())
        }

        fn send_digits(&self, digits: &str) -> Result<(), TransportError> {
            self.log.lock().unwrap().digits.push(digits.to_string());
            Ok(())
        }
    }

    fn fake_leg(provider_call_id: Option<&str>) -> (Box<dyn CallLeg>, LegId, Arc<Mutex<LegLog>>) {
        let id = LegId::new();
        let log = Arc::new(Mutex::new(LegLog::default()));
        let leg = FakeLeg {
            id,
            provider_call_id: provider_call_id.map(ProviderCallId::new),
            log: log.clone(),
        };
        (Box::new(leg), id, log)
    }

    fn offer(provider_call_id: &str) -> (CallOffer, LegId, Arc<Mutex<LegLog>>) {
        let (leg, id, log) = fake_leg(Some(provider_call_id));
        let offer = CallOffer {
            leg,
            from: "+15550001111".to_string(),
            to: "+15559876543".to_string(),
        };
        (offer, id, log)
    }

    fn dial() -> CallInput {
        CallInput::Dial {
            destination: "+15551234567".to_string(),
            from: Some("+15559876543".to_string()),
        }
    }

    fn statuses(effects: &[Effect]) -> Vec<CallStatus> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Notify(Notification::CallStatusChanged { status, .. }) => Some(*status),
                _ => None,
            })
            .collect()
    }

    fn prompts(effects: &[Effect]) -> Vec<ReportPrompt> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::OpenReportPrompt(prompt) => Some(prompt.clone()),
                _ => None,
            })
            .collect()
    }

    fn reset_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::ScheduleReset { generation } => Some(*generation),
            _ => None,
        })
    }

    fn connect_attempt(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::Connect { attempt, .. } => Some(*attempt),
            _ => None,
        })
    }

    /// Connect result for the most recent dial
    fn leg_ready(
        controller: &CallController,
        result: Result<Box<dyn CallLeg>, TransportError>,
    ) -> CallInput {
        CallInput::LegReady {
            attempt: controller.connect_attempt,
            result,
        }
    }

    fn ticker_generation(effects: &[Effect]) -> Option<u64> {
        effects.iter().find_map(|effect| match effect {
            Effect::StartTicker { generation } => Some(*generation),
            _ => None,
        })
    }

    /// Dial and let the transport confirm pickup
    fn connected_outbound(
        controller: &mut CallController,
        provider_call_id: &str,
    ) -> (LegId, Arc<Mutex<LegLog>>, u64) {
        controller.reduce(dial()).unwrap();
        let (leg, id, log) = fake_leg(Some(provider_call_id));
        let ready = leg_ready(controller, Ok(leg));
        controller.reduce(ready).unwrap();
        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Accepted,
            })
            .unwrap();
        let generation = ticker_generation(&effects).unwrap();
        (id, log, generation)
    }

    #[test]
    fn test_dial_requires_destination_and_originating_number() {
        let mut controller = CallController::new(Volume::default());

        let err = controller
            .reduce(CallInput::Dial {
                destination: "  ".to_string(),
                from: Some("+15559876543".to_string()),
            })
            .err()
            .unwrap();
        assert!(matches!(err, SoftphoneError::Validation(_)));

        let err = controller
            .reduce(CallInput::Dial {
                destination: "+15551234567".to_string(),
                from: None,
            })
            .err()
            .unwrap();
        assert!(matches!(err, SoftphoneError::Validation(_)));

        assert_eq!(controller.status(), CallStatus::Idle);
        assert!(controller.call().is_none());
    }

    #[test]
    fn test_outbound_call_scenario() {
        let mut controller = CallController::new(Volume::default());

        let effects = controller.reduce(dial()).unwrap();
        assert_eq!(statuses(&effects), vec![CallStatus::Connecting]);
        assert!(effects.iter().any(
            |e| matches!(e, Effect::Connect { params, .. } if params.to.as_str() == "+15551234567")
        ));

        let (leg, id, log) = fake_leg(Some("CA100"));
        let ready = leg_ready(&controller, Ok(leg));
        controller.reduce(ready).unwrap();
        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Accepted,
            })
            .unwrap();
        assert_eq!(statuses(&effects), vec![CallStatus::Connected]);
        let ticks = ticker_generation(&effects).unwrap();

        controller.reduce(CallInput::Tick { generation: ticks }).unwrap();
        controller.reduce(CallInput::Tick { generation: ticks }).unwrap();
        assert_eq!(controller.timer().elapsed_secs(), 2);

        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Disconnected,
            })
            .unwrap();
        assert_eq!(statuses(&effects), vec![CallStatus::Ended]);
        assert!(effects.contains(&Effect::StopTicker));
        let opened = prompts(&effects);
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].provider_call_id.as_str(), "CA100");
        assert_eq!(opened[0].originating_number.as_str(), "+15559876543");
        assert!(effects.iter().any(
            |e| matches!(e, Effect::RefreshHistory { number } if number.as_str() == "+15559876543")
        ));
        assert_eq!(controller.timer().elapsed_secs(), 0);
        assert_eq!(log.lock().unwrap().disconnected, 0);

        let generation = reset_generation(&effects).unwrap();
        let effects = controller
            .reduce(CallInput::GraceElapsed { generation })
            .unwrap();
        assert_eq!(statuses(&effects), vec![CallStatus::Idle]);
        assert!(controller.call().is_none());
    }

    #[test]
    fn test_terminal_events_open_one_prompt() {
        let mut controller = CallController::new(Volume::default());
        let (id, _, _) = connected_outbound(&mut controller, "CA200");

        let mut opened = 0;
        for event in [
            CallLegEvent::Disconnected,
            CallLegEvent::Cancelled,
            CallLegEvent::Rejected,
        ] {
            let effects = controller.reduce(CallInput::Leg { leg: id, event }).unwrap();
            opened += prompts(&effects).len();
        }
        assert_eq!(opened, 1);
        assert_eq!(controller.status(), CallStatus::Ended);
    }

    #[test]
    fn test_same_provider_call_id_prompts_once_across_offers() {
        let mut controller = CallController::new(Volume::default());

        let (first, first_leg, _) = offer("CA300");
        controller.reduce(CallInput::Offer(first)).unwrap();
        let effects = controller
            .reduce(CallInput::Leg {
                leg: first_leg,
                event: CallLegEvent::Cancelled,
            })
            .unwrap();
        assert_eq!(prompts(&effects).len(), 1);
        assert_eq!(controller.status(), CallStatus::Idle);

        let (again, _, _) = offer("CA300");
        controller.reduce(CallInput::Offer(again)).unwrap();
        let effects = controller.reduce(CallInput::Reject).unwrap();
        assert!(prompts(&effects).is_empty());
    }

    #[test]
    fn test_inbound_reject_scenario() {
        let mut controller = CallController::new(Volume::default());
        let (incoming, id, log) = offer("CA400");

        let effects = controller.reduce(CallInput::Offer(incoming)).unwrap();
        assert_eq!(controller.status(), CallStatus::Ringing);
        assert!(effects.contains(&Effect::Notify(Notification::IncomingCall {
            from: "+15550001111".to_string(),
            to: "+15559876543".to_string(),
        })));
        assert!(controller.snapshot().incoming_pending);

        let effects = controller.reduce(CallInput::Reject).unwrap();
        assert_eq!(controller.status(), CallStatus::Idle);
        assert_eq!(statuses(&effects), vec![CallStatus::Idle]);
        assert!(effects.contains(&Effect::Notify(Notification::IncomingCallCleared)));
        assert_eq!(prompts(&effects).len(), 1);
        assert_eq!(log.lock().unwrap().rejected, 1);

        // The transport echoes the reject for a leg that no longer exists
        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Rejected,
            })
            .unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_answer_connects_and_starts_timer() {
        let mut controller = CallController::new(Volume::default());
        let (incoming, _, log) = offer("CA500");
        controller.reduce(CallInput::Offer(incoming)).unwrap();

        let effects = controller.reduce(CallInput::Answer).unwrap();
        assert_eq!(controller.status(), CallStatus::Connected);
        assert!(ticker_generation(&effects).is_some());
        assert!(effects.contains(&Effect::Notify(Notification::IncomingCallCleared)));
        assert!(controller.timer().is_running());
        assert_eq!(log.lock().unwrap().accepted, 1);
    }

    #[test]
    fn test_answer_and_reject_are_noops_without_offer() {
        let mut controller = CallController::new(Volume::default());
        assert!(controller.reduce(CallInput::Answer).unwrap().is_empty());
        assert!(controller.reduce(CallInput::Reject).unwrap().is_empty());

        connected_outbound(&mut controller, "CA600");
        assert!(controller.reduce(CallInput::Answer).unwrap().is_empty());
        assert_eq!(controller.status(), CallStatus::Connected);
    }

    #[test]
    fn test_digit_goes_to_buffer_when_idle_and_transport_when_connected() {
        let mut controller = CallController::new(Volume::default());

        controller.reduce(CallInput::PressDigit('5')).unwrap();
        assert_eq!(controller.dial_buffer().as_str(), "5");

        let (_, log, _) = connected_outbound(&mut controller, "CA700");
        controller.reduce(CallInput::PressDigit('5')).unwrap();
        assert_eq!(log.lock().unwrap().digits, vec!["5".to_string()]);
        assert_eq!(controller.dial_buffer().as_str(), "5");

        let err = controller.reduce(CallInput::PressDigit('+')).err().unwrap();
        assert!(matches!(err, SoftphoneError::Validation(_)));
    }

    #[test]
    fn test_digits_rejected_while_ringing() {
        let mut controller = CallController::new(Volume::default());
        let (incoming, _, log) = offer("CA710");
        controller.reduce(CallInput::Offer(incoming)).unwrap();

        let err = controller.reduce(CallInput::PressDigit('1')).err().unwrap();
        assert!(matches!(err, SoftphoneError::InvalidState(_)));
        assert!(log.lock().unwrap().digits.is_empty());
    }

    #[test]
    fn test_dial_buffer_editing() {
        let mut controller = CallController::new(Volume::default());
        for c in "+155".chars() {
            controller.reduce(CallInput::PressDigit(c)).unwrap();
        }
        assert!(controller.reduce(CallInput::PressDigit('+')).is_err());

        controller.reduce(CallInput::Backspace).unwrap();
        assert_eq!(controller.dial_buffer().as_str(), "+15");

        let effects = controller.reduce(CallInput::ClearDialBuffer).unwrap();
        assert!(controller.dial_buffer().is_empty());
        assert_eq!(
            effects,
            vec![Effect::Notify(Notification::DialBufferChanged {
                digits: String::new()
            })]
        );
    }

    #[test]
    fn test_hold_twice_keeps_timer() {
        let mut controller = CallController::new(Volume::default());
        let (_, _, generation) = connected_outbound(&mut controller, "CA800");
        for _ in 0..3 {
            controller.reduce(CallInput::Tick { generation }).unwrap();
        }

        controller.reduce(CallInput::ToggleHold).unwrap();
        assert_eq!(controller.status(), CallStatus::Hold);
        controller.reduce(CallInput::Tick { generation }).unwrap();

        let effects = controller.reduce(CallInput::ToggleHold).unwrap();
        assert_eq!(controller.status(), CallStatus::Connected);
        assert!(!effects.contains(&Effect::StopTicker));
        assert!(ticker_generation(&effects).is_none());
        assert_eq!(controller.timer().elapsed_secs(), 4);
    }

    #[test]
    fn test_next_call_timer_starts_at_zero() {
        let mut controller = CallController::new(Volume::default());
        let (id, _, generation) = connected_outbound(&mut controller, "CA900");
        controller.reduce(CallInput::Tick { generation }).unwrap();
        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Disconnected,
            })
            .unwrap();
        let reset = reset_generation(&effects).unwrap();
        controller
            .reduce(CallInput::GraceElapsed { generation: reset })
            .unwrap();

        let (_, _, next) = connected_outbound(&mut controller, "CA901");
        assert_ne!(next, generation);
        assert_eq!(controller.timer().elapsed_secs(), 0);

        // A tick from the previous call's ticker is ignored
        controller.reduce(CallInput::Tick { generation }).unwrap();
        assert_eq!(controller.timer().elapsed_secs(), 0);
    }

    #[test]
    fn test_offer_while_busy_is_rejected() {
        let mut controller = CallController::new(Volume::default());
        connected_outbound(&mut controller, "CA1000");

        let (second, _, log) = offer("CA1001");
        let effects = controller.reduce(CallInput::Offer(second)).unwrap();
        assert_eq!(log.lock().unwrap().rejected, 1);
        assert!(effects.contains(&Effect::Notify(Notification::BusyRejected {
            from: "+15550001111".to_string()
        })));
        assert_eq!(controller.status(), CallStatus::Connected);
        assert_eq!(
            controller.call().unwrap().provider_call_id().unwrap().as_str(),
            "CA1000"
        );
    }

    #[test]
    fn test_dial_while_busy_is_invalid() {
        let mut controller = CallController::new(Volume::default());
        let (incoming, _, _) = offer("CA1100");
        controller.reduce(CallInput::Offer(incoming)).unwrap();

        let err = controller.reduce(dial()).err().unwrap();
        assert!(matches!(err, SoftphoneError::InvalidState(_)));
        assert_eq!(controller.status(), CallStatus::Ringing);
    }

    #[test]
    fn test_transport_error_ends_without_prompt() {
        let mut controller = CallController::new(Volume::default());
        let (id, _, _) = connected_outbound(&mut controller, "CA1200");

        let effects = controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Error("media failure".to_string()),
            })
            .unwrap();
        assert_eq!(controller.status(), CallStatus::Ended);
        assert!(prompts(&effects).is_empty());
        assert!(reset_generation(&effects).is_some());
        assert!(effects.iter().any(|e| matches!(e, Effect::RefreshHistory { .. })));
    }

    #[test]
    fn test_connect_failure_takes_grace_path() {
        let mut controller = CallController::new(Volume::default());
        controller.reduce(dial()).unwrap();

        let failed = leg_ready(
            &controller,
            Err(TransportError::Connect("rejected".to_string())),
        );
        let effects = controller.reduce(failed).unwrap();
        assert_eq!(controller.status(), CallStatus::Ended);
        assert!(prompts(&effects).is_empty());
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Notify(Notification::Error { .. }))));
        assert!(reset_generation(&effects).is_some());
    }

    #[test]
    fn test_hangup_before_leg_bound_disconnects_orphan() {
        let mut controller = CallController::new(Volume::default());
        controller.reduce(dial()).unwrap();
        controller.reduce(CallInput::Hangup).unwrap();
        assert_eq!(controller.status(), CallStatus::Ended);

        let (leg, _, log) = fake_leg(Some("CA1300"));
        let ready = leg_ready(&controller, Ok(leg));
        controller.reduce(ready).unwrap();
        assert_eq!(log.lock().unwrap().disconnected, 1);
    }

    #[test]
    fn test_late_leg_from_earlier_dial_never_binds_to_next_call() {
        let mut controller = CallController::new(Volume::default());
        let effects = controller.reduce(dial()).unwrap();
        let first_attempt = connect_attempt(&effects).unwrap();
        let effects = controller.reduce(CallInput::Hangup).unwrap();
        let generation = reset_generation(&effects).unwrap();
        controller
            .reduce(CallInput::GraceElapsed { generation })
            .unwrap();
        assert_eq!(controller.status(), CallStatus::Idle);

        let effects = controller.reduce(dial()).unwrap();
        let second_attempt = connect_attempt(&effects).unwrap();
        assert_ne!(first_attempt, second_attempt);

        let (late, _, late_log) = fake_leg(Some("CA-first"));
        controller
            .reduce(CallInput::LegReady {
                attempt: first_attempt,
                result: Ok(late),
            })
            .unwrap();
        assert_eq!(late_log.lock().unwrap().disconnected, 1);
        assert!(controller.call().unwrap().leg_id().is_none());

        let (leg, id, log) = fake_leg(Some("CA-second"));
        controller
            .reduce(CallInput::LegReady {
                attempt: second_attempt,
                result: Ok(leg),
            })
            .unwrap();
        assert_eq!(log.lock().unwrap().disconnected, 0);
        controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Accepted,
            })
            .unwrap();
        assert_eq!(controller.status(), CallStatus::Connected);
        assert_eq!(
            controller.call().unwrap().provider_call_id().map(|id| id.as_str()),
            Some("CA-second")
        );
    }

    #[test]
    fn test_call_events_are_published_as_metrics() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            let mut controller = CallController::new(Volume::default());
            connected_outbound(&mut controller, "CA1400");
            controller.reduce(CallInput::ToggleMute).unwrap();
            controller.reduce(CallInput::Hangup).unwrap();
        });

        let rendered = handle.render();
        assert!(rendered.contains("softphone_calls_total{direction=\"outbound\"} 1"));
        assert!(rendered.contains("softphone_call_transitions_total{to=\"connected\"} 1"));
        assert!(rendered.contains("softphone_call_transitions_total{to=\"ended\"} 1"));
        assert!(rendered.contains("softphone_mute_changes_total{muted=\"true\"} 1"));
        assert!(rendered.contains("softphone_calls_ended_total{reason=\"disconnected\"} 1"));
    }

    #[test]
    fn test_late_failure_from_earlier_dial_is_ignored() {
        let mut controller = CallController::new(Volume::default());
        let effects = controller.reduce(dial()).unwrap();
        let first_attempt = connect_attempt(&effects).unwrap();
        let effects = controller.reduce(CallInput::Hangup).unwrap();
        let generation = reset_generation(&effects).unwrap();
        controller
            .reduce(CallInput::GraceElapsed { generation })
            .unwrap();
        controller.reduce(dial()).unwrap();

        let effects = controller
            .reduce(CallInput::LegReady {
                attempt: first_attempt,
                result: Err(TransportError::Closed),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(controller.status(), CallStatus::Connecting);
    }

    #[test]
    fn test_hangup_disconnects_leg() {
        let mut controller = CallController::new(Volume::default());
        let (_, log, _) = connected_outbound(&mut controller, "CA1400");

        let effects = controller.reduce(CallInput::Hangup).unwrap();
        assert_eq!(controller.status(), CallStatus::Ended);
        assert_eq!(log.lock().unwrap().disconnected, 1);
        assert_eq!(prompts(&effects).len(), 1);

        assert!(controller.reduce(CallInput::Hangup).is_err());
    }

    #[test]
    fn test_stale_leg_events_are_discarded() {
        let mut controller = CallController::new(Volume::default());
        connected_outbound(&mut controller, "CA1500");

        let effects = controller
            .reduce(CallInput::Leg {
                leg: LegId::new(),
                event: CallLegEvent::Disconnected,
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(controller.status(), CallStatus::Connected);
    }

    #[test]
    fn test_transport_mute_echo_is_authoritative() {
        let mut controller = CallController::new(Volume::default());
        let (id, log, _) = connected_outbound(&mut controller, "CA1600");

        controller.reduce(CallInput::ToggleMute).unwrap();
        assert!(controller.call().unwrap().muted_by_agent());
        assert_eq!(log.lock().unwrap().muted, vec![true]);

        controller
            .reduce(CallInput::Leg {
                leg: id,
                event: CallLegEvent::Muted(false),
            })
            .unwrap();
        assert!(!controller.call().unwrap().muted_by_agent());
    }

    #[test]
    fn test_volume_is_forwarded_normalized() {
        let mut controller = CallController::new(Volume::default());
        assert!(controller.reduce(CallInput::SetVolume(50)).is_err());

        let (_, log, _) = connected_outbound(&mut controller, "CA1700");
        controller.reduce(CallInput::SetVolume(50)).unwrap();
        assert_eq!(log.lock().unwrap().volumes, vec![0.5]);
        assert!(controller.reduce(CallInput::SetVolume(101)).is_err());
    }
}
