//! Softphone runtime
//!
//! One task owns the transport session, the call controller, the history
//! cache and the report prompt. Agent commands, transport events, timer
//! ticks and async completions are all serialized onto it, so no two
//! transitions ever run concurrently. Network work is spawned and its result
//! comes back as a message tagged with the session epoch.
//!
//! [`Softphone`] is the cloneable handle the API layer talks to.

use crate::application::controller::{CallController, CallInput, CallSnapshot, Effect};
use crate::application::error::{SoftphoneError, SoftphoneResult};
use crate::application::history::CallHistoryCache;
use crate::application::metrics;
use crate::application::notification::{Notification, NotificationBroadcaster};
use crate::application::scheduler::{Delays, Ticker};
use crate::application::session::{open_device, SessionSnapshot, TransportSession};
use crate::domain::call::{CallDomainService, Volume};
use crate::domain::history::{CallHistoryRepository, HistoryPage, HistoryQuery};
use crate::domain::numbers::{NumberInventory, OriginatingNumber};
use crate::domain::report::{CallReport, ReportPrompt, ReportSubmitter};
use crate::domain::session::{AgentIdentity, SessionStatus, SessionToken, TokenIssuer};
use crate::domain::shared::error::ServiceError;
use crate::domain::shared::value_objects::{LegId, PhoneNumber, SessionEpoch};
use crate::domain::transport::{
    CallLeg, CallLegEvent, ConnectParams, DeviceFactory, TransportError, TransportEvent,
    TransportEventReceiver, TransportEventSender, VoiceDevice,
};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External collaborators of the softphone
#[derive(Clone)]
pub struct SoftphoneDeps {
    pub identity: AgentIdentity,
    pub tokens: Arc<dyn TokenIssuer>,
    pub devices: Arc<dyn DeviceFactory>,
    pub history: Arc<dyn CallHistoryRepository>,
    pub reports: Arc<dyn ReportSubmitter>,
    pub numbers: Arc<dyn NumberInventory>,
}

#[derive(Debug, Clone)]
pub struct SoftphoneSettings {
    /// Pause in `Ended` before the controller resets to `Idle`
    pub grace_delay: Duration,
    pub tick_interval: Duration,
    pub history_page_size: u32,
    pub default_volume: Volume,
}

impl Default for SoftphoneSettings {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
            history_page_size: 20,
            default_volume: Volume::default(),
        }
    }
}

/// Agent-initiated call actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentAction {
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
}

impl From<AgentAction> for CallInput {
    fn from(action: AgentAction) -> Self {
        match action {
            AgentAction::Dial { destination, from } => CallInput::Dial { destination, from },
            AgentAction::Answer => CallInput::Answer,
            AgentAction::Reject => CallInput::Reject,
            AgentAction::Hangup => CallInput::Hangup,
            AgentAction::ToggleMute => CallInput::ToggleMute,
            AgentAction::ToggleHold => CallInput::ToggleHold,
            AgentAction::SetVolume(level) => CallInput::SetVolume(level),
            AgentAction::PressDigit(c) => CallInput::PressDigit(c),
            AgentAction::Backspace => CallInput::Backspace,
            AgentAction::ClearDialBuffer => CallInput::ClearDialBuffer,
        }
    }
}

/// Everything the agent UI renders
#[derive(Debug, Clone, Serialize)]
pub struct SoftphoneState {
    pub session: SessionSnapshot,
    pub call: CallSnapshot,
    pub report_prompt: Option<ReportPrompt>,
    pub report_submitting: bool,
}

type Reply<T> = oneshot::Sender<SoftphoneResult<T>>;

/// Requests from [`Softphone`] handles
enum Command {
    Act {
        action: AgentAction,
        reply: Reply<CallSnapshot>,
    },
    State {
        reply: oneshot::Sender<SoftphoneState>,
    },
    SubmitReport {
        comment: String,
        reply: Reply<()>,
    },
    DismissReport {
        reply: Reply<()>,
    },
    History {
        query: HistoryQuery,
        reply: Reply<HistoryPage>,
    },
    Teardown {
        reply: oneshot::Sender<()>,
    },
}

/// Completions and timer firings posted back by spawned tasks
enum Message {
    Initialized {
        epoch: SessionEpoch,
        result: SoftphoneResult<(Arc<dyn VoiceDevice>, SessionToken)>,
    },
    Connected {
        epoch: SessionEpoch,
        attempt: u64,
        result: Result<Box<dyn CallLeg>, TransportError>,
    },
    TokenRenewed {
        epoch: SessionEpoch,
        result: Result<SessionToken, ServiceError>,
    },
    HistoryFetched {
        epoch: SessionEpoch,
        generation: u64,
        query: HistoryQuery,
        result: Result<HistoryPage, ServiceError>,
        reply: Option<Reply<HistoryPage>>,
    },
    ReportFinished {
        epoch: SessionEpoch,
        report: CallReport,
        result: Result<(), ServiceError>,
        reply: Reply<()>,
    },
    Tick {
        generation: u64,
    },
    GraceElapsed {
        generation: u64,
    },
}

/// Cloneable handle to a running softphone
#[derive(Clone)]
pub struct Softphone {
    commands: mpsc::UnboundedSender<Command>,
    notifications: NotificationBroadcaster,
    numbers: Arc<dyn NumberInventory>,
}

impl Softphone {
    /// Spawn the event loop and start initializing the transport session.
    ///
    /// The loop runs until every handle is dropped; the returned join
    /// handle completes after the device has been destroyed.
    pub fn start(deps: SoftphoneDeps, settings: SoftphoneSettings) -> (Self, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let notifications = NotificationBroadcaster::new();

        let handle = Self {
            commands: commands_tx,
            notifications: notifications.clone(),
            numbers: deps.numbers.clone(),
        };

        let runtime = Runtime {
            session: TransportSession::new(deps.identity.clone()),
            controller: CallController::new(settings.default_volume),
            history: CallHistoryCache::new(settings.history_page_size),
            report_prompt: None,
            report_in_flight: false,
            pending_connect: None,
            held_events: Vec::new(),
            ticker: Ticker::new(settings.tick_interval),
            delays: Delays::new(),
            internal: internal_tx,
            events: events_tx,
            notifications,
            deps,
            settings,
        };
        let task = tokio::spawn(runtime.run(commands_rx, internal_rx, events_rx));
        (handle, task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    pub async fn act(&self, action: AgentAction) -> SoftphoneResult<CallSnapshot> {
        self.request(|reply| Command::Act { action, reply }).await?
    }

    pub async fn dial(
        &self,
        destination: impl Into<String>,
        from: Option<String>,
    ) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::Dial {
            destination: destination.into(),
            from,
        })
        .await
    }

    pub async fn answer(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::Answer).await
    }

    pub async fn reject(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::Reject).await
    }

    pub async fn hangup(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::Hangup).await
    }

    pub async fn toggle_mute(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::ToggleMute).await
    }

    pub async fn toggle_hold(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::ToggleHold).await
    }

    pub async fn set_volume(&self, level: u8) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::SetVolume(level)).await
    }

    pub async fn press_digit(&self, digit: char) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::PressDigit(digit)).await
    }

    pub async fn backspace(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::Backspace).await
    }

    pub async fn clear_dial_buffer(&self) -> SoftphoneResult<CallSnapshot> {
        self.act(AgentAction::ClearDialBuffer).await
    }

    pub async fn state(&self) -> SoftphoneResult<SoftphoneState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Post the agent's comment for the open report prompt
    pub async fn submit_report(&self, comment: impl Into<String>) -> SoftphoneResult<()> {
        let comment = comment.into();
        self.request(|reply| Command::SubmitReport { comment, reply })
            .await?
    }

    pub async fn dismiss_report(&self) -> SoftphoneResult<()> {
        self.request(|reply| Command::DismissReport { reply }).await?
    }

    pub async fn history(&self, query: HistoryQuery) -> SoftphoneResult<HistoryPage> {
        self.request(|reply| Command::History { query, reply }).await?
    }

    /// The originating-number pool; not session state, so it skips the loop
    pub async fn numbers(&self) -> SoftphoneResult<Vec<OriginatingNumber>> {
        Ok(self.numbers.list().await?)
    }

    /// Destroy the transport device. Completes once the device is gone.
    pub async fn teardown(&self) -> SoftphoneResult<()> {
        self.request(|reply| Command::Teardown { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> SoftphoneResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| SoftphoneError::SessionClosed)?;
        rx.await.map_err(|_| SoftphoneError::SessionClosed)
    }
}

struct Runtime {
    session: TransportSession,
    controller: CallController,
    history: CallHistoryCache,
    report_prompt: Option<ReportPrompt>,
    report_in_flight: bool,
    /// Attempt of the latest outbound connect that has not resolved yet
    pending_connect: Option<u64>,
    /// Leg events that arrived before their connect resolved
    held_events: Vec<(LegId, CallLegEvent)>,
    ticker: Ticker,
    delays: Delays,
    internal: mpsc::UnboundedSender<Message>,
    events: TransportEventSender,
    notifications: NotificationBroadcaster,
    deps: SoftphoneDeps,
    settings: SoftphoneSettings,
}

impl Runtime {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Message>,
        mut events: TransportEventReceiver,
    ) {
        self.initialize();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(message) = internal.recv() => self.handle_message(message),
                Some(event) = events.recv() => self.handle_transport_event(event),
            }
        }

        if !self.session.is_closed() {
            self.teardown();
        }
        debug!("Softphone event loop stopped");
    }

    fn initialize(&mut self) {
        if !self.session.begin_initialize() {
            return;
        }
        self.publish_session_status();

        let epoch = self.session.epoch();
        let identity = self.deps.identity.clone();
        let tokens = self.deps.tokens.clone();
        let devices = self.deps.devices.clone();
        let events = self.events.clone();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = open_device(&identity, tokens.as_ref(), devices.as_ref(), events).await;
            if let Err(mpsc::error::SendError(Message::Initialized {
                result: Ok((device, _)),
                ..
            })) = tx.send(Message::Initialized { epoch, result })
            {
                device.destroy();
            }
        });
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Act { action, reply } => {
                let result = self.act(action);
                let _ = reply.send(result);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state());
            }
            Command::SubmitReport { comment, reply } => self.submit_report(comment, reply),
            Command::DismissReport { reply } => {
                let _ = reply.send(self.dismiss_report());
            }
            Command::History { query, reply } => self.history(query, reply),
            Command::Teardown { reply } => {
                if !self.session.is_closed() {
                    self.teardown();
                }
                let _ = reply.send(());
            }
        }
    }

    fn act(&mut self, action: AgentAction) -> SoftphoneResult<CallSnapshot> {
        if self.session.is_closed() {
            return Err(SoftphoneError::SessionClosed);
        }
        if let AgentAction::Dial { destination, from } = &action {
            CallDomainService::validate_dial(destination, from.as_deref())?;
            if self.session.device().is_none() {
                return Err(SoftphoneError::SessionUnavailable(format!(
                    "transport session is {}",
                    self.session.status()
                )));
            }
        }
        debug!(?action, "Agent action");
        let effects = self.controller.reduce(action.into())?;
        self.apply(effects);
        Ok(self.controller.snapshot())
    }

    fn state(&self) -> SoftphoneState {
        SoftphoneState {
            session: self.session.snapshot(),
            call: self.controller.snapshot(),
            report_prompt: self.report_prompt.clone(),
            report_submitting: self.report_in_flight,
        }
    }

    fn handle_message(&mut self, message: Message) {
        match message {
            Message::Initialized { epoch, result } => self.initialized(epoch, result),
            Message::Connected {
                epoch,
                attempt,
                result,
            } => self.connected(epoch, attempt, result),
            Message::TokenRenewed { epoch, result } => {
                if !self.session.is_current(epoch) {
                    debug!("Discarding token renewal for a closed session");
                    return;
                }
                match self.session.complete_renewal(result) {
                    Ok(()) => self.notifications.publish(Notification::TokenRenewed),
                    Err(e) => self.notifications.publish(Notification::TokenRenewalFailed {
                        error: e.to_string(),
                    }),
                }
            }
            Message::HistoryFetched {
                epoch,
                generation,
                query,
                result,
                reply,
            } => self.history_fetched(epoch, generation, query, result, reply),
            Message::ReportFinished {
                epoch,
                report,
                result,
                reply,
            } => self.report_finished(epoch, report, result, reply),
            Message::Tick { generation } => self.feed(CallInput::Tick { generation }),
            Message::GraceElapsed { generation } => {
                self.feed(CallInput::GraceElapsed { generation })
            }
        }
    }

    fn initialized(
        &mut self,
        epoch: SessionEpoch,
        result: SoftphoneResult<(Arc<dyn VoiceDevice>, SessionToken)>,
    ) {
        match result {
            Ok((device, _)) if !self.session.is_current(epoch) => {
                debug!("Session closed while the device was opening; destroying it");
                device.destroy();
            }
            Ok((device, _)) if self.session.status() == SessionStatus::Error => {
                warn!("Device opened after the session failed; destroying it");
                device.destroy();
            }
            Ok((device, token)) => {
                info!("Transport device ready");
                self.session.complete_initialize(device, token);
            }
            Err(_) if !self.session.is_current(epoch) => {}
            Err(e) => {
                self.session.fail(&e);
                self.publish_session_status();
                self.notifications.publish(Notification::Error {
                    message: e.to_string(),
                });
            }
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        if self.session.is_closed() {
            if let TransportEvent::Incoming(offer) = event {
                let _ = offer.leg.reject();
            }
            return;
        }

        debug!(event = event.name(), "Transport event");
        match event {
            TransportEvent::Registered => {
                self.session.on_registered();
                self.publish_session_status();
            }
            TransportEvent::Unregistered => {
                self.session.on_unregistered();
                self.publish_session_status();
            }
            TransportEvent::TokenWillExpire => self.renew_token(),
            TransportEvent::Incoming(offer) => self.feed(CallInput::Offer(offer)),
            TransportEvent::DeviceError(message) => {
                if self.session.status() == SessionStatus::Registering {
                    self.session
                        .fail(&SoftphoneError::SessionInit(message.clone()));
                    self.publish_session_status();
                } else {
                    warn!("Transport device error: {}", message);
                }
                self.notifications.publish(Notification::Error { message });
            }
            TransportEvent::Call { leg, event } => {
                let bound = self.controller.call().and_then(|call| call.leg_id());
                if self.pending_connect.is_some() && bound != Some(leg) {
                    debug!("Holding {} for leg {} until connect resolves", event.name(), leg);
                    self.held_events.push((leg, event));
                    return;
                }
                self.feed(CallInput::Leg { leg, event });
            }
        }
    }

    fn renew_token(&mut self) {
        if !self.session.begin_renewal() {
            return;
        }
        let epoch = self.session.epoch();
        let identity = self.deps.identity.clone();
        let tokens = self.deps.tokens.clone();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = tokens.issue(&identity).await;
            let _ = tx.send(Message::TokenRenewed { epoch, result });
        });
    }

    fn connected(
        &mut self,
        epoch: SessionEpoch,
        attempt: u64,
        result: Result<Box<dyn CallLeg>, TransportError>,
    ) {
        if !self.session.is_current(epoch) {
            if let Ok(leg) = result {
                let _ = leg.disconnect();
            }
            return;
        }

        // A superseded attempt is handed to the controller, which drops its
        // leg; held events still wait for the latest attempt.
        if self.pending_connect != Some(attempt) {
            debug!("Connect attempt {} resolved after being superseded", attempt);
            self.feed(CallInput::LegReady { attempt, result });
            return;
        }
        self.pending_connect = None;
        let held = std::mem::take(&mut self.held_events);

        self.feed(CallInput::LegReady { attempt, result });

        let bound = self.controller.call().and_then(|call| call.leg_id());
        for (leg, event) in held {
            if Some(leg) == bound {
                self.feed(CallInput::Leg { leg, event });
            } else {
                debug!("Dropping {} for unknown leg {}", event.name(), leg);
            }
        }
    }

    /// Feed a transport-side input; these never fail, errors are only logged
    fn feed(&mut self, input: CallInput) {
        match self.controller.reduce(input) {
            Ok(effects) => self.apply(effects),
            Err(e) => warn!("Call controller rejected input: {}", e),
        }
    }

    /// Carry out effects in order. Effects produced while doing so are
    /// appended to the same queue.
    fn apply(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Connect { attempt, params } => match self.session.device().cloned() {
                    Some(device) => self.spawn_connect(device, attempt, params),
                    None => {
                        match self.controller.reduce(CallInput::LegReady {
                            attempt,
                            result: Err(TransportError::Closed),
                        }) {
                            Ok(more) => queue.extend(more),
                            Err(e) => warn!("Call controller rejected input: {}", e),
                        }
                    }
                },
                Effect::StartTicker { generation } => {
                    self.ticker
                        .start(self.internal.clone(), move || Message::Tick { generation });
                }
                Effect::StopTicker => self.ticker.stop(),
                Effect::ScheduleReset { generation } => {
                    self.delays.schedule(
                        self.settings.grace_delay,
                        self.internal.clone(),
                        Message::GraceElapsed { generation },
                    );
                }
                Effect::OpenReportPrompt(prompt) => self.open_report_prompt(prompt),
                Effect::RefreshHistory { number } => self.refresh_history(&number),
                Effect::Notify(notification) => self.notifications.publish(notification),
            }
        }
    }

    fn spawn_connect(
        &mut self,
        device: Arc<dyn VoiceDevice>,
        attempt: u64,
        params: ConnectParams,
    ) {
        self.pending_connect = Some(attempt);
        let epoch = self.session.epoch();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = device.connect(params).await;
            if let Err(mpsc::error::SendError(Message::Connected {
                result: Ok(leg), ..
            })) = tx.send(Message::Connected {
                epoch,
                attempt,
                result,
            })
            {
                let _ = leg.disconnect();
            }
        });
    }

    fn open_report_prompt(&mut self, prompt: ReportPrompt) {
        if let Some(previous) = self.report_prompt.take() {
            info!(
                "Replacing unanswered report prompt for {}",
                previous.provider_call_id
            );
            self.notifications.publish(Notification::ReportPromptClosed {
                provider_call_id: previous.provider_call_id.to_string(),
            });
        }
        info!("Opening report prompt for {}", prompt.provider_call_id);
        self.notifications.publish(Notification::ReportPromptOpened {
            provider_call_id: prompt.provider_call_id.to_string(),
            originating_number: prompt.originating_number.to_string(),
        });
        self.report_prompt = Some(prompt);
    }

    fn submit_report(&mut self, comment: String, reply: Reply<()>) {
        if self.session.is_closed() {
            let _ = reply.send(Err(SoftphoneError::SessionClosed));
            return;
        }
        let Some(prompt) = self.report_prompt.as_ref() else {
            let _ = reply.send(Err(SoftphoneError::InvalidState(
                "no report prompt is open".to_string(),
            )));
            return;
        };
        if self.report_in_flight {
            let _ = reply.send(Err(SoftphoneError::InvalidState(
                "a report is already being submitted".to_string(),
            )));
            return;
        }
        let report = match CallReport::for_prompt(prompt, &comment) {
            Ok(report) => report,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };

        info!("Submitting report for {}", report.provider_call_id);
        self.report_in_flight = true;
        let epoch = self.session.epoch();
        let reports = self.deps.reports.clone();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = reports.submit(&report).await;
            let _ = tx.send(Message::ReportFinished {
                epoch,
                report,
                result,
                reply,
            });
        });
    }

    fn report_finished(
        &mut self,
        epoch: SessionEpoch,
        report: CallReport,
        result: Result<(), ServiceError>,
        reply: Reply<()>,
    ) {
        self.report_in_flight = false;
        if !self.session.is_current(epoch) {
            let _ = reply.send(Err(SoftphoneError::SessionClosed));
            return;
        }
        metrics::record_report_submitted(result.is_ok());

        let provider_call_id = report.provider_call_id.to_string();
        match result {
            Ok(()) => {
                info!("Report for {} submitted", provider_call_id);
                let still_open = self
                    .report_prompt
                    .as_ref()
                    .is_some_and(|prompt| prompt.provider_call_id == report.provider_call_id);
                if still_open {
                    self.report_prompt = None;
                }
                self.notifications
                    .publish(Notification::ReportSubmitted { provider_call_id });
                self.refresh_history(&report.originating_number);
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                // The prompt stays open; the agent may edit and submit again or dismiss it
                let err = SoftphoneError::ReportSubmission(e.to_string());
                warn!("Report for {} failed: {}", provider_call_id, err);
                self.notifications.publish(Notification::ReportSubmissionFailed {
                    provider_call_id,
                    error: err.to_string(),
                });
                let _ = reply.send(Err(err));
            }
        }
    }

    fn dismiss_report(&mut self) -> SoftphoneResult<()> {
        let prompt = self
            .report_prompt
            .take()
            .ok_or_else(|| SoftphoneError::InvalidState("no report prompt is open".to_string()))?;
        info!("Report prompt for {} dismissed", prompt.provider_call_id);
        self.notifications.publish(Notification::ReportPromptClosed {
            provider_call_id: prompt.provider_call_id.to_string(),
        });
        Ok(())
    }

    fn history(&mut self, query: HistoryQuery, reply: Reply<HistoryPage>) {
        if self.session.is_closed() {
            let _ = reply.send(Err(SoftphoneError::SessionClosed));
            return;
        }
        if let Some(page) = self.history.get(&query) {
            debug!("History page {} served from cache", query.page);
            let _ = reply.send(Ok(page.clone()));
            return;
        }
        self.fetch_history(query, Some(reply));
    }

    fn refresh_history(&mut self, number: &PhoneNumber) {
        for query in self.history.invalidate(number.as_str()) {
            self.fetch_history(query, None);
        }
    }

    fn fetch_history(&self, query: HistoryQuery, reply: Option<Reply<HistoryPage>>) {
        let epoch = self.session.epoch();
        let generation = self.history.generation();
        let repository = self.deps.history.clone();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = repository.list(&query).await;
            let _ = tx.send(Message::HistoryFetched {
                epoch,
                generation,
                query,
                result,
                reply,
            });
        });
    }

    fn history_fetched(
        &mut self,
        epoch: SessionEpoch,
        generation: u64,
        query: HistoryQuery,
        result: Result<HistoryPage, ServiceError>,
        reply: Option<Reply<HistoryPage>>,
    ) {
        if !self.session.is_current(epoch) {
            debug!("Discarding history page for a closed session");
            if let Some(reply) = reply {
                let _ = reply.send(Err(SoftphoneError::SessionClosed));
            }
            return;
        }

        match result {
            Ok(page) => {
                self.history.store(generation, query.clone(), page.clone());
                match reply {
                    Some(reply) => {
                        let _ = reply.send(Ok(page));
                    }
                    None => {
                        debug!("History refreshed (page {})", query.page);
                        self.notifications.publish(Notification::HistoryRefreshed {
                            number: query.filters.number,
                        });
                    }
                }
            }
            Err(e) => {
                warn!("History fetch failed: {}", e);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e.into()));
                }
            }
        }
    }

    /// Terminate in flight: timers stop, the device is destroyed, any call
    /// goes with it.
    fn teardown(&mut self) {
        info!("Tearing down softphone session");
        self.ticker.stop();
        self.delays.cancel_all();
        self.pending_connect = None;
        self.held_events.clear();
        self.session.teardown();
        self.controller = CallController::new(self.settings.default_volume);
        self.publish_session_status();
    }

    fn publish_session_status(&self) {
        self.notifications.publish(Notification::SessionStatusChanged {
            status: self.session.status(),
        });
    }
}
