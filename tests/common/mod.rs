//! Shared fakes for the softphone integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use softphone::application::{
    Notification, Softphone, SoftphoneDeps, SoftphoneSettings,
};
use softphone::domain::history::{
    CallHistoryEntry, CallHistoryRepository, HistoryPage, HistoryQuery,
};
use softphone::domain::numbers::{NumberInventory, OriginatingNumber};
use softphone::domain::report::{CallReport, ReportSubmitter};
use softphone::domain::session::{AgentIdentity, SessionStatus, SessionToken, TokenIssuer};
use softphone::domain::shared::error::ServiceError;
use softphone::domain::shared::value_objects::{LegId, PhoneNumber, ProviderCallId};
use softphone::domain::transport::{
    CallLeg, CallLegEvent, CallOffer, ConnectParams, DeviceFactory, TransportError,
    TransportEvent, TransportEventSender, VoiceDevice,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

pub const AGENT_NUMBER: &str = "+15559876543";
pub const REMOTE_NUMBER: &str = "+15551234567";

/// What the agent did to one leg
#[derive(Debug, Default)]
pub struct LegLog {
    pub accepted: usize,
    pub rejected: usize,
    pub disconnected: usize,
    pub muted: Vec<bool>,
    pub volumes: Vec<f32>,
    pub digits: Vec<String>,
}

pub struct FakeLeg {
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

#[derive(Default)]
struct TransportState {
    events: Option<TransportEventSender>,
    created: usize,
    destroyed: usize,
    tokens: Vec<String>,
    connects: Vec<ConnectParams>,
    legs: Vec<(LegId, Arc<Mutex<LegLog>>)>,
}

/// Test-side view of the fake transport: inspect what the softphone did and
/// inject signaling events
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<TransportState>>,
    fail_register: Arc<AtomicBool>,
    connect_delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeTransport {
    pub fn emit(&self, event: TransportEvent) {
        let sender = self.state.lock().unwrap().events.clone();
        sender
            .expect("device not created yet")
            .send(event)
            .expect("softphone event loop gone");
    }

    pub fn leg_event(&self, leg: LegId, event: CallLegEvent) {
        self.emit(TransportEvent::Call { leg, event });
    }

    /// Present an inbound call to the agent
    pub fn offer(&self, from: &str, provider_call_id: &str) -> (LegId, Arc<Mutex<LegLog>>) {
        let (leg, id, log) = new_leg(Some(provider_call_id));
        self.emit(TransportEvent::Incoming(CallOffer {
            leg,
            from: from.to_string(),
            to: AGENT_NUMBER.to_string(),
        }));
        (id, log)
    }

    pub fn last_leg(&self) -> (LegId, Arc<Mutex<LegLog>>) {
        let state = self.state.lock().unwrap();
        let (id, log) = state.legs.last().expect("no leg connected");
        (*id, log.clone())
    }

    /// Outbound legs in the order their connects resolved
    pub fn leg(&self, index: usize) -> (LegId, Arc<Mutex<LegLog>>) {
        let state = self.state.lock().unwrap();
        let (id, log) = &state.legs[index];
        (*id, log.clone())
    }

    pub fn connects(&self) -> Vec<ConnectParams> {
        self.state.lock().unwrap().connects.clone()
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().unwrap().destroyed
    }

    pub fn tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().tokens.clone()
    }

    pub fn fail_register(&self) {
        self.fail_register.store(true, Ordering::SeqCst);
    }

    pub fn delay_connect(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }
}

fn new_leg(provider_call_id: Option<&str>) -> (Box<dyn CallLeg>, LegId, Arc<Mutex<LegLog>>) {
    let id = LegId::new();
    let log = Arc::new(Mutex::new(LegLog::default()));
    let leg = FakeLeg {
        id,
        provider_call_id: provider_call_id.map(ProviderCallId::new),
        log: log.clone(),
    };
    (Box::new(leg), id, log)
}

pub struct FakeDevice {
    transport: FakeTransport,
}

#[async_trait]
impl VoiceDevice for FakeDevice {
    async fn register(&self) -> Result<(), TransportError> {
        if self.transport.fail_register.load(Ordering::SeqCst) {
            return Err(TransportError::Register("forbidden".to_string()));
        }
        self.transport.emit(TransportEvent::Registered);
        Ok(())
    }

    async fn connect(&self, params: ConnectParams) -> Result<Box<dyn CallLeg>, TransportError> {
        let delay = *self.transport.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.transport.state.lock().unwrap();
        let provider_call_id = format!("CA-out-{}", state.connects.len() + 1);
        state.connects.push(params);
        let (leg, id, log) = new_leg(Some(&provider_call_id));
        state.legs.push((id, log));
        Ok(leg)
    }

    fn update_token(&self, token: &SessionToken) -> Result<(), TransportError> {
        self.transport
            .state
            .lock()
            .unwrap()
            .tokens
            .push(token.value().to_string());
        Ok(())
    }

    fn destroy(&self) {
        self.transport.state.lock().unwrap().destroyed += 1;
    }
}

pub struct FakeDeviceFactory {
    transport: FakeTransport,
}

#[async_trait]
impl DeviceFactory for FakeDeviceFactory {
    async fn create(
        &self,
        token: &SessionToken,
        events: TransportEventSender,
    ) -> Result<Arc<dyn VoiceDevice>, TransportError> {
        {
            let mut state = self.transport.state.lock().unwrap();
            state.events = Some(events);
            state.created += 1;
            state.tokens.push(token.value().to_string());
        }
        Ok(Arc::new(FakeDevice {
            transport: self.transport.clone(),
        }))
    }
}

#[derive(Default)]
pub struct FakeTokenIssuer {
    pub issued: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl TokenIssuer for FakeTokenIssuer {
    async fn issue(&self, _identity: &AgentIdentity) -> Result<SessionToken, ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Status {
                status: 500,
                body: "token service down".to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SessionToken::new(format!("token-{}", n), None))
    }
}

/// History backend with an optional response delay
#[derive(Default)]
pub struct FakeHistory {
    pub queries: Mutex<Vec<HistoryQuery>>,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeHistory {
    pub fn fetches(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl CallHistoryRepository for FakeHistory {
    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage, ServiceError> {
        self.queries.lock().unwrap().push(query.clone());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(HistoryPage {
            entries: vec![CallHistoryEntry {
                call_id: "CA-history".to_string(),
                direction: softphone::domain::call::CallDirection::Outbound,
                from: AGENT_NUMBER.to_string(),
                to: REMOTE_NUMBER.to_string(),
                status: "completed".to_string(),
                duration: Some(42),
                comment: None,
                created_at: chrono::Utc::now(),
            }],
            total: 1,
            page: query.page,
            page_size: query.page_size,
        })
    }
}

#[derive(Default)]
pub struct FakeReports {
    pub submitted: Mutex<Vec<CallReport>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ReportSubmitter for FakeReports {
    async fn submit(&self, report: &CallReport) -> Result<(), ServiceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::Http("connection refused".to_string()));
        }
        self.submitted.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub struct FakeNumbers;

#[async_trait]
impl NumberInventory for FakeNumbers {
    async fn list(&self) -> Result<Vec<OriginatingNumber>, ServiceError> {
        Ok(vec![OriginatingNumber {
            number: PhoneNumber::parse(AGENT_NUMBER).unwrap(),
            label: Some("Sales".to_string()),
        }])
    }
}

pub struct Harness {
    pub softphone: Softphone,
    pub task: JoinHandle<()>,
    pub transport: FakeTransport,
    pub tokens: Arc<FakeTokenIssuer>,
    pub history: Arc<FakeHistory>,
    pub reports: Arc<FakeReports>,
}

impl Harness {
    /// Start a softphone and wait for it to register
    pub async fn registered() -> Self {
        let harness = Self::start(FakeTransport::default(), Arc::default());
        harness.wait_for_session(SessionStatus::Registered).await;
        harness
    }

    pub fn start(transport: FakeTransport, tokens: Arc<FakeTokenIssuer>) -> Self {
        let history = Arc::new(FakeHistory::default());
        let reports = Arc::new(FakeReports::default());
        let deps = SoftphoneDeps {
            identity: AgentIdentity::new("agent-7", "Agent Seven"),
            tokens: tokens.clone(),
            devices: Arc::new(FakeDeviceFactory {
                transport: transport.clone(),
            }),
            history: history.clone(),
            reports: reports.clone(),
            numbers: Arc::new(FakeNumbers),
        };
        let (softphone, task) = Softphone::start(deps, SoftphoneSettings::default());
        Self {
            softphone,
            task,
            transport,
            tokens,
            history,
            reports,
        }
    }

    pub async fn wait_for_session(&self, status: SessionStatus) {
        for _ in 0..100 {
            let state = self.softphone.state().await.unwrap();
            settle().await;
            if state.session.status == status {
                return;
            }
        }
        panic!("session never reached {}", status);
    }

    /// Dial out and have the transport accept the call
    pub async fn connected_outbound(&self) -> (LegId, Arc<Mutex<LegLog>>) {
        self.softphone
            .dial(REMOTE_NUMBER, Some(AGENT_NUMBER.to_string()))
            .await
            .unwrap();
        settle().await;
        let (leg, log) = self.transport.last_leg();
        self.transport.leg_event(leg, CallLegEvent::Accepted);
        settle().await;
        (leg, log)
    }
}

/// Let spawned tasks and queued messages run without advancing timers
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn drain(rx: &mut broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        out.push(notification);
    }
    out
}
