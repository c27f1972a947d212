//! Call bounded context - the lifecycle of the agent's single call

pub mod aggregate;
pub mod dtmf;
pub mod entity;
pub mod event;
pub mod service;
pub mod timer;
pub mod value_object;

pub use aggregate::CallRecord;
pub use dtmf::DtmfDigit;
pub use entity::DialBuffer;
pub use event::CallEvent;
pub use service::CallDomainService;
pub use timer::CallTimer;
pub use value_object::{CallDirection, CallStatus, EndReason, Volume};
