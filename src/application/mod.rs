//! Application layer - the softphone call-control core
//!
//! This layer drives the domain objects from a single event loop:
//! - the call controller state machine
//! - the transport session lifecycle and token renewal
//! - timers, the history cache and the report prompt
//! - notifications for the agent UI

pub mod controller;
pub mod error;
pub mod history;
pub mod metrics;
pub mod notification;
pub mod runtime;
pub mod scheduler;
pub mod session;

pub use controller::{CallController, CallInput, CallSnapshot, Effect};
pub use error::{SoftphoneError, SoftphoneResult};
pub use notification::{Notification, NotificationBroadcaster};
pub use runtime::{AgentAction, Softphone, SoftphoneDeps, SoftphoneSettings, SoftphoneState};
