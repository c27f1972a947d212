//! Session bounded context - the agent's registered transport session

pub mod issuer;
pub mod value_object;

pub use issuer::TokenIssuer;
pub use value_object::{AgentIdentity, SessionStatus, SessionToken};
