//! Session token issuing port

use crate::domain::session::value_object::{AgentIdentity, SessionToken};
use crate::domain::shared::error::ServiceError;
use async_trait::async_trait;

/// Issues and renews session tokens scoped to an agent.
///
/// Defined in the domain as a port, implemented by the REST client in the
/// infrastructure layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, identity: &AgentIdentity) -> Result<SessionToken, ServiceError>;
}
