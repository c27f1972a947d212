//! Session value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The agent the session is scoped to; fixed for the session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent_name: String,
}

impl AgentIdentity {
    pub fn new(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
        }
    }
}

/// Registration status of the transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Unregistered,
    Registering,
    Registered,
    /// Token issuance or registration failed; the operator must restart
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unregistered => "unregistered",
            SessionStatus::Registering => "registering",
            SessionStatus::Registered => "registered",
            SessionStatus::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short-lived access token for the signaling backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    value: String,
    /// Best-effort expiry; the transport's own warning is authoritative
    expires_approx: Option<DateTime<Utc>>,
}

impl SessionToken {
    pub fn new(value: impl Into<String>, expires_approx: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_approx,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_approx(&self) -> Option<&DateTime<Utc>> {
        self.expires_approx.as_ref()
    }
}

// Keep the secret out of logs
impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &"<redacted>")
            .field("expires_approx", &self.expires_approx)
            .finish()
    }
}
