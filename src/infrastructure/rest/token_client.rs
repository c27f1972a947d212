//! Session token service client

use super::client::ApiClient;
use crate::domain::session::{AgentIdentity, SessionToken, TokenIssuer};
use crate::domain::shared::error::ServiceError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    /// Lifetime in seconds, when the service reports one
    #[serde(default)]
    expires_in: Option<i64>,
}

impl From<TokenResponse> for SessionToken {
    fn from(r: TokenResponse) -> Self {
        let expires = r.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
        SessionToken::new(r.token, expires)
    }
}

/// `POST /calls/softphone/token`
pub struct HttpTokenIssuer {
    client: ApiClient,
}

impl HttpTokenIssuer {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn issue(&self, identity: &AgentIdentity) -> Result<SessionToken, ServiceError> {
        debug!("Requesting session token for agent {}", identity.agent_id);
        let request = self
            .client
            .request(Method::POST, "/calls/softphone/token")
            .json(identity);
        let response: TokenResponse = self.client.send_json(request).await?;
        Ok(response.into())
    }
}
