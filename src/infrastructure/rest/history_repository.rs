//! HTTP implementation of the call history repository

use super::client::ApiClient;
use crate::domain::call::CallDirection;
use crate::domain::history::{CallHistoryEntry, CallHistoryRepository, HistoryPage, HistoryQuery};
use crate::domain::shared::error::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRow {
    call_sid: String,
    direction: String,
    from: String,
    to: String,
    status: String,
    #[serde(default)]
    duration: Option<i64>,
    #[serde(default)]
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for CallHistoryEntry {
    fn from(r: HistoryRow) -> Self {
        CallHistoryEntry {
            call_id: r.call_sid,
            direction: match r.direction.as_str() {
                "inbound" => CallDirection::Inbound,
                _ => CallDirection::Outbound,
            },
            from: r.from,
            to: r.to,
            status: r.status,
            duration: r.duration,
            comment: r.comment,
            created_at: r.created_at,
        }
    }
}

#[derive(Deserialize)]
struct HistoryResponse {
    data: Vec<HistoryRow>,
    #[serde(default)]
    total: Option<i64>,
}

/// `GET /record-calls/history`
pub struct HttpCallHistoryRepository {
    client: ApiClient,
}

impl HttpCallHistoryRepository {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

fn query_params(query: &HistoryQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page.to_string()),
        ("limit", query.page_size.to_string()),
    ];
    if let Some(number) = &query.filters.number {
        params.push(("number", number.clone()));
    }
    if let Some(direction) = query.filters.direction {
        params.push(("direction", direction.as_str().to_string()));
    }
    params
}

#[async_trait]
impl CallHistoryRepository for HttpCallHistoryRepository {
    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage, ServiceError> {
        debug!(
            "Fetching call history page {} (number: {:?})",
            query.page, query.filters.number
        );
        let request = self
            .client
            .request(Method::GET, "/record-calls/history")
            .query(&query_params(query));
        let response: HistoryResponse = self.client.send_json(request).await?;

        let entries: Vec<CallHistoryEntry> = response.data.into_iter().map(Into::into).collect();
        Ok(HistoryPage {
            total: response.total.unwrap_or(entries.len() as i64),
            entries,
            page: query.page,
            page_size: query.page_size,
        })
    }
}
