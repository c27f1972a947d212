//! Call history model
//!
//! Read-only view of completed calls kept by the back office. The softphone
//! only lists it and asks for a refresh after every call.

use crate::domain::call::value_object::CallDirection;
use crate::domain::shared::error::ServiceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the call history table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallHistoryEntry {
    /// Provider call id
    pub call_id: String,
    pub direction: CallDirection,
    pub from: String,
    pub to: String,
    /// Final status as recorded by the back office
    pub status: String,
    /// Talk time in seconds
    pub duration: Option<i64>,
    /// Agent annotation, if one was submitted
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filters for history queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryFilters {
    /// Restrict to calls placed from / received on this number
    pub number: Option<String>,
    pub direction: Option<CallDirection>,
}

/// One page of history; pages are 1-based
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub filters: HistoryFilters,
    pub page: u32,
    pub page_size: u32,
}

impl HistoryQuery {
    pub fn first_page(filters: HistoryFilters, page_size: u32) -> Self {
        Self {
            filters,
            page: 1,
            page_size,
        }
    }

    /// True if a call made from `number` can show up in this query
    pub fn covers_number(&self, number: &str) -> bool {
        match &self.filters.number {
            Some(filter) => filter == number,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub entries: Vec<CallHistoryEntry>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Call history service port
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CallHistoryRepository: Send + Sync {
    /// Fetch one page of history
    async fn list(&self, query: &HistoryQuery) -> Result<HistoryPage, ServiceError>;
}
