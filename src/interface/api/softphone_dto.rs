//! Softphone API DTOs

use crate::domain::call::CallDirection;
use crate::domain::history::{HistoryFilters, HistoryQuery};
use serde::{Deserialize, Serialize};

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Dial request
#[derive(Debug, Deserialize)]
pub struct DialRequest {
    #[serde(default)]
    pub destination: String,
    /// Selected originating number
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub level: u8,
}

/// Keypad input; each character is pressed in order
#[derive(Debug, Deserialize)]
pub struct DigitsRequest {
    pub digits: String,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub comment: String,
}

/// Query parameters for the history table
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub number: Option<String>,
    pub direction: Option<CallDirection>,
    #[serde(default = "default_page")]
    pub page: u32,
    pub page_size: Option<u32>,
}

fn default_page() -> u32 {
    1
}

impl HistoryParams {
    pub fn into_query(self, default_page_size: u32) -> HistoryQuery {
        HistoryQuery {
            filters: HistoryFilters {
                number: self.number.filter(|n| !n.trim().is_empty()),
                direction: self.direction,
            },
            page: self.page.max(1),
            page_size: self.page_size.unwrap_or(default_page_size),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub session: Option<String>,
}
