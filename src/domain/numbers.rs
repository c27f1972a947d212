//! Originating-number pool

use crate::domain::shared::error::ServiceError;
use crate::domain::shared::value_objects::PhoneNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A number the agent may place calls from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginatingNumber {
    pub number: PhoneNumber,
    pub label: Option<String>,
}

/// Numbers inventory port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NumberInventory: Send + Sync {
    async fn list(&self) -> Result<Vec<OriginatingNumber>, ServiceError>;
}
