//! Phone-number inventory client

use super::client::ApiClient;
use crate::domain::numbers::{NumberInventory, OriginatingNumber};
use crate::domain::shared::error::ServiceError;
use crate::domain::shared::value_objects::PhoneNumber;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NumberRow {
    number: String,
    #[serde(default)]
    label: Option<String>,
}

/// `GET /phone-numbers`
pub struct HttpNumberInventory {
    client: ApiClient,
}

impl HttpNumberInventory {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NumberInventory for HttpNumberInventory {
    async fn list(&self) -> Result<Vec<OriginatingNumber>, ServiceError> {
        debug!("Fetching originating number pool");
        let request = self.client.request(Method::GET, "/phone-numbers");
        let rows: Vec<NumberRow> = self.client.send_json(request).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match PhoneNumber::parse(&row.number) {
                Ok(number) => Some(OriginatingNumber {
                    number,
                    label: row.label,
                }),
                Err(_) => {
                    warn!("Skipping blank number in inventory");
                    None
                }
            })
            .collect())
    }
}
