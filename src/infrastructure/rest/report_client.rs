//! Post-call report submission client

use super::client::ApiClient;
use crate::domain::report::{CallReport, ReportSubmitter};
use crate::domain::shared::error::ServiceError;
use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddCommentRequest<'a> {
    call_id: &'a str,
    comment: &'a str,
    twilio_number: &'a str,
}

impl<'a> From<&'a CallReport> for AddCommentRequest<'a> {
    fn from(report: &'a CallReport) -> Self {
        Self {
            call_id: report.provider_call_id.as_str(),
            comment: &report.comment,
            twilio_number: report.originating_number.as_str(),
        }
    }
}

/// `POST /record-calls/add-comment`
pub struct HttpReportSubmitter {
    client: ApiClient,
}

impl HttpReportSubmitter {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReportSubmitter for HttpReportSubmitter {
    async fn submit(&self, report: &CallReport) -> Result<(), ServiceError> {
        debug!("Submitting comment for call {}", report.provider_call_id);
        let request = self
            .client
            .request(Method::POST, "/record-calls/add-comment")
            .json(&AddCommentRequest::from(report));
        self.client.send(request).await?;
        Ok(())
    }
}
