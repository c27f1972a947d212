//! Post-call reporting
//!
//! A human-terminated call opens a blocking annotation prompt keyed by the
//! provider call id. The transport may signal disconnect, cancel and reject
//! for the same call; the ledger makes sure only the first one opens a prompt.

use crate::domain::shared::error::{DomainError, ServiceError};
use crate::domain::shared::value_objects::{PhoneNumber, ProviderCallId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Prompt asking the agent to annotate a finished call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPrompt {
    pub provider_call_id: ProviderCallId,
    pub originating_number: PhoneNumber,
}

/// Comment the agent submits for a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReport {
    pub provider_call_id: ProviderCallId,
    pub comment: String,
    pub originating_number: PhoneNumber,
}

impl CallReport {
    pub fn for_prompt(prompt: &ReportPrompt, comment: &str) -> Result<Self, DomainError> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(DomainError::ValidationError(
                "report comment must not be empty".to_string(),
            ));
        }
        Ok(Self {
            provider_call_id: prompt.provider_call_id.clone(),
            comment: comment.to_string(),
            originating_number: prompt.originating_number.clone(),
        })
    }
}

/// Remembers which calls already had their prompt opened
#[derive(Debug, Default)]
pub struct ReportLedger {
    opened: HashSet<ProviderCallId>,
}

impl ReportLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a prompt the first time a call id is seen, `None` afterwards
    pub fn open(
        &mut self,
        provider_call_id: &ProviderCallId,
        originating_number: &PhoneNumber,
    ) -> Option<ReportPrompt> {
        if !self.opened.insert(provider_call_id.clone()) {
            return None;
        }
        Some(ReportPrompt {
            provider_call_id: provider_call_id.clone(),
            originating_number: originating_number.clone(),
        })
    }

    pub fn was_opened(&self, provider_call_id: &ProviderCallId) -> bool {
        self.opened.contains(provider_call_id)
    }
}

/// Reporting service port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    async fn submit(&self, report: &CallReport) -> Result<(), ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_opens_once_per_call() {
        let mut ledger = ReportLedger::new();
        let id = ProviderCallId::new("CA1");
        let number = PhoneNumber::parse("+15559876543").unwrap();

        let prompt = ledger.open(&id, &number).unwrap();
        assert_eq!(prompt.provider_call_id, id);
        assert!(ledger.open(&id, &number).is_none());
        assert!(ledger.open(&id, &number).is_none());
        assert!(ledger.was_opened(&id));

        assert!(ledger.open(&ProviderCallId::new("CA2"), &number).is_some());
    }

    #[test]
    fn test_report_requires_comment() {
        let prompt = ReportPrompt {
            provider_call_id: ProviderCallId::new("CA1"),
            originating_number: PhoneNumber::parse("+15559876543").unwrap(),
        };
        assert!(CallReport::for_prompt(&prompt, "   ").is_err());

        let report = CallReport::for_prompt(&prompt, " interested, call back ").unwrap();
        assert_eq!(report.comment, "interested, call back");
        assert_eq!(report.provider_call_id.as_str(), "CA1");
    }
}
