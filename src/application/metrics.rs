//! Softphone metrics recorders
//!
//! Names are described and exported by the Prometheus handler in the API layer.

use crate::domain::call::CallEvent;
use metrics::{counter, gauge, histogram};

/// Publish one call domain event
pub fn record_call_event(event: &CallEvent) {
    match event {
        CallEvent::Created(created) => {
            counter!("softphone_calls_total", "direction" => created.direction.as_str())
                .increment(1);
        }
        CallEvent::StatusChanged(changed) => {
            counter!("softphone_call_transitions_total", "to" => changed.to.as_str()).increment(1);
        }
        CallEvent::MuteChanged(changed) => {
            counter!("softphone_mute_changes_total", "muted" => changed.muted.to_string())
                .increment(1);
        }
        CallEvent::Ended(ended) => {
            counter!("softphone_calls_ended_total", "reason" => ended.reason.as_str()).increment(1);
            if let Some(seconds) = ended.duration_seconds {
                histogram!("softphone_call_duration_seconds").record(seconds as f64);
            }
        }
    }
}

/// Record a token renewal attempt outcome
pub fn record_token_renewal(success: bool) {
    counter!("softphone_token_renewals_total", "success" => success.to_string()).increment(1);
}

/// Record a report submission outcome
pub fn record_report_submitted(success: bool) {
    counter!("softphone_reports_submitted_total", "success" => success.to_string()).increment(1);
}

/// Update the registration gauge
pub fn update_session_registered(registered: bool) {
    gauge!("softphone_session_registered").set(if registered { 1.0 } else { 0.0 });
}
