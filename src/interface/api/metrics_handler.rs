//! Prometheus metrics handler

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and describe the softphone metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "softphone_calls_total",
        "Total number of calls started, by direction"
    );
    describe_counter!(
        "softphone_calls_ended_total",
        "Total number of calls ended, by reason"
    );
    describe_counter!(
        "softphone_call_transitions_total",
        "Total number of call status transitions, by target status"
    );
    describe_counter!(
        "softphone_mute_changes_total",
        "Total number of agent mute toggles"
    );
    describe_histogram!(
        "softphone_call_duration_seconds",
        Unit::Seconds,
        "Duration of answered calls"
    );
    describe_counter!(
        "softphone_token_renewals_total",
        "Total number of session token renewals"
    );
    describe_counter!(
        "softphone_reports_submitted_total",
        "Total number of post-call report submissions"
    );
    describe_gauge!(
        "softphone_session_registered",
        "1 while the transport session is registered"
    );

    Ok(handle)
}

/// HTTP metrics handler
pub async fn metrics_handler(
    axum::extract::State(prometheus_handle): axum::extract::State<PrometheusHandle>,
) -> Response {
    let metrics = prometheus_handle.render();
    (StatusCode::OK, metrics).into_response()
}
