//! API Router configuration

use super::metrics_handler::metrics_handler;
use super::softphone_handler::{
    answer, backspace, clear_dial_buffer, dial, dismiss_report, get_state, health_check, hangup,
    list_history, list_numbers, press_digits, reject, set_volume, submit_report, toggle_hold,
    toggle_mute, AppState,
};
use super::ws_handler::ws_handler;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router
pub fn build_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    // Call control
    let call_routes = Router::new()
        .route("/softphone/state", get(get_state))
        .route("/softphone/dial", post(dial))
        .route("/softphone/answer", post(answer))
        .route("/softphone/reject", post(reject))
        .route("/softphone/hangup", post(hangup))
        .route("/softphone/mute", post(toggle_mute))
        .route("/softphone/hold", post(toggle_hold))
        .route("/softphone/volume", post(set_volume))
        .route("/softphone/digits", post(press_digits))
        .route("/softphone/dial-buffer/backspace", post(backspace))
        .route("/softphone/dial-buffer/clear", post(clear_dial_buffer));

    // Reporting, history and number pool
    let record_routes = Router::new()
        .route("/softphone/report", post(submit_report))
        .route("/softphone/report/dismiss", post(dismiss_report))
        .route("/softphone/history", get(list_history))
        .route("/softphone/numbers", get(list_numbers));

    let ws_routes = Router::new().route("/softphone/events", get(ws_handler));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    Router::new()
        .merge(health_routes)
        .merge(call_routes)
        .merge(record_routes)
        .merge(ws_routes)
        .with_state(state)
        .merge(metrics_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
