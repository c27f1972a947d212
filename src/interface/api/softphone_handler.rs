//! Softphone API handlers

use super::softphone_dto::{
    ApiResponse, DialRequest, DigitsRequest, HealthResponse, HistoryParams, ReportRequest,
    VolumeRequest,
};
use crate::application::{CallSnapshot, Softphone, SoftphoneError, SoftphoneResult, SoftphoneState};
use crate::domain::history::HistoryPage;
use crate::domain::numbers::OriginatingNumber;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub softphone: Softphone,
    pub history_page_size: u32,
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn status_for(err: &SoftphoneError) -> StatusCode {
    match err {
        SoftphoneError::Validation(_) => StatusCode::BAD_REQUEST,
        SoftphoneError::InvalidState(_) => StatusCode::CONFLICT,
        SoftphoneError::SessionUnavailable(_) | SoftphoneError::SessionClosed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        SoftphoneError::Service(_)
        | SoftphoneError::ReportSubmission(_)
        | SoftphoneError::TokenRenewal(_)
        | SoftphoneError::SessionInit(_)
        | SoftphoneError::CallSetup(_) => StatusCode::BAD_GATEWAY,
        SoftphoneError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(result: SoftphoneResult<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::success(data))),
        Err(e) => {
            warn!("API: {}", e);
            (status_for(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let session = state
        .softphone
        .state()
        .await
        .ok()
        .map(|s| s.session.status.to_string());
    Json(ApiResponse::success(HealthResponse {
        status: "OK".to_string(),
        session,
    }))
}

/// Get the full softphone state
pub async fn get_state(State(state): State<AppState>) -> ApiResult<SoftphoneState> {
    respond(state.softphone.state().await)
}

pub async fn dial(
    State(state): State<AppState>,
    Json(request): Json<DialRequest>,
) -> ApiResult<CallSnapshot> {
    info!("API: Dial {} from {:?}", request.destination, request.from);
    respond(state.softphone.dial(request.destination, request.from).await)
}

pub async fn answer(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.answer().await)
}

pub async fn reject(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.reject().await)
}

pub async fn hangup(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.hangup().await)
}

pub async fn toggle_mute(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.toggle_mute().await)
}

pub async fn toggle_hold(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.toggle_hold().await)
}

pub async fn set_volume(
    State(state): State<AppState>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<CallSnapshot> {
    respond(state.softphone.set_volume(request.level).await)
}

/// Press keypad digits in order, stopping at the first rejected one
pub async fn press_digits(
    State(state): State<AppState>,
    Json(request): Json<DigitsRequest>,
) -> ApiResult<CallSnapshot> {
    if request.digits.is_empty() {
        return respond(Err(SoftphoneError::Validation(
            "no digits given".to_string(),
        )));
    }
    let mut last = Err(SoftphoneError::Internal("no digits pressed".to_string()));
    for digit in request.digits.chars() {
        last = state.softphone.press_digit(digit).await;
        if last.is_err() {
            break;
        }
    }
    respond(last)
}

pub async fn backspace(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.backspace().await)
}

pub async fn clear_dial_buffer(State(state): State<AppState>) -> ApiResult<CallSnapshot> {
    respond(state.softphone.clear_dial_buffer().await)
}

pub async fn submit_report(
    State(state): State<AppState>,
    Json(request): Json<ReportRequest>,
) -> ApiResult<()> {
    respond(state.softphone.submit_report(request.comment).await)
}

pub async fn dismiss_report(State(state): State<AppState>) -> ApiResult<()> {
    respond(state.softphone.dismiss_report().await)
}

pub async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ApiResult<HistoryPage> {
    let query = params.into_query(state.history_page_size);
    info!(
        "API: Listing call history (page: {}, number: {:?})",
        query.page, query.filters.number
    );
    respond(state.softphone.history(query).await)
}

pub async fn list_numbers(State(state): State<AppState>) -> ApiResult<Vec<OriginatingNumber>> {
    respond(state.softphone.numbers().await)
}
