use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use super::compress::{caller_hotkey, rejection};
use super::state::AppState;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckCallsResponse {
    pub hotkey: String,
    pub uid: u16,
    pub count: i64,
    pub quota: u32,
    pub calls_remaining: u32,
}

/// Diagnostic read of a caller's counter; does not consume quota
#[instrument(skip(state), level = "debug")]
pub async fn check_limit(
    Path(hotkey): Path<String>,
    State(state): State<AppState>,
) -> Result<axum::Json<CheckCallsResponse>, StatusCode> {
    let record = state
        .admission
        .snapshot()
        .lookup(&hotkey)
        .ok_or(StatusCode::NOT_FOUND)?;
    let count = state
        .admission
        .rate_limiter()
        .current_count(&record)
        .await
        .map_err(|err| {
            event!(
                Level::ERROR,
                message = "Failed reading counter",
                err = format!("{:?}", err)
            );
            StatusCode::SERVICE_UNAVAILABLE
        })?;
    let used = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
    Ok(axum::Json(CheckCallsResponse {
        hotkey,
        uid: record.uid,
        count,
        quota: record.quota,
        calls_remaining: record.quota.saturating_sub(used),
    }))
}

/// Zero every registered caller's counter. Only the miner's own hotkey may
/// ask for this.
#[instrument(skip_all, level = "debug")]
pub async fn reset_counters(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(hotkey) = caller_hotkey(&headers) else {
        return rejection(
            StatusCode::UNAUTHORIZED,
            "missing caller hotkey",
            "unauthenticated",
        );
    };
    if hotkey != state.hotkey.as_str() {
        event!(
            Level::WARN,
            message = "Refused counter reset",
            hotkey = hotkey
        );
        return rejection(
            StatusCode::FORBIDDEN,
            "counter reset is reserved for the miner hotkey",
            "rejected",
        );
    }

    let records = state.admission.snapshot().records();
    let summary = state.admission.rate_limiter().reset_all(records.iter()).await;
    axum::Json(summary).into_response()
}
