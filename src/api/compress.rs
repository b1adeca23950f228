use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{event, info, instrument, Level};

use super::paths;
use super::state::AppState;
use crate::admission::{AdmissionDecision, RejectReason};
use crate::error::MinerError;
use crate::processor::CompressionJob;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TextCompressRequest {
    #[serde(default)]
    pub id: String,
    pub context: String,
    /// Missing or non-positive means the configured default
    #[serde(default)]
    pub compress_rate: Option<f32>,
    #[serde(default)]
    pub forced_tokens: Option<Vec<String>>,
    #[serde(default)]
    pub user_message: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TextCompressResponse {
    pub id: String,
    pub compressed_context: String,
    pub compress_rate: f32,
    pub elapsed_ms: u64,
}

fn reject_status(reason: RejectReason) -> StatusCode {
    match reason {
        RejectReason::Unregistered | RejectReason::StakeTooLow => StatusCode::FORBIDDEN,
        RejectReason::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
    }
}

pub(super) fn rejection(status: StatusCode, message: &str, kind: &str) -> Response {
    let body = json!({
        "error": {
            "code": status.as_u16(),
            "message": message,
            "type": kind,
        }
    });
    (status, Json(body)).into_response()
}

/// The non-empty hotkey a caller signed the request with
pub(super) fn caller_hotkey(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(paths::CALLER_HOTKEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

#[instrument(skip_all, level = "debug")]
pub async fn text_compress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<TextCompressRequest>,
) -> Response {
    let Some(hotkey) = caller_hotkey(&headers) else {
        return rejection(
            StatusCode::UNAUTHORIZED,
            "missing caller hotkey",
            "unauthenticated",
        );
    };

    let rate = request
        .compress_rate
        .filter(|r| *r > 0.0)
        .unwrap_or(state.compression.default_compress_rate);
    if rate > 1.0 || rate.is_nan() {
        return MinerError::Api(format!("compress_rate {} outside 0.0..=1.0", rate)).into_response();
    }

    let record = match state.admission.admit(hotkey).await {
        AdmissionDecision::Admit { record, .. } => record,
        AdmissionDecision::Reject(reason) => {
            event!(
                Level::DEBUG,
                message = "Blacklisted request",
                hotkey = hotkey,
                reason = reason.as_str()
            );
            return rejection(reject_status(reason), reason.as_str(), "rejected");
        }
    };

    let forced_tokens = request
        .forced_tokens
        .unwrap_or_else(|| state.compression.default_forced_tokens.clone());
    info!(
        "Forwarding text compress for uid {}: context length {}",
        record.uid,
        request.context.len()
    );

    let job = CompressionJob {
        context: request.context,
        rate,
        forced_tokens,
    };
    match state.processor.process(job).await {
        Ok(output) => Json(TextCompressResponse {
            id: request.id,
            compressed_context: output.compressed_context,
            compress_rate: rate,
            elapsed_ms: output.elapsed.as_millis() as u64,
        })
        .into_response(),
        Err(err) => {
            event!(
                Level::ERROR,
                message = "Compression failed",
                uid = record.uid,
                err = format!("{}", err)
            );
            err.into_response()
        }
    }
}
