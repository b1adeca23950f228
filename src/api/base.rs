use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::state::AppState;
use crate::cli::{APP_NAME, APP_VERSION};
use crate::service::ServiceState;

// basic handler that responds with a static string
pub async fn root() -> &'static str {
    "Welcome to condense-miner"
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    name: String,
    version: String,
}

impl Default for AboutResponse {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: APP_VERSION.to_string(),
        }
    }
}

#[instrument]
pub async fn about() -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse::default())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub state: ServiceState,
    pub hotkey: String,
    pub uid: Option<u16>,
    pub block: u64,
    pub callers: usize,
    pub snapshot_age_ms: Option<i64>,
}

#[instrument(skip(state), level = "debug")]
pub async fn status(State(state): State<AppState>) -> axum::Json<StatusResponse> {
    let snapshot = state.admission.snapshot().current();
    let age = (snapshot.refreshed_at_ms > 0)
        .then(|| chrono::Utc::now().timestamp_millis() - snapshot.refreshed_at_ms);
    axum::Json(StatusResponse {
        state: *state.status.borrow(),
        uid: snapshot.lookup(&state.hotkey).map(|r| r.uid),
        hotkey: state.hotkey.clone(),
        block: snapshot.block,
        callers: snapshot.len(),
        snapshot_age_ms: age,
    })
}
