mod base;
mod compress;
mod rate_limits;
mod state;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, extract::DefaultBodyLimit, http::StatusCode,
    response::IntoResponse, routing, Router,
};
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

pub use base::{AboutResponse, StatusResponse};
pub use compress::{TextCompressRequest, TextCompressResponse};
pub use rate_limits::CheckCallsResponse;
pub use state::AppState;

use crate::error::Result;

/// Largest request body accepted, in bytes
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Requests in flight before new ones are shed
pub const MAX_IN_FLIGHT: usize = 1024;

/// Build the axon API around the shared admission and processing state
pub async fn api(state: AppState) -> Result<Router> {
    let request_timeout = state.request_timeout();

    let api = Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::base::STATUS, routing::get(base::status))
        // Served request type
        .route(paths::TEXT_COMPRESS, routing::post(compress::text_compress))
        // Counter diagnostics and maintenance
        .route(paths::rate_limits::CHECK, routing::get(rate_limits::check_limit))
        .route(paths::rate_limits::RESET, routing::post(rate_limits::reset_counters))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .concurrency_limit(MAX_IN_FLIGHT)
                .timeout(request_timeout),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(api)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
