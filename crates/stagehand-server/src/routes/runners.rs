//! Runner long-poll endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use stagehand_core::{CapabilityFilter, Error};
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/request", post(request_stage))
}

/// Hold the request open until a matching stage is assigned.
///
/// Answers `204 No Content` when the server-side wait runs out so the runner
/// can simply ask again, and `503` once the server is draining. If the client
/// disconnects first, the worker is dropped from the queue along with this
/// handler. A stage is only claimed by `accept`, so an abandoned offer stays
/// eligible.
async fn request_stage(
    State(state): State<AppState>,
    Json(filter): Json<CapabilityFilter>,
) -> Result<Response, ApiError> {
    let request = state
        .scheduler
        .request_timeout(filter, state.request_timeout);
    let result = tokio::select! {
        result = request => result,
        _ = state.draining.cancelled() => {
            debug!("Runner request ended by shutdown");
            return Err(ApiError::Unavailable("server is shutting down".to_string()));
        }
    };

    match result {
        Ok(assignment) => Ok(Json(assignment).into_response()),
        Err(Error::Timeout(_)) => {
            debug!("Runner request timed out without a stage");
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Err(e) => Err(e.into()),
    }
}
