//! Stage endpoints used by producers and by runners reporting back.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use stagehand_core::{NewStage, StageDescriptor, StageId, StageStatus};
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_stage))
        .route("/{id}", get(get_stage))
        .route("/{id}/accept", post(accept_stage))
        .route("/{id}/release", post(release_stage))
        .route("/{id}/status", post(update_status))
}

async fn create_stage(
    State(state): State<AppState>,
    Json(req): Json<NewStage>,
) -> Result<(StatusCode, Json<StageDescriptor>), ApiError> {
    let stage = state.repo.create(req).await?;
    info!(stage_id = %stage.id, build_id = %stage.build_id, "Stage created");
    state.scheduler.schedule(&stage).await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

async fn get_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Json<StageDescriptor>, ApiError> {
    Ok(Json(state.repo.get(id).await?))
}

#[derive(Debug, Deserialize)]
struct AcceptRequest {
    machine: String,
}

async fn accept_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
    Json(req): Json<AcceptRequest>,
) -> Result<Json<StageDescriptor>, ApiError> {
    let stage = state.repo.accept(id, &req.machine).await?;
    info!(stage_id = %id, machine = %req.machine, "Stage accepted");
    Ok(Json(stage))
}

async fn release_stage(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
) -> Result<Json<StageDescriptor>, ApiError> {
    let stage = state.repo.release(id).await?;
    info!(stage_id = %id, "Stage released");
    state.scheduler.schedule(&stage).await?;
    Ok(Json(stage))
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: StageStatus,
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<StageId>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<StageDescriptor>, ApiError> {
    Ok(Json(state.repo.update_status(id, req.status).await?))
}
