//! Scheduler controls.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use stagehand_scheduler::QueueStats;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(stats))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
}

async fn stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.scheduler.stats().await?))
}

async fn pause(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    state.scheduler.pause().await?;
    Ok(Json(state.scheduler.stats().await?))
}

async fn resume(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    state.scheduler.resume().await?;
    Ok(Json(state.scheduler.stats().await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{app, json_body, send};
    use axum::http::StatusCode;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pause_resume_and_stats() {
        let app = app(Duration::from_millis(50));

        let (status, stats) =
            json_body(send(&app.router, "GET", "/api/v1/scheduler", None).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["paused"], false);
        assert_eq!(stats["waiting"], 0);

        let (_, stats) =
            json_body(send(&app.router, "POST", "/api/v1/scheduler/pause", None).await).await;
        assert_eq!(stats["paused"], true);
        assert!(app.scheduler.queue().paused());

        let (_, stats) =
            json_body(send(&app.router, "POST", "/api/v1/scheduler/resume", None).await).await;
        assert_eq!(stats["paused"], false);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(Duration::from_millis(50));
        let (status, body) = json_body(send(&app.router, "GET", "/health", None).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
