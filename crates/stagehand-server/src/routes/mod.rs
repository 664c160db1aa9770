//! API routes.

pub mod health;
pub mod runners;
pub mod scheduler;
pub mod stages;

use crate::AppState;
use axum::Router;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/stages", stages::router())
        .nest("/scheduler", scheduler::router())
        .merge(runners::router())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use serde_json::Value;
    use stagehand_config::SchedulerConfig;
    use stagehand_core::MemoryStageStore;
    use stagehand_scheduler::QueueScheduler;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::AppState;

    pub struct TestApp {
        pub router: axum::Router,
        pub store: Arc<MemoryStageStore>,
        pub scheduler: Arc<QueueScheduler>,
        pub draining: CancellationToken,
    }

    pub fn app(request_timeout: Duration) -> TestApp {
        let store = Arc::new(MemoryStageStore::new());
        let (state, scheduler) =
            AppState::with_store(store.clone(), &SchedulerConfig::default(), request_timeout);
        let draining = CancellationToken::new();
        TestApp {
            router: super::router(state.with_draining(draining.clone())),
            store,
            scheduler,
            draining,
        }
    }

    pub async fn send(
        router: &axum::Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        router.clone().oneshot(request).await.unwrap()
    }

    pub async fn json_body(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}
