use axum::{Json, http::StatusCode};
use serde::Serialize;

pub const RUNNING_MESSAGE: &str = "App's running!";

#[derive(Debug, Serialize)]
pub struct AppRunning {
    pub success: bool,
    pub message: &'static str,
}

/// GET /test -> liveness probe; independent of auth and database state.
pub async fn app_running() -> (StatusCode, Json<AppRunning>) {
    (
        StatusCode::OK,
        Json(AppRunning {
            success: true,
            message: RUNNING_MESSAGE,
        }),
    )
}
