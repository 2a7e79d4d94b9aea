//! HTTP surface
//!
//! All routes live under `/api/v1`. Successful model operations answer with
//! `{operation, status, ...}`; failures use the same envelope with `err_message`
//! and `err_detail`.

pub mod error;
pub mod internal;
pub mod jobs;
pub mod models;

use crate::jobs::AsyncJobManager;
use crate::lifecycle::LifecycleManager;
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest model archive accepted by the upload endpoint
pub const MAX_ARCHIVE_BYTES: usize = 1024 * 1024 * 1024;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub jobs: AsyncJobManager,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleManager>, jobs: AsyncJobManager) -> Self {
        Self {
            lifecycle,
            jobs,
            started_at: Utc::now(),
        }
    }
}

/// Success envelope around an operation result
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub operation: &'static str,
    pub status: &'static str,
    #[serde(flatten)]
    pub body: T,
}

pub(crate) fn succeeded<T: Serialize>(operation: &'static str, body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        operation,
        status: "succeeded",
        body,
    })
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/healthcheck", get(internal::health_check))
        .route("/serverinfo", get(internal::server_info))
        .route("/loadmodel/:model_id", get(models::load_model))
        .route("/uploadmodel/oss", post(models::upload_from_object_store))
        .route("/uploadmodel/callback", post(internal::transfer_callback))
        .route(
            "/uploadmodel/:model_id",
            post(models::upload_model).layer(DefaultBodyLimit::max(MAX_ARCHIVE_BYTES)),
        )
        .route("/removemodel/:model_id", delete(models::remove_model))
        .route("/getmodelinfo/:model_id", get(models::get_model_info))
        .route("/listmodels", get(models::list_models))
        .route("/score", post(models::score))
        .route("/registersc", post(internal::register_sidecar))
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/:job_id", get(jobs::get_job));

    Router::new()
        .nest("/api/v1", v1)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
