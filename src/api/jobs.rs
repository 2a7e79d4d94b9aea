//! Async job endpoints

use crate::api::error::{json_body, ApiError, ApiResult};
use crate::api::AppState;
use crate::jobs::JobLookup;
use crate::types::job::JobSpec;
use axum::{
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};

pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<JobSpec>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let spec = json_body("submit", body)?;
    let job = state
        .jobs
        .submit(spec)
        .await
        .map_err(ApiError::during("submit"))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "operation": "submit",
            "status": job.status,
            "job_id": job.job_id,
        })),
    ))
}

/// Unknown ids answer 200 with a `db_msg` body
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobLookup>> {
    let lookup = state
        .jobs
        .get_status(&job_id)
        .await
        .map_err(ApiError::during("status"))?;
    Ok(Json(lookup))
}
