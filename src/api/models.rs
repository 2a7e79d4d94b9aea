//! Model lifecycle endpoints

use crate::api::error::{json_body, query_params, ApiError, ApiResult};
use crate::api::{succeeded, AppState, Envelope};
use crate::error::ServiceError;
use crate::lifecycle::{InferOutcome, LoadOutcome, RemoveOutcome, TransferAccepted};
use crate::types::model::{LifecycleState, ListModelsQuery, ModelMetadata};
use crate::types::transfer::ObjectStoreUpload;
use axum::{
    body::Bytes,
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_LIST_LIMIT: u32 = 400;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub model_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub compartment_id: String,
    pub project_id: String,
    pub no_of_models: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreParams {
    pub model_id: String,
}

pub async fn load_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<Envelope<LoadOutcome>>> {
    let outcome = state
        .lifecycle
        .load(&model_id)
        .await
        .map_err(ApiError::during("load"))?;
    Ok(succeeded("load", outcome))
}

pub async fn upload_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
    params: Result<Query<UploadParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<Envelope<LoadOutcome>>> {
    let params = query_params("upload", params)?;
    let outcome = state
        .lifecycle
        .upload(&model_id, body.to_vec(), params.model_name.as_deref())
        .await
        .map_err(ApiError::during("upload"))?;
    Ok(succeeded("upload", outcome))
}

pub async fn upload_from_object_store(
    State(state): State<AppState>,
    body: Result<Json<ObjectStoreUpload>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Envelope<TransferAccepted>>)> {
    let upload = json_body("upload", body)?;
    let accepted = state
        .lifecycle
        .upload_from_object_store(upload)
        .await
        .map_err(ApiError::during("upload"))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(Envelope {
            operation: "upload",
            status: "ACCEPTED",
            body: accepted,
        }),
    ))
}

pub async fn remove_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<Envelope<RemoveOutcome>>> {
    let outcome = state
        .lifecycle
        .remove(&model_id)
        .await
        .map_err(ApiError::during("remove"))?;
    Ok(succeeded("remove", outcome))
}

/// Runtime descriptor of the model, as stored in its artifact
pub async fn get_model_info(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let runtime = state
        .lifecycle
        .get_metadata(&model_id)
        .await
        .map_err(ApiError::during("getmodelinfo"))?;
    Ok(Json(runtime))
}

pub async fn list_models(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<Vec<ModelMetadata>>> {
    let params = query_params("listmodels", params)?;
    let query = ListModelsQuery {
        compartment_id: params.compartment_id,
        project_id: params.project_id,
        lifecycle_state: LifecycleState::Active,
        limit: params.no_of_models.unwrap_or(DEFAULT_LIST_LIMIT),
    };
    let models = state
        .lifecycle
        .list_models(&query)
        .await
        .map_err(ApiError::during("listmodels"))?;
    Ok(Json(models))
}

/// Body is read raw so an empty or malformed payload gets the usual error envelope
pub async fn score(
    State(state): State<AppState>,
    params: Result<Query<ScoreParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<Envelope<InferOutcome>>> {
    let params = query_params("score", params)
        .inspect_err(|_| state.lifecycle.stats().record_failed_request())?;
    let payload: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            state.lifecycle.stats().record_failed_request();
            ApiError::new(
                "score",
                ServiceError::BadRequest(format!("Request body is not valid JSON: {}", e)),
            )
        })?
    };
    let outcome = state
        .lifecycle
        .infer(&params.model_id, payload)
        .await
        .map_err(ApiError::during("score"))?;
    Ok(succeeded("score", outcome))
}
