//! Health, server info, and the sidecar endpoints

use crate::api::error::{query_params, ApiError, ApiResult};
use crate::api::{succeeded, AppState, Envelope};
use crate::lifecycle::CallbackOutcome;
use crate::system::resources::{get_resource_usage, ResourceUsage};
use crate::system::stats::StatsSnapshot;
use crate::types::model::ModelRecord;
use crate::types::transfer::{TransferCallback, TransferStatus};
use axum::{
    extract::rejection::QueryRejection,
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
pub struct ServerInfo {
    pub env_slug: String,
    pub version: &'static str,
    pub start_time: DateTime<Utc>,
    pub runtime_info: StatsSnapshot,
    pub resources: ResourceUsage,
    pub models: Vec<ModelRecord>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    pub api_secret: String,
    pub sidecar_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub model_id: String,
    #[serde(default)]
    pub model_name: String,
    pub status: TransferStatus,
    pub secret: String,
}

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "HealthStatus": "UP",
        "time": Utc::now(),
        "operation": "healthcheck",
        "status": "succeeded",
    }))
}

pub async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    let lifecycle = &state.lifecycle;
    Json(ServerInfo {
        env_slug: lifecycle.env_slug().to_string(),
        version: env!("CARGO_PKG_VERSION"),
        start_time: state.started_at,
        runtime_info: lifecycle.stats().snapshot(),
        resources: get_resource_usage(),
        models: lifecycle.loaded_models(),
    })
}

pub async fn register_sidecar(
    State(state): State<AppState>,
    params: Result<Query<RegisterParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<Value>>> {
    let params = query_params("registersc", params)?;
    state
        .lifecycle
        .register_sidecar(&params.api_secret, &params.sidecar_id)
        .map_err(ApiError::during("registersc"))?;
    Ok(succeeded("registersc", json!({})))
}

pub async fn transfer_callback(
    State(state): State<AppState>,
    params: Result<Query<CallbackParams>, QueryRejection>,
) -> ApiResult<Json<Envelope<CallbackOutcome>>> {
    let params = query_params("callback", params)?;
    let callback = TransferCallback {
        model_id: params.model_id,
        model_name: params.model_name,
        status: params.status,
        secret: params.secret,
    };
    let outcome = state
        .lifecycle
        .handle_transfer_callback(callback)
        .await
        .map_err(ApiError::during("callback"))?;
    Ok(succeeded("callback", outcome))
}
