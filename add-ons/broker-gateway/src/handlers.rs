//! OSB v2 route handlers (spec §6): thin JSON/HTTP shims over [`BrokerFacade`]. All policy lives
//! in `broker-core`; these functions only decode the request, extract the correlation id and
//! principal, and translate the facade's result into the OSB wire shape.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::{OsbState, Principal, ProvisionResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::HttpError;
use crate::state::AppState;

fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Deserialize)]
pub struct AcceptsIncomplete {
    #[serde(default)]
    pub accepts_incomplete: bool,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn catalog(State(state): State<Arc<AppState>>) -> Result<Response, HttpError> {
    let services = state.facade.services(&correlation_id()).await?;
    Ok(Json(serde_json::json!({ "services": services })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ProvisionRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ProvisionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    dashboard_url: Option<String>,
}

pub async fn provision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(opts): Query<AcceptsIncomplete>,
    principal: Option<Extension<Principal>>,
    Json(body): Json<ProvisionRequest>,
) -> Result<Response, HttpError> {
    let result = state
        .facade
        .provision(&correlation_id(), &instance_id, &body.plan_id, body.parameters, opts.accepts_incomplete, principal.map(|Extension(p)| p))
        .await?;

    let status = match result {
        ProvisionResult::Created(_) => StatusCode::CREATED,
        ProvisionResult::AlreadyExists => StatusCode::OK,
    };
    Ok((status, Json(ProvisionResponse { dashboard_url: None })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DeprovisionQuery {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
}

pub async fn deprovision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<DeprovisionQuery>,
) -> Result<Response, HttpError> {
    state.facade.deprovision(&correlation_id(), &instance_id, &query.plan_id).await?;
    Ok(Json(serde_json::json!({})).into_response())
}

pub async fn get_instance(State(state): State<Arc<AppState>>, Path(instance_id): Path<String>) -> Result<Response, HttpError> {
    let instance = state.facade.get_instance(&correlation_id(), &instance_id).await?;
    Ok(Json(serde_json::json!({
        "service_id": instance.service_id,
        "plan_id": instance.plan_id,
        "parameters": instance.parameters,
    }))
    .into_response())
}

#[derive(Debug, Deserialize)]
pub struct LastOperationQuery {
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
struct LastOperationBody {
    state: &'static str,
    description: String,
}

pub async fn last_operation(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<LastOperationQuery>,
) -> Result<Response, HttpError> {
    let result = state.facade.last_operation(&correlation_id(), &instance_id, &query.plan_id).await?;
    let state_str = match result.state {
        OsbState::Succeeded => "succeeded",
        OsbState::InProgress => "in progress",
        OsbState::Failed => "failed",
    };
    Ok(Json(LastOperationBody { state: state_str, description: result.description }).into_response())
}

#[derive(Debug, Deserialize)]
pub struct BindQuery {
    #[serde(default)]
    pub plan_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BindRequest {
    #[serde(default)]
    pub plan_id: String,
}

pub async fn bind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<BindQuery>,
    Json(body): Json<BindRequest>,
) -> Result<Response, HttpError> {
    let plan_id = if body.plan_id.is_empty() { query.plan_id } else { body.plan_id };
    let credentials = state.facade.bind(&correlation_id(), &instance_id, &binding_id, &plan_id).await?;
    Ok(Json(serde_json::json!({ "credentials": credentials })).into_response())
}

pub async fn unbind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<BindQuery>,
) -> Result<Response, HttpError> {
    state.facade.unbind(&correlation_id(), &instance_id, &binding_id, &query.plan_id).await?;
    Ok(Json(serde_json::json!({})).into_response())
}

pub async fn get_binding(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let credentials = state.facade.get_binding(&correlation_id(), &instance_id, &binding_id).await?;
    Ok(Json(serde_json::json!({ "credentials": credentials })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub service_id: String,
    pub plan_id: String,
    #[serde(default)]
    pub previous_values: Option<PreviousValues>,
}

#[derive(Debug, Deserialize)]
pub struct PreviousValues {
    #[serde(default)]
    pub plan_id: String,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Json(body): Json<UpdateRequest>,
) -> Result<Response, HttpError> {
    let old_plan_id = body.previous_values.map(|v| v.plan_id).unwrap_or_default();
    state.facade.update(&correlation_id(), &instance_id, &body.service_id, &old_plan_id, &body.plan_id).await?;
    Ok(Json(serde_json::json!({})).into_response())
}
