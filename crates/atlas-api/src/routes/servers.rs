use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;

use atlas_infra::types::{Server, ServerId, ServerMetrics};

use crate::audit::{AuditAction, AuditEntry};
use crate::dto::{CreateServerRequest, MessageResponse, MetricsParams, UpdateServerRequest};
use crate::error::ApiError;
use crate::state::AppState;

pub async fn list_servers(State(state): State<AppState>) -> Result<Json<Vec<Server>>, ApiError> {
    let servers = state.servers.list().await?;
    Ok(Json(servers))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let id = ServerId::parse(&id)?;
    let server = state.servers.get(id).await?;
    Ok(Json(server))
}

pub async fn create_server(
    State(state): State<AppState>,
    payload: Result<Json<CreateServerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Server>), ApiError> {
    let Json(req) = payload?;

    let server = state.servers.create(req.into()).await?;
    state
        .audit
        .record(AuditEntry::new(AuditAction::Create, &server));

    Ok((StatusCode::CREATED, Json(server)))
}

pub async fn update_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateServerRequest>, JsonRejection>,
) -> Result<Json<Server>, ApiError> {
    let id = ServerId::parse(&id)?;
    let Json(req) = payload?;

    let server = state.servers.update(id, req.into()).await?;
    state
        .audit
        .record(AuditEntry::new(AuditAction::Update, &server));

    Ok(Json(server))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = ServerId::parse(&id)?;

    state.servers.delete(id).await?;
    state.audit.record(AuditEntry::new(
        AuditAction::Delete,
        &serde_json::json!({ "id": id }),
    ));

    Ok(Json(MessageResponse {
        message: "Server deleted successfully".into(),
    }))
}

pub async fn get_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<ServerMetrics>, ApiError> {
    let id = ServerId::parse(&id)?;
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(start), Some(end)) = (present(params.start), present(params.end)) else {
        return Err(ApiError::BadRequest("Start and end times are required".into()));
    };

    let metrics = state.servers.metrics(id, &start, &end).await?;
    state.audit.record(AuditEntry::new(
        AuditAction::GetMetrics,
        &serde_json::json!({ "id": id, "start": start, "end": end }),
    ));

    Ok(Json(metrics))
}
