//! API route definitions.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::state::AppState;
use super::ApiError;
use crate::detect::Severity;
use crate::dispatch::AckStatus;
use crate::engine::RiskAssessmentRequest;
use crate::responders::Availability;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/assessments", post(submit_assessment))
        .route("/incidents/{id}", get(incident_status))
        .route("/incidents/{id}/resolve", post(resolve_incident))
        .route("/incidents/{id}/record", get(intervention_record))
        .route("/deliveries/{id}/ack", post(acknowledge_delivery))
        .route("/responders", get(list_responders))
        .route("/responders/{id}/availability", put(set_availability))
        .route("/responders/{id}/priority", put(set_priority))
        .route("/plans/{severity}", get(plan_for_severity))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn envelope<T: serde::Serialize>(data: T) -> Result<Json<Value>, ApiError> {
    let data = serde_json::to_value(data).map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(json!({ "data": data, "meta": meta() })))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let active = state.engine.active_incidents().await.len();
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_incidents": active
        },
        "meta": meta()
    }))
}

async fn submit_assessment(
    State(state): State<AppState>,
    Json(request): Json<RiskAssessmentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id is required".into()));
    }
    let submission = state.engine.submit(request).await?;
    let status = if submission.incident_id.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, envelope(submission)?))
}

async fn incident_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let incident = state
        .engine
        .incident_status(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("unknown incident {id}")))?;
    envelope(incident)
}

async fn resolve_incident(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let first = state.engine.resolve(id).await?;
    envelope(json!({ "incident_id": id, "newly_resolved": first }))
}

async fn intervention_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .engine
        .intervention_record(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no intervention record for {id}")))?;
    envelope(record)
}

async fn acknowledge_delivery(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    match state.engine.acknowledge(id).await {
        AckStatus::Unknown => Err(ApiError::NotFound(format!("unknown delivery {id}"))),
        status => envelope(json!({ "delivery_id": id, "status": status })),
    }
}

async fn list_responders(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let responders = state.engine.directory().list().await;
    let total = responders.len();
    let data = serde_json::to_value(responders).map_err(|e| ApiError::Internal(e.into()))?;
    Ok(Json(json!({ "data": data, "meta": { "total": total } })))
}

async fn set_availability(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(availability): Json<Availability>,
) -> Result<Json<Value>, ApiError> {
    state.engine.directory().set_availability(&id, availability).await?;
    let responder = state.engine.directory().get(&id).await;
    envelope(responder)
}

#[derive(Deserialize)]
struct PriorityBody {
    priority: u32,
}

async fn set_priority(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PriorityBody>,
) -> Result<Json<Value>, ApiError> {
    state.engine.directory().set_priority(&id, body.priority).await?;
    let responder = state.engine.directory().get(&id).await;
    envelope(responder)
}

async fn plan_for_severity(
    State(state): State<AppState>,
    Path(severity): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let severity: Severity = severity.parse().map_err(ApiError::BadRequest)?;
    envelope(state.engine.planner().plan_for(severity))
}
