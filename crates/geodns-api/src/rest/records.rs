use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use geodns_core::error::Error;
use geodns_core::types::{Record, RecordType};

use crate::security::{internal_error, validate_dns_name, Pagination};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/zones/{zone}/records", get(list_records).post(create_record))
        .route(
            "/zones/{zone}/records/{record_id}",
            get(get_record).put(update_record).delete(delete_record),
        )
}

#[derive(Serialize)]
struct RecordResponse {
    id: i64,
    zone_id: i64,
    name: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    value: String,
    ttl: Option<u32>,
    locked: bool,
}

impl From<Record> for RecordResponse {
    fn from(r: Record) -> Self {
        Self { id: r.id, zone_id: r.zone, name: r.name, record_type: r.rtype, value: r.value, ttl: r.ttl, locked: r.locked }
    }
}

#[derive(Deserialize)]
struct CreateRecordRequest {
    name: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    value: String,
    ttl: Option<u32>,
    #[serde(default)]
    locked: bool,
}

#[derive(Deserialize)]
struct UpdateRecordRequest {
    value: String,
    ttl: Option<u32>,
}

fn zone_error(e: Error) -> (StatusCode, String) {
    match e {
        Error::ZoneNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        other => internal_error(other),
    }
}

fn record_error(e: Error) -> (StatusCode, String) {
    match e {
        Error::RecordNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        Error::RecordLocked(_) => (StatusCode::CONFLICT, "record is locked".to_string()),
        Error::InvalidRecord { .. } | Error::InvalidSegmentCount { .. } => (StatusCode::BAD_REQUEST, e.to_string()),
        other => internal_error(other),
    }
}

fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

async fn list_records(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Query(page): Query<Pagination>,
) -> Result<Json<Vec<RecordResponse>>, (StatusCode, String)> {
    let zone = state
        .store
        .get_zone(&fqdn(&zone))
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let records = state.store.get_zone_records(zone.id).map_err(internal_error)?;
    let response: Vec<RecordResponse> = records.into_iter().map(RecordResponse::from).collect();

    Ok(Json(page.apply(response)))
}

async fn create_record(
    State(state): State<AppState>,
    Path(zone): Path<String>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<RecordResponse>), (StatusCode, String)> {
    let zone = state
        .store
        .get_zone(&fqdn(&zone))
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    validate_dns_name(&req.name).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    if req.record_type == RecordType::Soa {
        return Err((
            StatusCode::BAD_REQUEST,
            "SOA records are synthesized, not stored".to_string(),
        ));
    }

    let record = state
        .store
        .add_record(zone.id, &req.name, req.record_type, &req.value, req.ttl, req.locked)
        .map_err(zone_error)?;

    Ok((StatusCode::CREATED, Json(RecordResponse::from(record))))
}

async fn get_record(
    State(state): State<AppState>,
    Path((zone, record_id)): Path<(String, i64)>,
) -> Result<Json<RecordResponse>, (StatusCode, String)> {
    let zone = state
        .store
        .get_zone(&fqdn(&zone))
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let record = state.store.get_record_by_id(record_id).map_err(record_error)?;
    if record.zone != zone.id {
        return Err((StatusCode::NOT_FOUND, "record not found".to_string()));
    }

    Ok(Json(RecordResponse::from(record)))
}

async fn update_record(
    State(state): State<AppState>,
    Path((zone, record_id)): Path<(String, i64)>,
    Json(req): Json<UpdateRecordRequest>,
) -> Result<Json<RecordResponse>, (StatusCode, String)> {
    let zone = state
        .store
        .get_zone(&fqdn(&zone))
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let existing = state.store.get_record_by_id(record_id).map_err(record_error)?;
    if existing.zone != zone.id {
        return Err((StatusCode::NOT_FOUND, "record not found".to_string()));
    }

    let record = state
        .store
        .put_record_by_id(record_id, &req.value, req.ttl)
        .map_err(record_error)?;

    Ok(Json(RecordResponse::from(record)))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((zone, record_id)): Path<(String, i64)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let zone = state
        .store
        .get_zone(&fqdn(&zone))
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let existing = state.store.get_record_by_id(record_id).map_err(record_error)?;
    if existing.zone != zone.id {
        return Err((StatusCode::NOT_FOUND, "record not found".to_string()));
    }

    state.store.delete_record_by_id(record_id).map_err(record_error)?;
    Ok(StatusCode::NO_CONTENT)
}
