use std::fmt::Write as _;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use geodns_core::types::{RecordData, Zone};

use crate::security::{internal_error, validate_dns_name};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/zones", get(list_zones).post(create_zone))
        .route("/zones/{name}", get(get_zone).delete(delete_zone))
        .route("/zones/{name}/zone-file", get(zone_file))
}

#[derive(Serialize)]
struct ZoneResponse {
    id: i64,
    name: String,
    record_count: Option<usize>,
}

impl ZoneResponse {
    fn from_zone(zone: &Zone, record_count: Option<usize>) -> Self {
        Self { id: zone.id, name: zone.name.clone(), record_count }
    }
}

#[derive(Deserialize)]
struct CreateZoneRequest {
    name: String,
}

async fn list_zones(State(state): State<AppState>) -> Result<Json<Vec<ZoneResponse>>, (StatusCode, String)> {
    let zones = state.store.get_zones().map_err(internal_error)?;
    let response: Vec<ZoneResponse> = zones.iter().map(|z| ZoneResponse::from_zone(z, None)).collect();
    Ok(Json(response))
}

async fn create_zone(
    State(state): State<AppState>,
    Json(req): Json<CreateZoneRequest>,
) -> Result<(StatusCode, Json<ZoneResponse>), (StatusCode, String)> {
    let name = req.name.trim_end_matches('.').to_string();
    validate_dns_name(&name).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let fqdn = format!("{name}.");

    let zone = state
        .store
        .add_zone(&fqdn)
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;

    Ok((StatusCode::CREATED, Json(ZoneResponse::from_zone(&zone, Some(0)))))
}

async fn get_zone(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ZoneResponse>, (StatusCode, String)> {
    let fqdn = format!("{}.", name.trim_end_matches('.'));
    let zone = state
        .store
        .get_zone(&fqdn)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let records = state.store.get_zone_records(zone.id).map_err(internal_error)?;
    Ok(Json(ZoneResponse::from_zone(&zone, Some(records.len()))))
}

/// Zone deletion has no storage-layer support yet — mirrors the admin API's
/// own not-yet-implemented domain deletion endpoint.
async fn delete_zone(
    State(_state): State<AppState>,
    Path(_name): Path<String>,
) -> (StatusCode, String) {
    (StatusCode::NOT_IMPLEMENTED, "zone deletion is not implemented".to_string())
}

/// Render a zone's records as a plain-text zone file, names shortened
/// relative to the zone the same way the resolver stores them.
async fn zone_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, (StatusCode, String)> {
    let fqdn = format!("{}.", name.trim_end_matches('.'));
    let zone = state
        .store
        .get_zone(&fqdn)
        .map_err(internal_error)?
        .ok_or((StatusCode::NOT_FOUND, "zone not found".to_string()))?;

    let records = state.store.get_zone_records(zone.id).map_err(internal_error)?;

    let mut out = String::new();
    let _ = writeln!(out, "; Zone file for {}", zone.name);
    for record in records {
        let owner = &record.name;
        let value = match RecordData::decode(record.rtype, &record.value) {
            Ok(data) => data.encode_value().replace('\t', " "),
            Err(_) => record.value.clone(),
        };
        let ttl = record.ttl.unwrap_or(300);
        let _ = writeln!(out, "{owner}\t{ttl}\t{}\t{value}", record.rtype);
    }
    Ok(out)
}
