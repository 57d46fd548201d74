use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{authorize_room, password_digest, validate_room_id, AppState, AuthQuery};
use crate::db;
use crate::error::Result;

#[derive(Debug, Serialize)]
pub struct UpsertFileResponse {
    #[serde(flatten)]
    pub file: db::RoomFile,
    pub room_version: i64,
}

pub async fn upsert_file(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<db::FileUpsert>,
) -> Result<Json<UpsertFileResponse>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let (file, room_version) = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::upsert_file(conn, &room_id, &req)
        })
        .await?;

    Ok(Json(UpsertFileResponse { file, room_version }))
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((room_id, file_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let version = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::delete_file(conn, &room_id, &file_id)
        })
        .await?;

    Ok(Json(json!({ "success": true, "version": version })))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    pub content_encrypted: String,
    pub through_seq: i64,
}

pub async fn snapshot_file(
    State(state): State<AppState>,
    Path((room_id, path_hash)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<db::SnapshotResult>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let result = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::snapshot_file(
                conn,
                &room_id,
                &path_hash,
                &req.content_encrypted,
                req.through_seq,
            )
        })
        .await?;

    Ok(Json(result))
}
