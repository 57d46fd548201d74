use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{authorize_room, password_digest, validate_room_id, AppState, AuthQuery};
use crate::db;
use crate::error::{Error, Result};
use crate::session::SESSION_TTL;

#[derive(Debug, Deserialize)]
pub struct SyncBeginRequest {
    pub client_id: String,
    pub total_chunks: i64,
    pub total_files: i64,
}

pub async fn sync_begin(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SyncBeginRequest>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    if req.client_id.trim().is_empty() {
        return Err(Error::Validation("missing client_id".to_string()));
    }
    if req.total_chunks < 0 || req.total_files < 0 {
        return Err(Error::Validation("negative chunk or file count".to_string()));
    }
    let digest = password_digest(&headers, query.password);

    {
        let room_id = room_id.clone();
        state
            .with_conn(move |conn| authorize_room(conn, &room_id, digest.as_deref()))
            .await?;
    }

    let token = state
        .sessions
        .begin(&room_id, &req.client_id, req.total_chunks, req.total_files)?;

    Ok(Json(json!({
        "session_token": token,
        "expires_in_secs": SESSION_TTL.as_secs(),
    })))
}

#[derive(Debug, Deserialize)]
pub struct SyncChunkRequest {
    pub session_token: String,
    pub chunk_index: i64,
    pub files: Vec<db::FileUpsert>,
}

pub async fn sync_chunk(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SyncChunkRequest>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    state.sessions.peek(&req.session_token, &room_id)?;

    let version = {
        let room_id = room_id.clone();
        let files = req.files.clone();
        state
            .with_conn(move |conn| {
                authorize_room(conn, &room_id, digest.as_deref())?;
                db::apply_sync_chunk(conn, &room_id, &files)
            })
            .await?
    };

    // Progress is recorded only after the chunk landed, so a failed store
    // transaction leaves the chunk retryable.
    let progress = state.sessions.record_chunk(
        &req.session_token,
        &room_id,
        req.chunk_index,
        req.files.iter().map(|f| f.path_hash.clone()),
    )?;

    Ok(Json(json!({
        "received_chunks": progress.received_chunks,
        "chunks_remaining": progress.chunks_remaining,
        "version": version,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SyncCompleteRequest {
    pub session_token: String,
}

pub async fn sync_complete(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SyncCompleteRequest>,
) -> Result<Json<db::RoomState>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let session = state.sessions.complete(&req.session_token, &room_id)?;

    let snapshot = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::reconcile_missing_files(conn, &room_id, &session.path_hashes)?;
            db::room_state(conn, &room_id, 0, db::DEFAULT_STATE_LIMIT, 0)
        })
        .await?;

    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct SyncBulkRequest {
    pub files: Vec<db::FileUpsert>,
}

/// Single-shot equivalent of begin + chunks + complete.
pub async fn sync_bulk(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SyncBulkRequest>,
) -> Result<Json<db::RoomState>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let snapshot = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::sync_replace(conn, &room_id, &req.files)?;
            db::room_state(conn, &room_id, 0, db::DEFAULT_STATE_LIMIT, 0)
        })
        .await?;

    Ok(Json(snapshot))
}
