use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::{authorize_room, password_digest, validate_room_id, AppState, AuthQuery};
use crate::db;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct SubmitOpRequest {
    pub file_path_hash: String,
    pub op_encrypted: String,
    pub client_id: String,
    #[serde(default)]
    pub base_version: Option<i64>,
}

pub async fn submit_op(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SubmitOpRequest>,
) -> Result<Json<db::SubmitOpResult>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let result = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::submit_operation(
                conn,
                &room_id,
                &req.file_path_hash,
                &req.op_encrypted,
                &req.client_id,
                req.base_version,
            )
        })
        .await?;

    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct OpsQuery {
    pub since: Option<i64>,
    pub file: Option<String>,
    pub password: Option<String>,
}

pub async fn fetch_ops(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<OpsQuery>,
) -> Result<Json<db::OpsPage>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password.clone());
    let since = query.since.unwrap_or(0);
    let file = query.file.clone();

    let page = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::fetch_operations(conn, &room_id, since, file.as_deref())
        })
        .await?;

    Ok(Json(page))
}
