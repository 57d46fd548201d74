use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;

use super::{authorize_room, password_digest, validate_room_id, AppState, AuthQuery};
use crate::db;
use crate::error::Result;

pub async fn create_changeset(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<db::ChangesetCreate>,
) -> Result<Json<db::Changeset>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let changeset = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::create_changeset(conn, &room_id, &req)
        })
        .await?;

    Ok(Json(changeset))
}

pub async fn accept_changeset(
    State(state): State<AppState>,
    Path((room_id, changeset_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<db::Changeset>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let changeset = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::accept_changeset(conn, &room_id, &changeset_id)
        })
        .await?;

    Ok(Json(changeset))
}

pub async fn reject_changeset(
    State(state): State<AppState>,
    Path((room_id, changeset_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<db::Changeset>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let changeset = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::reject_changeset(conn, &room_id, &changeset_id)
        })
        .await?;

    Ok(Json(changeset))
}

pub async fn accept_change(
    State(state): State<AppState>,
    Path((room_id, change_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<db::ChangeResolution>> {
    resolve_change(state, room_id, change_id, headers, query, true).await
}

pub async fn reject_change(
    State(state): State<AppState>,
    Path((room_id, change_id)): Path<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<db::ChangeResolution>> {
    resolve_change(state, room_id, change_id, headers, query, false).await
}

async fn resolve_change(
    state: AppState,
    room_id: String,
    change_id: String,
    headers: HeaderMap,
    query: AuthQuery,
    accept: bool,
) -> Result<Json<db::ChangeResolution>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let resolution = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::resolve_change(conn, &room_id, &change_id, accept)
        })
        .await?;

    Ok(Json(resolution))
}
