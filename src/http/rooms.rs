use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{authorize_room, password_digest, validate_room_id, AppState, AuthQuery};
use crate::db;
use crate::error::{Error, Result};
use crate::password::{self, KdfParams};

static CLIENT_ASSET: &str = include_str!("../../assets/index.html");

pub async fn root_redirect() -> impl IntoResponse {
    (
        StatusCode::FOUND,
        [(
            header::LOCATION,
            format!("/room/{}", db::generate_room_id()),
        )],
    )
}

pub async fn healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// The single-file client bundle. Built and minified out of band; the server
/// only hands it out.
pub async fn client_asset() -> Html<&'static str> {
    Html(CLIENT_ASSET)
}

pub async fn room_info(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;

    let info = state
        .with_conn(move |conn| {
            db::ensure_room(conn, &room_id)?;
            db::room_info(conn, &room_id)
        })
        .await?;

    Ok(Json(json!({ "id": info.id, "has_password": info.has_password })))
}

#[derive(Debug, Deserialize)]
pub struct StateQuery {
    pub since: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub password: Option<String>,
}

pub async fn room_state(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<StateQuery>,
) -> Result<Json<db::RoomState>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password.clone());

    let since = query.since.unwrap_or(0);
    let limit = query.limit.unwrap_or(db::DEFAULT_STATE_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let snapshot = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::room_state(conn, &room_id, since, limit, offset)
        })
        .await?;

    Ok(Json(snapshot))
}

pub async fn room_version(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    let version = state
        .with_conn(move |conn| {
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::room_version(conn, &room_id)
        })
        .await?;

    Ok(Json(json!({ "version": version })))
}

pub async fn delete_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    let digest = password_digest(&headers, query.password);

    state
        .with_conn(move |conn| {
            if !db::room_exists(conn, &room_id)? {
                return Err(Error::NotFound(format!("room not found: {room_id}")));
            }
            authorize_room(conn, &room_id, digest.as_deref())?;
            db::delete_room(conn, &room_id)
        })
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    /// New password digest. Absent or empty removes the password.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
}

pub async fn set_password(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<AuthQuery>,
    Json(req): Json<SetPasswordRequest>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;
    let SetPasswordRequest {
        password: new_password,
        current_password,
    } = req;
    let current = password_digest(&headers, query.password).or(current_password);

    state
        .with_conn(move |conn| {
            db::ensure_room(conn, &room_id)?;

            // Changing or removing a password requires presenting the
            // current one; setting the first password does not.
            if let Some(stored) = db::room_password(conn, &room_id)? {
                let Some(current) = current else {
                    return Err(Error::PasswordRequired);
                };
                if !password::verify_password(&current, &stored)? {
                    return Err(Error::PasswordRequired);
                }
            }

            match new_password.as_deref() {
                Some(digest) if !digest.trim().is_empty() => {
                    let stored = password::hash_password(digest, &KdfParams::server_default())?;
                    db::set_room_password(conn, &room_id, &stored)
                }
                _ => db::clear_room_password(conn, &room_id),
            }
        })
        .await?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyPasswordRequest {
    pub password: String,
}

pub async fn verify_password(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<VerifyPasswordRequest>,
) -> Result<Json<Value>> {
    validate_room_id(&room_id)?;

    let success = state
        .with_conn(move |conn| {
            db::ensure_room(conn, &room_id)?;
            match db::room_password(conn, &room_id)? {
                None => Ok(true),
                Some(stored) => password::verify_password(&req.password, &stored),
            }
        })
        .await?;

    Ok(Json(json!({ "success": success })))
}
