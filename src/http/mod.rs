use std::sync::{Arc, Mutex};

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;
use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::password;
use crate::session::SessionRegistry;

pub mod changesets;
pub mod files;
pub mod ops;
pub mod rooms;
pub mod sync;

pub const PASSWORD_HEADER: &str = "x-room-password";

#[derive(Clone)]
pub struct AppState {
    pub conn: Arc<Mutex<Connection>>,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            sessions: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        }
    }

    /// Runs store work on the blocking pool. The store mutex is taken inside
    /// the closure only, never across an await point.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| Error::Internal("poisoned store lock".to_string()))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::Internal(format!("store task failed: {e}")))?
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(rooms::root_redirect))
        .route("/healthz", get(rooms::healthz))
        .route("/room/:room_id", get(rooms::client_asset))
        .route("/api/room/:room_id/info", get(rooms::room_info))
        .route("/api/room/:room_id/password", post(rooms::set_password))
        .route(
            "/api/room/:room_id/verify-password",
            post(rooms::verify_password),
        )
        .route(
            "/api/room/:room_id",
            get(rooms::room_state).delete(rooms::delete_room),
        )
        .route("/api/room/:room_id/version", get(rooms::room_version))
        .route("/api/room/:room_id/files", post(files::upsert_file))
        .route(
            "/api/room/:room_id/files/:file_ref",
            delete(files::delete_file),
        )
        .route(
            "/api/room/:room_id/files/:file_ref/snapshot",
            post(files::snapshot_file),
        )
        .route("/api/room/:room_id/sync", post(sync::sync_bulk))
        .route("/api/room/:room_id/sync/begin", post(sync::sync_begin))
        .route("/api/room/:room_id/sync/chunk", post(sync::sync_chunk))
        .route("/api/room/:room_id/sync/complete", post(sync::sync_complete))
        .route(
            "/api/room/:room_id/ops",
            post(ops::submit_op).get(ops::fetch_ops),
        )
        .route(
            "/api/room/:room_id/changesets",
            post(changesets::create_changeset),
        )
        .route(
            "/api/room/:room_id/changesets/:cid/accept",
            post(changesets::accept_changeset),
        )
        .route(
            "/api/room/:room_id/changesets/:cid/reject",
            post(changesets::reject_changeset),
        )
        .route(
            "/api/room/:room_id/changes/:chid/accept",
            post(changesets::accept_change),
        )
        .route(
            "/api/room/:room_id/changes/:chid/reject",
            post(changesets::reject_change),
        )
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub password: Option<String>,
}

pub(crate) fn validate_room_id(room_id: &str) -> Result<()> {
    if db::valid_room_id(room_id) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid room id: {room_id}")))
    }
}

/// Digest transport: `X-Room-Password` header wins, `password` query
/// parameter is the fallback.
pub(crate) fn password_digest(headers: &HeaderMap, query_password: Option<String>) -> Option<String> {
    headers
        .get(PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .or(query_password)
}

/// Lazily creates the room, then enforces its password if one is set. The
/// argon2 comparison is intentionally slow and constant-time on the output.
pub(crate) fn authorize_room(conn: &Connection, room_id: &str, digest: Option<&str>) -> Result<()> {
    db::ensure_room(conn, room_id)?;

    let Some(stored) = db::room_password(conn, room_id)? else {
        return Ok(());
    };
    let Some(digest) = digest else {
        return Err(Error::PasswordRequired);
    };
    if password::verify_password(digest, &stored)? {
        Ok(())
    } else {
        Err(Error::PasswordRequired)
    }
}
