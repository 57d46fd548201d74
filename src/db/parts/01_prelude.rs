use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::password::{KdfParams, StoredPassword};

/// Tombstones older than `room.version - TOMBSTONE_HORIZON` are eligible for
/// pruning. Clients further behind than this must fall back to a full scan.
pub const TOMBSTONE_HORIZON: i64 = 100;

pub const DEFAULT_STATE_LIMIT: i64 = 1000;
pub const OPS_FETCH_LIMIT: i64 = 1000;

pub const ROOM_ID_LEN: usize = 8;

#[derive(Clone, Debug, Serialize)]
pub struct RoomInfo {
    pub id: String,
    pub version: i64,
    pub op_seq: i64,
    pub has_password: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomFile {
    pub id: String,
    pub path_hash: String,
    pub path_encrypted: String,
    pub content_encrypted: Option<String>,
    pub is_syncable: bool,
    pub size_bytes: i64,
    pub version: i64,
    pub snapshot_seq: i64,
    pub updated_at_ms: i64,
}

/// Client payload for a single-file upsert. `path_hash` is the client-side
/// SHA-256 of the plaintext path; every other field is opaque ciphertext.
#[derive(Clone, Debug, Deserialize)]
pub struct FileUpsert {
    pub path_hash: String,
    pub path_encrypted: String,
    #[serde(default)]
    pub content_encrypted: Option<String>,
    #[serde(default = "default_true")]
    pub is_syncable: bool,
    #[serde(default)]
    pub size_bytes: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize)]
pub struct OperationRow {
    pub seq: i64,
    pub file_path_hash: String,
    pub op_encrypted: String,
    pub client_id: String,
    pub base_version: i64,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConflictingOp {
    pub seq: i64,
    pub op_encrypted: String,
    pub client_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SubmitOpResult {
    pub seq: i64,
    pub current_version: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OpsPage {
    pub ops: Vec<OperationRow>,
    pub op_seq: i64,
    pub has_more: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SnapshotResult {
    pub version: i64,
    pub snapshot_seq: i64,
    pub room_version: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetStatus {
    Pending,
    Accepted,
    Rejected,
    Partial,
}

impl ChangesetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::Accepted => "accepted",
            ChangesetStatus::Rejected => "rejected",
            ChangesetStatus::Partial => "partial",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(ChangesetStatus::Pending),
            "accepted" => Ok(ChangesetStatus::Accepted),
            "rejected" => Ok(ChangesetStatus::Rejected),
            "partial" => Ok(ChangesetStatus::Partial),
            _ => Err(Error::Internal(format!("unknown changeset status: {raw}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeStatus::Pending => "pending",
            ChangeStatus::Accepted => "accepted",
            ChangeStatus::Rejected => "rejected",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(ChangeStatus::Pending),
            "accepted" => Ok(ChangeStatus::Accepted),
            "rejected" => Ok(ChangeStatus::Rejected),
            _ => Err(Error::Internal(format!("unknown change status: {raw}"))),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Changeset {
    pub id: String,
    pub author_encrypted: String,
    pub message_encrypted: String,
    pub status: ChangesetStatus,
    pub created_at_ms: i64,
    pub resolved_at_ms: Option<i64>,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Change {
    pub id: String,
    pub changeset_id: String,
    pub file_path_encrypted: String,
    pub file_path_hash: String,
    pub old_content_encrypted: Option<String>,
    pub new_content_encrypted: String,
    pub diff_encrypted: Option<String>,
    pub status: ChangeStatus,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChangesetCreate {
    pub author_encrypted: String,
    pub message_encrypted: String,
    pub changes: Vec<ChangeCreate>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChangeCreate {
    pub file_path_encrypted: String,
    pub file_path_hash: String,
    #[serde(default)]
    pub old_content_encrypted: Option<String>,
    pub new_content_encrypted: String,
    #[serde(default)]
    pub diff_encrypted: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RoomState {
    pub version: i64,
    pub op_seq: i64,
    pub files: Vec<RoomFile>,
    pub deleted_path_hashes: Vec<String>,
    pub has_more: bool,
    pub changesets: Vec<Changeset>,
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(i64::MAX)
}

/// Runs `f` inside an immediate transaction. The write lock taken at BEGIN
/// is what serializes concurrent mutations on the same room.
pub fn with_immediate_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    conn.execute_batch("BEGIN IMMEDIATE;")?;

    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT;")?;
            Ok(value)
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK;");
            Err(e)
        }
    }
}

pub fn valid_room_id(room_id: &str) -> bool {
    room_id.len() == ROOM_ID_LEN && room_id.chars().all(|ch| ch.is_ascii_alphanumeric())
}
