fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let mut user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if user_version < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS rooms (
  id TEXT PRIMARY KEY,
  version INTEGER NOT NULL DEFAULT 0,
  op_seq INTEGER NOT NULL DEFAULT 0,
  password_hash TEXT,
  password_salt TEXT,
  password_m_cost INTEGER,
  password_t_cost INTEGER,
  password_p_cost INTEGER,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_rooms_updated_at ON rooms(updated_at);

CREATE TABLE IF NOT EXISTS files (
  id TEXT PRIMARY KEY,
  room_id TEXT NOT NULL,
  path_hash TEXT NOT NULL,
  path_encrypted TEXT NOT NULL,
  content_encrypted TEXT,
  is_syncable INTEGER NOT NULL DEFAULT 1,
  size_bytes INTEGER NOT NULL DEFAULT 0,
  version INTEGER NOT NULL DEFAULT 1,
  snapshot_seq INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  updated_at INTEGER NOT NULL,
  FOREIGN KEY(room_id) REFERENCES rooms(id) ON DELETE CASCADE
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_files_room_path_hash ON files(room_id, path_hash);
CREATE INDEX IF NOT EXISTS idx_files_room_version ON files(room_id, version);

CREATE TABLE IF NOT EXISTS operations (
  room_id TEXT NOT NULL,
  seq INTEGER NOT NULL,
  file_path_hash TEXT NOT NULL,
  op_encrypted TEXT NOT NULL,
  client_id TEXT NOT NULL,
  base_version INTEGER NOT NULL DEFAULT 0,
  created_at INTEGER NOT NULL,
  PRIMARY KEY (room_id, seq),
  FOREIGN KEY(room_id) REFERENCES rooms(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_operations_room_file_seq
  ON operations(room_id, file_path_hash, seq);

CREATE TABLE IF NOT EXISTS deleted_files (
  room_id TEXT NOT NULL,
  path_hash TEXT NOT NULL,
  deleted_at_version INTEGER NOT NULL,
  deleted_at INTEGER NOT NULL,
  FOREIGN KEY(room_id) REFERENCES rooms(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_deleted_files_room_version
  ON deleted_files(room_id, deleted_at_version);

CREATE TABLE IF NOT EXISTS changesets (
  id TEXT PRIMARY KEY,
  room_id TEXT NOT NULL,
  author_encrypted TEXT NOT NULL,
  message_encrypted TEXT NOT NULL,
  status TEXT NOT NULL DEFAULT 'pending',
  created_at INTEGER NOT NULL,
  resolved_at INTEGER,
  FOREIGN KEY(room_id) REFERENCES rooms(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_changesets_room_status ON changesets(room_id, status);

CREATE TABLE IF NOT EXISTS changes (
  id TEXT PRIMARY KEY,
  changeset_id TEXT NOT NULL,
  file_path_encrypted TEXT NOT NULL,
  file_path_hash TEXT NOT NULL,
  old_content_encrypted TEXT,
  new_content_encrypted TEXT NOT NULL,
  diff_encrypted TEXT,
  status TEXT NOT NULL DEFAULT 'pending',
  created_at INTEGER NOT NULL,
  FOREIGN KEY(changeset_id) REFERENCES changesets(id) ON DELETE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_changes_changeset_status ON changes(changeset_id, status);
"#,
        )?;
        conn.execute_batch("PRAGMA user_version = 1;")?;
        user_version = 1;
    }

    let _ = user_version;
    Ok(())
}

/// Opens (and migrates) the store at `db_path`. `DATABASE_URL` is a plain
/// file path; parent directories are created as needed.
pub fn open(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(format!("create store dir: {e}")))?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_millis(5_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    migrate(&conn)?;
    Ok(conn)
}
