fn file_version_and_snapshot_seq(
    conn: &Connection,
    room_id: &str,
    path_hash: &str,
) -> Result<(i64, i64)> {
    let row: Option<(i64, i64)> = conn
        .query_row(
            r#"SELECT version, snapshot_seq FROM files WHERE room_id = ?1 AND path_hash = ?2"#,
            params![room_id, path_hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row.unwrap_or((0, 0)))
}

/// Appends an encrypted edit delta to the room's operation log.
///
/// The conflict check mirrors optimistic concurrency on the per-file version:
/// when another client has landed ops past the last snapshot and the caller's
/// `base_version` is behind the file, the submission is rejected with the
/// conflicting ops so the caller can rebase. The server never transforms ops.
pub fn submit_operation(
    conn: &Connection,
    room_id: &str,
    file_path_hash: &str,
    op_encrypted: &str,
    client_id: &str,
    base_version: Option<i64>,
) -> Result<SubmitOpResult> {
    if file_path_hash.trim().is_empty() {
        return Err(Error::Validation("missing file_path_hash".to_string()));
    }
    if op_encrypted.is_empty() {
        return Err(Error::Validation("missing op_encrypted".to_string()));
    }
    if client_id.trim().is_empty() {
        return Err(Error::Validation("missing client_id".to_string()));
    }

    with_immediate_tx(conn, |conn| {
        let (file_version, snapshot_seq) =
            file_version_and_snapshot_seq(conn, room_id, file_path_hash)?;

        if let Some(base_version) = base_version {
            if base_version > 0 || file_version > 0 {
                let mut stmt = conn.prepare(
                    r#"SELECT seq, op_encrypted, client_id
                       FROM operations
                       WHERE room_id = ?1 AND file_path_hash = ?2 AND seq > ?3 AND client_id != ?4
                       ORDER BY seq ASC"#,
                )?;
                let mut rows = stmt.query(params![room_id, file_path_hash, snapshot_seq, client_id])?;

                let mut conflicting_ops = Vec::new();
                while let Some(row) = rows.next()? {
                    conflicting_ops.push(ConflictingOp {
                        seq: row.get(0)?,
                        op_encrypted: row.get(1)?,
                        client_id: row.get(2)?,
                    });
                }

                if !conflicting_ops.is_empty() && base_version < file_version {
                    return Err(Error::OpConflict {
                        current_version: file_version,
                        base_version,
                        conflicting_ops,
                    });
                }
            }
        }

        let now = now_ms();
        let updated = conn.execute(
            r#"UPDATE rooms SET op_seq = op_seq + 1, version = version + 1, updated_at = ?2
               WHERE id = ?1"#,
            params![room_id, now],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("room not found: {room_id}")));
        }

        let seq: i64 = conn.query_row(
            r#"SELECT op_seq FROM rooms WHERE id = ?1"#,
            params![room_id],
            |row| row.get(0),
        )?;

        conn.execute(
            r#"INSERT INTO operations
               (room_id, seq, file_path_hash, op_encrypted, client_id, base_version, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                room_id,
                seq,
                file_path_hash,
                op_encrypted,
                client_id,
                base_version.unwrap_or(0),
                now
            ],
        )?;

        if file_version > 0 {
            conn.execute(
                r#"UPDATE files SET version = version + 1, updated_at = ?3
                   WHERE room_id = ?1 AND path_hash = ?2"#,
                params![room_id, file_path_hash, now],
            )?;
        }

        Ok(SubmitOpResult {
            seq,
            current_version: file_version + 1,
        })
    })
}

pub fn fetch_operations(
    conn: &Connection,
    room_id: &str,
    since: i64,
    file_path_hash: Option<&str>,
) -> Result<OpsPage> {
    let info = room_info(conn, room_id)?;

    let mut stmt = conn.prepare(
        r#"SELECT seq, file_path_hash, op_encrypted, client_id, base_version, created_at
           FROM operations
           WHERE room_id = ?1
             AND seq > ?2
             AND (?3 IS NULL OR file_path_hash = ?3)
           ORDER BY seq ASC
           LIMIT ?4"#,
    )?;
    let mut rows = stmt.query(params![room_id, since, file_path_hash, OPS_FETCH_LIMIT])?;

    let mut ops = Vec::new();
    while let Some(row) = rows.next()? {
        ops.push(OperationRow {
            seq: row.get(0)?,
            file_path_hash: row.get(1)?,
            op_encrypted: row.get(2)?,
            client_id: row.get(3)?,
            base_version: row.get(4)?,
            created_at_ms: row.get(5)?,
        });
    }

    let has_more = ops.len() as i64 == OPS_FETCH_LIMIT;
    Ok(OpsPage {
        ops,
        op_seq: info.op_seq,
        has_more,
    })
}

/// Replaces the file body with a client-materialized compaction of the log up
/// to `through_seq`, then prunes the ops it covers. The server trusts the
/// client to have applied exactly the ops it claims.
pub fn snapshot_file(
    conn: &Connection,
    room_id: &str,
    path_hash: &str,
    content_encrypted: &str,
    through_seq: i64,
) -> Result<SnapshotResult> {
    with_immediate_tx(conn, |conn| {
        let exists: Option<String> = conn
            .query_row(
                r#"SELECT id FROM files WHERE room_id = ?1 AND path_hash = ?2"#,
                params![room_id, path_hash],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(Error::NotFound(format!("file not found: {path_hash}")));
        }

        // The new body counts as a write: stamp the file with the post-bump
        // room version so delta readers re-fetch it.
        let room_version = bump_room_version(conn, room_id)?;
        conn.execute(
            r#"UPDATE files
               SET content_encrypted = ?3,
                   snapshot_seq = ?4,
                   version = ?5,
                   updated_at = ?6
               WHERE room_id = ?1 AND path_hash = ?2"#,
            params![
                room_id,
                path_hash,
                content_encrypted,
                through_seq,
                room_version,
                now_ms()
            ],
        )?;

        conn.execute(
            r#"DELETE FROM operations
               WHERE room_id = ?1 AND file_path_hash = ?2 AND seq <= ?3"#,
            params![room_id, path_hash, through_seq],
        )?;

        Ok(SnapshotResult {
            version: room_version,
            snapshot_seq: through_seq,
            room_version,
        })
    })
}
