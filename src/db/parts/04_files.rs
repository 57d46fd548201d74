fn validate_file_upsert(file: &FileUpsert) -> Result<()> {
    if file.path_hash.trim().is_empty() {
        return Err(Error::Validation("missing path_hash".to_string()));
    }
    if file.path_encrypted.is_empty() {
        return Err(Error::Validation("missing path_encrypted".to_string()));
    }
    if file.is_syncable && file.content_encrypted.is_none() {
        return Err(Error::Validation(
            "syncable file requires content_encrypted".to_string(),
        ));
    }
    Ok(())
}

fn read_file_by_path(conn: &Connection, room_id: &str, path_hash: &str) -> Result<Option<RoomFile>> {
    conn.query_row(
        r#"SELECT id, path_hash, path_encrypted, content_encrypted, is_syncable,
                  size_bytes, version, snapshot_seq, updated_at
           FROM files
           WHERE room_id = ?1 AND path_hash = ?2"#,
        params![room_id, path_hash],
        |row| {
            Ok(RoomFile {
                id: row.get(0)?,
                path_hash: row.get(1)?,
                path_encrypted: row.get(2)?,
                content_encrypted: row.get(3)?,
                is_syncable: row.get::<_, i64>(4)? != 0,
                size_bytes: row.get(5)?,
                version: row.get(6)?,
                snapshot_seq: row.get(7)?,
                updated_at_ms: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/// Insert-or-update keyed by `(room_id, path_hash)`. The row is stamped with
/// `version` — the post-bump room version of the surrounding transaction —
/// so a `since`-based delta read can compare per-file versions against the
/// caller's room-version checkpoint. Callers decide how many room-version
/// bumps a batch amounts to.
fn upsert_file_in_tx(
    conn: &Connection,
    room_id: &str,
    file: &FileUpsert,
    version: i64,
) -> Result<RoomFile> {
    validate_file_upsert(file)?;

    let id = uuid::Uuid::new_v4().to_string();
    let now = now_ms();

    conn.execute(
        r#"INSERT INTO files
           (id, room_id, path_hash, path_encrypted, content_encrypted, is_syncable,
            size_bytes, version, snapshot_seq, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
           ON CONFLICT(room_id, path_hash) DO UPDATE SET
             path_encrypted = excluded.path_encrypted,
             content_encrypted = excluded.content_encrypted,
             is_syncable = excluded.is_syncable,
             size_bytes = excluded.size_bytes,
             version = excluded.version,
             updated_at = excluded.updated_at"#,
        params![
            id,
            room_id,
            file.path_hash,
            file.path_encrypted,
            file.content_encrypted,
            if file.is_syncable { 1 } else { 0 },
            file.size_bytes,
            version,
            now
        ],
    )?;

    read_file_by_path(conn, room_id, &file.path_hash)?
        .ok_or_else(|| Error::Internal("file upsert did not persist".to_string()))
}

/// Single-file upsert. Advances the room version in the same transaction and
/// returns the stored row plus the new room version. Never writes tombstones.
pub fn upsert_file(conn: &Connection, room_id: &str, file: &FileUpsert) -> Result<(RoomFile, i64)> {
    with_immediate_tx(conn, |conn| {
        let version = bump_room_version(conn, room_id)?;
        let stored = upsert_file_in_tx(conn, room_id, file, version)?;
        Ok((stored, version))
    })
}

/// Removes a file by id and records a tombstone stamped with the post-bump
/// room version. 404 when the id is unknown in that room.
pub fn delete_file(conn: &Connection, room_id: &str, file_id: &str) -> Result<i64> {
    with_immediate_tx(conn, |conn| {
        let path_hash: Option<String> = conn
            .query_row(
                r#"SELECT path_hash FROM files WHERE room_id = ?1 AND id = ?2"#,
                params![room_id, file_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(path_hash) = path_hash else {
            return Err(Error::NotFound(format!("file not found: {file_id}")));
        };

        conn.execute(
            r#"DELETE FROM files WHERE room_id = ?1 AND id = ?2"#,
            params![room_id, file_id],
        )?;

        let version = bump_room_version(conn, room_id)?;
        conn.execute(
            r#"INSERT INTO deleted_files (room_id, path_hash, deleted_at_version, deleted_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![room_id, path_hash, version, now_ms()],
        )?;

        Ok(version)
    })
}

/// Delta read: files whose per-file version moved past `since`, tombstones
/// newer than `since` (suppressed entirely at `since = 0`), and all pending
/// changesets. `has_more` signals another page at the same `since`.
pub fn room_state(
    conn: &Connection,
    room_id: &str,
    since: i64,
    limit: i64,
    offset: i64,
) -> Result<RoomState> {
    let info = room_info(conn, room_id)?;
    let limit = limit.clamp(1, DEFAULT_STATE_LIMIT);
    let offset = offset.max(0);

    let mut stmt = conn.prepare(
        r#"SELECT id, path_hash, path_encrypted, content_encrypted, is_syncable,
                  size_bytes, version, snapshot_seq, updated_at
           FROM files
           WHERE room_id = ?1 AND version > ?2
           ORDER BY path_encrypted ASC
           LIMIT ?3 OFFSET ?4"#,
    )?;
    let mut rows = stmt.query(params![room_id, since, limit, offset])?;

    let mut files = Vec::new();
    while let Some(row) = rows.next()? {
        files.push(RoomFile {
            id: row.get(0)?,
            path_hash: row.get(1)?,
            path_encrypted: row.get(2)?,
            content_encrypted: row.get(3)?,
            is_syncable: row.get::<_, i64>(4)? != 0,
            size_bytes: row.get(5)?,
            version: row.get(6)?,
            snapshot_seq: row.get(7)?,
            updated_at_ms: row.get(8)?,
        });
    }

    // At since=0 the caller has no prior state to reconcile, so deletions are
    // irrelevant. A tombstone whose path has since been re-created is
    // suppressed as well: the live row wins.
    let mut deleted_path_hashes = Vec::new();
    if since > 0 {
        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT d.path_hash
               FROM deleted_files d
               WHERE d.room_id = ?1
                 AND d.deleted_at_version > ?2
                 AND NOT EXISTS (
                   SELECT 1 FROM files f
                   WHERE f.room_id = d.room_id AND f.path_hash = d.path_hash
                 )
               ORDER BY d.path_hash ASC"#,
        )?;
        let mut rows = stmt.query(params![room_id, since])?;
        while let Some(row) = rows.next()? {
            deleted_path_hashes.push(row.get(0)?);
        }
    }

    let has_more = files.len() as i64 == limit;
    let changesets = list_open_changesets(conn, room_id)?;

    Ok(RoomState {
        version: info.version,
        op_seq: info.op_seq,
        files,
        deleted_path_hashes,
        has_more,
        changesets,
    })
}
