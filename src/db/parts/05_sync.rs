#[derive(Clone, Debug, Serialize)]
pub struct SyncReconcileResult {
    pub version: i64,
    pub deleted_path_hashes: Vec<String>,
}

/// Applies one chunk of a bulk upload: upserts every file and advances the
/// room version once for the whole chunk. Re-delivery of the same chunk is
/// safe; it re-upserts and bumps the per-file versions again.
pub fn apply_sync_chunk(conn: &Connection, room_id: &str, files: &[FileUpsert]) -> Result<i64> {
    with_immediate_tx(conn, |conn| {
        if files.is_empty() {
            return room_version(conn, room_id);
        }
        let version = bump_room_version(conn, room_id)?;
        for file in files {
            upsert_file_in_tx(conn, room_id, file, version)?;
        }
        Ok(version)
    })
}

/// Sync-completion reconciliation: every live file whose `path_hash` was not
/// observed during the session is deleted and tombstoned. The room version
/// advances exactly once iff anything is deleted, and every tombstone written
/// here carries that one version.
pub fn reconcile_missing_files(
    conn: &Connection,
    room_id: &str,
    observed: &BTreeSet<String>,
) -> Result<SyncReconcileResult> {
    with_immediate_tx(conn, |conn| reconcile_missing_files_in_tx(conn, room_id, observed))
}

fn reconcile_missing_files_in_tx(
    conn: &Connection,
    room_id: &str,
    observed: &BTreeSet<String>,
) -> Result<SyncReconcileResult> {
    let mut stmt = conn.prepare(
        r#"SELECT id, path_hash FROM files WHERE room_id = ?1 ORDER BY path_hash ASC"#,
    )?;
    let mut rows = stmt.query(params![room_id])?;

    let mut stale: Vec<(String, String)> = Vec::new();
    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let path_hash: String = row.get(1)?;
        if !observed.contains(&path_hash) {
            stale.push((id, path_hash));
        }
    }

    if stale.is_empty() {
        return Ok(SyncReconcileResult {
            version: room_version(conn, room_id)?,
            deleted_path_hashes: Vec::new(),
        });
    }

    let version = bump_room_version(conn, room_id)?;
    let now = now_ms();
    let mut deleted_path_hashes = Vec::with_capacity(stale.len());
    for (id, path_hash) in stale {
        conn.execute(
            r#"DELETE FROM files WHERE room_id = ?1 AND id = ?2"#,
            params![room_id, id],
        )?;
        conn.execute(
            r#"INSERT INTO deleted_files (room_id, path_hash, deleted_at_version, deleted_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![room_id, path_hash, version, now],
        )?;
        deleted_path_hashes.push(path_hash);
    }

    Ok(SyncReconcileResult {
        version,
        deleted_path_hashes,
    })
}

/// Single-shot bulk sync: the begin/chunk/complete flow collapsed into one
/// transaction. Upserts bump the room version once, reconciliation once more
/// when it deletes anything.
pub fn sync_replace(
    conn: &Connection,
    room_id: &str,
    files: &[FileUpsert],
) -> Result<SyncReconcileResult> {
    with_immediate_tx(conn, |conn| {
        let mut observed = BTreeSet::new();
        if !files.is_empty() {
            let version = bump_room_version(conn, room_id)?;
            for file in files {
                upsert_file_in_tx(conn, room_id, file, version)?;
                observed.insert(file.path_hash.clone());
            }
        }
        reconcile_missing_files_in_tx(conn, room_id, &observed)
    })
}
