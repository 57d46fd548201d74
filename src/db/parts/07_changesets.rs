#[derive(Clone, Debug, Serialize)]
pub struct ChangeResolution {
    pub change_status: ChangeStatus,
    pub changeset_status: ChangesetStatus,
    pub room_version: i64,
}

fn read_changes(conn: &Connection, changeset_id: &str) -> Result<Vec<Change>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, changeset_id, file_path_encrypted, file_path_hash,
                  old_content_encrypted, new_content_encrypted, diff_encrypted,
                  status, created_at
           FROM changes
           WHERE changeset_id = ?1
           ORDER BY created_at ASC, id ASC"#,
    )?;
    let mut rows = stmt.query(params![changeset_id])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let status: String = row.get(7)?;
        out.push(Change {
            id: row.get(0)?,
            changeset_id: row.get(1)?,
            file_path_encrypted: row.get(2)?,
            file_path_hash: row.get(3)?,
            old_content_encrypted: row.get(4)?,
            new_content_encrypted: row.get(5)?,
            diff_encrypted: row.get(6)?,
            status: ChangeStatus::parse(&status)?,
            created_at_ms: row.get(8)?,
        });
    }
    Ok(out)
}

pub fn read_changeset(conn: &Connection, room_id: &str, changeset_id: &str) -> Result<Changeset> {
    let row = conn
        .query_row(
            r#"SELECT id, author_encrypted, message_encrypted, status, created_at, resolved_at
               FROM changesets
               WHERE room_id = ?1 AND id = ?2"#,
            params![room_id, changeset_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, author_encrypted, message_encrypted, status, created_at_ms, resolved_at_ms)) = row
    else {
        return Err(Error::NotFound(format!("changeset not found: {changeset_id}")));
    };

    let changes = read_changes(conn, &id)?;
    Ok(Changeset {
        id,
        author_encrypted,
        message_encrypted,
        status: ChangesetStatus::parse(&status)?,
        created_at_ms,
        resolved_at_ms,
        changes,
    })
}

/// Changesets that still need attention in a state read: fully pending ones,
/// plus partially resolved ones that still carry a pending change.
pub fn list_open_changesets(conn: &Connection, room_id: &str) -> Result<Vec<Changeset>> {
    let mut stmt = conn.prepare(
        r#"SELECT id FROM changesets
           WHERE room_id = ?1
             AND (status = 'pending'
                  OR (status = 'partial' AND EXISTS (
                        SELECT 1 FROM changes
                        WHERE changes.changeset_id = changesets.id AND changes.status = 'pending')))
           ORDER BY created_at ASC, id ASC"#,
    )?;
    let mut rows = stmt.query(params![room_id])?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        ids.push(row.get::<_, String>(0)?);
    }

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(read_changeset(conn, room_id, &id)?);
    }
    Ok(out)
}

pub fn create_changeset(
    conn: &Connection,
    room_id: &str,
    create: &ChangesetCreate,
) -> Result<Changeset> {
    if create.changes.is_empty() {
        return Err(Error::Validation(
            "changeset requires at least one change".to_string(),
        ));
    }
    for change in &create.changes {
        if change.file_path_hash.trim().is_empty() {
            return Err(Error::Validation("missing file_path_hash".to_string()));
        }
        if change.file_path_encrypted.is_empty() {
            return Err(Error::Validation("missing file_path_encrypted".to_string()));
        }
    }

    with_immediate_tx(conn, |conn| {
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();

        conn.execute(
            r#"INSERT INTO changesets (id, room_id, author_encrypted, message_encrypted, status, created_at)
               VALUES (?1, ?2, ?3, ?4, 'pending', ?5)"#,
            params![id, room_id, create.author_encrypted, create.message_encrypted, now],
        )?;

        for change in &create.changes {
            conn.execute(
                r#"INSERT INTO changes
                   (id, changeset_id, file_path_encrypted, file_path_hash,
                    old_content_encrypted, new_content_encrypted, diff_encrypted, status, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8)"#,
                params![
                    uuid::Uuid::new_v4().to_string(),
                    id,
                    change.file_path_encrypted,
                    change.file_path_hash,
                    change.old_content_encrypted,
                    change.new_content_encrypted,
                    change.diff_encrypted,
                    now
                ],
            )?;
        }

        bump_room_version(conn, room_id)?;
        read_changeset(conn, room_id, &id)
    })
}

fn apply_change_to_file(conn: &Connection, room_id: &str, change: &Change) -> Result<()> {
    let upsert = FileUpsert {
        path_hash: change.file_path_hash.clone(),
        path_encrypted: change.file_path_encrypted.clone(),
        content_encrypted: Some(change.new_content_encrypted.clone()),
        is_syncable: true,
        size_bytes: 0,
    };
    let version = bump_room_version(conn, room_id)?;
    upsert_file_in_tx(conn, room_id, &upsert, version)?;
    Ok(())
}

/// Accepts every still-pending change: each target file is upserted with the
/// proposed content (last writer wins against direct edits), then the whole
/// changeset is marked accepted.
pub fn accept_changeset(conn: &Connection, room_id: &str, changeset_id: &str) -> Result<Changeset> {
    with_immediate_tx(conn, |conn| {
        let changeset = read_changeset(conn, room_id, changeset_id)?;
        if matches!(
            changeset.status,
            ChangesetStatus::Accepted | ChangesetStatus::Rejected
        ) {
            return Err(Error::Validation(format!(
                "changeset already resolved: {changeset_id}"
            )));
        }

        for change in &changeset.changes {
            if change.status != ChangeStatus::Pending {
                continue;
            }
            apply_change_to_file(conn, room_id, change)?;
            conn.execute(
                r#"UPDATE changes SET status = 'accepted' WHERE id = ?1"#,
                params![change.id],
            )?;
        }

        conn.execute(
            r#"UPDATE changesets SET status = 'accepted', resolved_at = ?2 WHERE id = ?1"#,
            params![changeset_id, now_ms()],
        )?;

        read_changeset(conn, room_id, changeset_id)
    })
}

/// Rejects every still-pending change and closes the changeset. Files are
/// untouched.
pub fn reject_changeset(conn: &Connection, room_id: &str, changeset_id: &str) -> Result<Changeset> {
    with_immediate_tx(conn, |conn| {
        let changeset = read_changeset(conn, room_id, changeset_id)?;
        if matches!(
            changeset.status,
            ChangesetStatus::Accepted | ChangesetStatus::Rejected
        ) {
            return Err(Error::Validation(format!(
                "changeset already resolved: {changeset_id}"
            )));
        }

        conn.execute(
            r#"UPDATE changes SET status = 'rejected' WHERE changeset_id = ?1 AND status = 'pending'"#,
            params![changeset_id],
        )?;
        conn.execute(
            r#"UPDATE changesets SET status = 'rejected', resolved_at = ?2 WHERE id = ?1"#,
            params![changeset_id, now_ms()],
        )?;

        bump_room_version(conn, room_id)?;
        read_changeset(conn, room_id, changeset_id)
    })
}

/// Accepts or rejects one change. The first per-change resolution moves the
/// parent from pending to partial and stamps `resolved_at`; a globally
/// accepted or rejected parent never flips back.
pub fn resolve_change(
    conn: &Connection,
    room_id: &str,
    change_id: &str,
    accept: bool,
) -> Result<ChangeResolution> {
    with_immediate_tx(conn, |conn| {
        let changeset_id: Option<String> = conn
            .query_row(
                r#"SELECT c.changeset_id
                   FROM changes c
                   JOIN changesets cs ON cs.id = c.changeset_id
                   WHERE c.id = ?1 AND cs.room_id = ?2"#,
                params![change_id, room_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(changeset_id) = changeset_id else {
            return Err(Error::NotFound(format!("change not found: {change_id}")));
        };

        let changeset = read_changeset(conn, room_id, &changeset_id)?;
        let change = changeset
            .changes
            .iter()
            .find(|c| c.id == change_id)
            .ok_or_else(|| Error::NotFound(format!("change not found: {change_id}")))?;
        if change.status != ChangeStatus::Pending {
            return Err(Error::Validation(format!(
                "change already resolved: {change_id}"
            )));
        }

        let change_status = if accept {
            apply_change_to_file(conn, room_id, change)?;
            ChangeStatus::Accepted
        } else {
            bump_room_version(conn, room_id)?;
            ChangeStatus::Rejected
        };
        conn.execute(
            r#"UPDATE changes SET status = ?2 WHERE id = ?1"#,
            params![change_id, change_status.as_str()],
        )?;

        let changeset_status = if changeset.status == ChangesetStatus::Pending {
            conn.execute(
                r#"UPDATE changesets SET status = 'partial', resolved_at = ?2 WHERE id = ?1"#,
                params![changeset_id, now_ms()],
            )?;
            ChangesetStatus::Partial
        } else {
            changeset.status
        };

        Ok(ChangeResolution {
            change_status,
            changeset_status,
            room_version: room_version(conn, room_id)?,
        })
    })
}
