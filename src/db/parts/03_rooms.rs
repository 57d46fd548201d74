const ROOM_ID_ALPHABET: &[u8; 62] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub fn generate_room_id() -> String {
    use rand::Rng;

    let mut rng = rand::thread_rng();
    (0..ROOM_ID_LEN)
        .map(|_| ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())] as char)
        .collect()
}

/// Idempotent lazy room creation.
pub fn ensure_room(conn: &Connection, room_id: &str) -> Result<()> {
    let now = now_ms();
    conn.execute(
        r#"INSERT OR IGNORE INTO rooms (id, version, op_seq, created_at, updated_at)
           VALUES (?1, 0, 0, ?2, ?2)"#,
        params![room_id, now],
    )?;
    Ok(())
}

pub fn room_exists(conn: &Connection, room_id: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        r#"SELECT COUNT(*) FROM rooms WHERE id = ?1"#,
        params![room_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn room_info(conn: &Connection, room_id: &str) -> Result<RoomInfo> {
    conn.query_row(
        r#"SELECT id, version, op_seq, password_hash IS NOT NULL FROM rooms WHERE id = ?1"#,
        params![room_id],
        |row| {
            Ok(RoomInfo {
                id: row.get(0)?,
                version: row.get(1)?,
                op_seq: row.get(2)?,
                has_password: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("room not found: {room_id}")))
}

pub fn room_version(conn: &Connection, room_id: &str) -> Result<i64> {
    conn.query_row(
        r#"SELECT version FROM rooms WHERE id = ?1"#,
        params![room_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("room not found: {room_id}")))
}

/// Advances the room version by one and returns the new value. Every caller
/// runs inside an immediate transaction, so reads-back are race-free.
fn bump_room_version(conn: &Connection, room_id: &str) -> Result<i64> {
    let updated = conn.execute(
        r#"UPDATE rooms SET version = version + 1, updated_at = ?2 WHERE id = ?1"#,
        params![room_id, now_ms()],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("room not found: {room_id}")));
    }
    room_version(conn, room_id)
}

/// Kill switch. Cascade removes files, operations, tombstones and changesets.
pub fn delete_room(conn: &Connection, room_id: &str) -> Result<()> {
    let deleted = conn.execute(r#"DELETE FROM rooms WHERE id = ?1"#, params![room_id])?;
    if deleted == 0 {
        return Err(Error::NotFound(format!("room not found: {room_id}")));
    }
    Ok(())
}

pub fn room_password(conn: &Connection, room_id: &str) -> Result<Option<StoredPassword>> {
    let row = conn
        .query_row(
            r#"SELECT password_hash, password_salt, password_m_cost, password_t_cost, password_p_cost
               FROM rooms WHERE id = ?1"#,
            params![room_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<u32>>(3)?,
                    row.get::<_, Option<u32>>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((hash, salt, m_cost, t_cost, p_cost)) = row else {
        return Err(Error::NotFound(format!("room not found: {room_id}")));
    };

    match (hash, salt, m_cost, t_cost, p_cost) {
        (Some(hash_b64), Some(salt_b64), Some(m_cost_kib), Some(t_cost), Some(p_cost)) => {
            Ok(Some(StoredPassword {
                hash_b64,
                salt_b64,
                kdf: KdfParams {
                    m_cost_kib,
                    t_cost,
                    p_cost,
                },
            }))
        }
        _ => Ok(None),
    }
}

pub fn set_room_password(conn: &Connection, room_id: &str, stored: &StoredPassword) -> Result<()> {
    let updated = conn.execute(
        r#"UPDATE rooms
           SET password_hash = ?2,
               password_salt = ?3,
               password_m_cost = ?4,
               password_t_cost = ?5,
               password_p_cost = ?6,
               updated_at = ?7
           WHERE id = ?1"#,
        params![
            room_id,
            stored.hash_b64,
            stored.salt_b64,
            stored.kdf.m_cost_kib,
            stored.kdf.t_cost,
            stored.kdf.p_cost,
            now_ms()
        ],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("room not found: {room_id}")));
    }
    Ok(())
}

pub fn clear_room_password(conn: &Connection, room_id: &str) -> Result<()> {
    let updated = conn.execute(
        r#"UPDATE rooms
           SET password_hash = NULL,
               password_salt = NULL,
               password_m_cost = NULL,
               password_t_cost = NULL,
               password_p_cost = NULL,
               updated_at = ?2
           WHERE id = ?1"#,
        params![room_id, now_ms()],
    )?;
    if updated == 0 {
        return Err(Error::NotFound(format!("room not found: {room_id}")));
    }
    Ok(())
}

pub fn retention_cutoff_ms(retention_hours: u64) -> i64 {
    now_ms() - (retention_hours as i64) * 60 * 60 * 1000
}

/// Retention sweep, step 1: drop rooms idle past the cutoff. Cascades take
/// all dependent rows with them.
pub fn sweep_expired_rooms(conn: &Connection, cutoff_ms: i64) -> Result<u64> {
    let deleted = conn.execute(
        r#"DELETE FROM rooms WHERE updated_at < ?1"#,
        params![cutoff_ms],
    )?;
    Ok(deleted as u64)
}

/// Retention sweep, step 2: prune tombstones that have fallen behind the
/// owning room's version by more than `horizon`.
pub fn prune_tombstones(conn: &Connection, horizon: i64) -> Result<u64> {
    let deleted = conn.execute(
        r#"DELETE FROM deleted_files
           WHERE deleted_at_version <
             (SELECT version FROM rooms WHERE rooms.id = deleted_files.room_id) - ?1"#,
        params![horizon],
    )?;
    Ok(deleted as u64)
}
