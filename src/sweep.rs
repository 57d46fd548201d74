use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use tokio::task::JoinHandle;

use crate::db;
use crate::session::SessionRegistry;

pub const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Hourly retention pass: drops rooms idle past `retention_hours`, then
/// prunes tombstones that fell behind the pruning horizon.
pub fn spawn_retention_sweep(
    conn: Arc<Mutex<Connection>>,
    retention_hours: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;

            let conn = conn.clone();
            let result = tokio::task::spawn_blocking(move || {
                let conn = conn
                    .lock()
                    .map_err(|_| crate::error::Error::Internal("poisoned store lock".to_string()))?;
                run_retention_pass(&conn, retention_hours)
            })
            .await;

            match result {
                Ok(Ok((rooms, tombstones))) => {
                    if rooms > 0 || tombstones > 0 {
                        tracing::info!(rooms, tombstones, "retention sweep removed stale rows");
                    }
                }
                Ok(Err(e)) => tracing::error!("retention sweep failed: {e}"),
                Err(e) => tracing::error!("retention sweep task failed: {e}"),
            }
        }
    })
}

pub fn run_retention_pass(
    conn: &Connection,
    retention_hours: u64,
) -> crate::error::Result<(u64, u64)> {
    let cutoff_ms = db::retention_cutoff_ms(retention_hours);
    let rooms = db::sweep_expired_rooms(conn, cutoff_ms)?;
    let tombstones = db::prune_tombstones(conn, db::TOMBSTONE_HORIZON)?;
    Ok((rooms, tombstones))
}

/// Evicts upload sessions idle past their TTL once a minute.
pub fn spawn_session_sweep(sessions: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let dropped = sessions.sweep_expired();
            if dropped > 0 {
                tracing::info!(dropped, "expired sync sessions discarded");
            }
        }
    })
}
