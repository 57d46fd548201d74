use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Hard expiry for an inactive upload session.
pub const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// One in-flight chunked upload. Node-local: if the process restarts
/// mid-session the client retries from `begin`, and the partial upserts stay
/// visible because no reconciling deletion ever ran.
#[derive(Debug)]
pub struct SyncSession {
    pub room_id: String,
    pub client_id: String,
    pub total_chunks: i64,
    pub total_files: i64,
    pub chunks_received: BTreeSet<i64>,
    pub path_hashes: BTreeSet<String>,
    pub started_at: Instant,
    pub last_activity: Instant,
}

#[derive(Clone, Debug)]
pub struct ChunkProgress {
    pub received_chunks: i64,
    pub chunks_remaining: i64,
}

pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SyncSession>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_ttl(SESSION_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SyncSession>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::Internal("poisoned session lock".to_string()))
    }

    pub fn begin(
        &self,
        room_id: &str,
        client_id: &str,
        total_chunks: i64,
        total_files: i64,
    ) -> Result<String> {
        let token = uuid::Uuid::new_v4().to_string();
        let now = Instant::now();

        let mut sessions = self.lock()?;
        sessions.insert(
            token.clone(),
            SyncSession {
                room_id: room_id.to_string(),
                client_id: client_id.to_string(),
                total_chunks,
                total_files,
                chunks_received: BTreeSet::new(),
                path_hashes: BTreeSet::new(),
                started_at: now,
                last_activity: now,
            },
        );
        Ok(token)
    }

    /// Confirms the token belongs to a live session for `room_id` without
    /// mutating it. Used before the chunk's store transaction runs.
    pub fn peek(&self, token: &str, room_id: &str) -> Result<()> {
        let mut sessions = self.lock()?;
        match sessions.get(token) {
            Some(session) if session.last_activity.elapsed() > self.ttl => {
                sessions.remove(token);
                Err(Error::SessionExpired)
            }
            Some(session) if session.room_id != room_id => Err(Error::SessionExpired),
            Some(_) => Ok(()),
            None => Err(Error::SessionExpired),
        }
    }

    /// Records a delivered chunk. Re-delivery of the same `chunk_index` only
    /// refreshes the path set, so progress counts stay idempotent.
    pub fn record_chunk(
        &self,
        token: &str,
        room_id: &str,
        chunk_index: i64,
        path_hashes: impl IntoIterator<Item = String>,
    ) -> Result<ChunkProgress> {
        let mut sessions = self.lock()?;
        let Some(session) = sessions.get_mut(token) else {
            return Err(Error::SessionExpired);
        };
        if session.last_activity.elapsed() > self.ttl {
            sessions.remove(token);
            return Err(Error::SessionExpired);
        }
        if session.room_id != room_id {
            return Err(Error::SessionExpired);
        }

        session.chunks_received.insert(chunk_index);
        session.path_hashes.extend(path_hashes);
        session.last_activity = Instant::now();

        let received_chunks = session.chunks_received.len() as i64;
        Ok(ChunkProgress {
            received_chunks,
            chunks_remaining: (session.total_chunks - received_chunks).max(0),
        })
    }

    /// Consumes the session for the final reconciliation pass.
    pub fn complete(&self, token: &str, room_id: &str) -> Result<SyncSession> {
        let mut sessions = self.lock()?;
        let Some(session) = sessions.remove(token) else {
            return Err(Error::SessionExpired);
        };
        if session.last_activity.elapsed() > self.ttl || session.room_id != room_id {
            return Err(Error::SessionExpired);
        }
        Ok(session)
    }

    pub fn sweep_expired(&self) -> usize {
        let Ok(mut sessions) = self.sessions.lock() else {
            return 0;
        };
        let before = sessions.len();
        let ttl = self.ttl;
        sessions.retain(|_, session| session.last_activity.elapsed() <= ttl);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_progress_is_idempotent_per_index() {
        let registry = SessionRegistry::new();
        let token = registry.begin("RM000001", "client-a", 3, 5).expect("begin");

        let p0 = registry
            .record_chunk(&token, "RM000001", 0, ["aa".to_string()])
            .expect("chunk 0");
        assert_eq!(p0.received_chunks, 1);
        assert_eq!(p0.chunks_remaining, 2);

        // Retry of the same chunk does not advance progress.
        let p0_again = registry
            .record_chunk(&token, "RM000001", 0, ["aa".to_string()])
            .expect("chunk 0 retry");
        assert_eq!(p0_again.received_chunks, 1);
        assert_eq!(p0_again.chunks_remaining, 2);

        let p1 = registry
            .record_chunk(&token, "RM000001", 1, ["bb".to_string(), "cc".to_string()])
            .expect("chunk 1");
        assert_eq!(p1.received_chunks, 2);
        assert_eq!(p1.chunks_remaining, 1);

        let session = registry.complete(&token, "RM000001").expect("complete");
        assert_eq!(session.path_hashes.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_token_and_wrong_room_fail() {
        let registry = SessionRegistry::new();
        let token = registry.begin("RM000001", "client-a", 1, 1).expect("begin");

        assert!(matches!(
            registry.peek("no-such-token", "RM000001"),
            Err(Error::SessionExpired)
        ));
        assert!(matches!(
            registry.peek(&token, "RM000002"),
            Err(Error::SessionExpired)
        ));
        assert!(registry.peek(&token, "RM000001").is_ok());
    }

    #[test]
    fn expired_sessions_are_swept() {
        let registry = SessionRegistry::with_ttl(Duration::ZERO);
        let _token = registry.begin("RM000001", "client-a", 1, 1).expect("begin");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.sweep_expired(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn expired_token_rejected_on_use() {
        let registry = SessionRegistry::with_ttl(Duration::ZERO);
        let token = registry.begin("RM000001", "client-a", 1, 1).expect("begin");
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            registry.record_chunk(&token, "RM000001", 0, std::iter::empty::<String>()),
            Err(Error::SessionExpired)
        ));
    }
}
