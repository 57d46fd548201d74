use std::collections::BTreeMap;

use livepaste::db;
use livepaste::db::FileUpsert;

fn payload(path_hash: &str, content: &str) -> FileUpsert {
    FileUpsert {
        path_hash: path_hash.to_string(),
        path_encrypted: format!("enc:{path_hash}"),
        content_encrypted: Some(content.to_string()),
        is_syncable: true,
        size_bytes: 0,
    }
}

/// What a polling client does with a state response: replace by path_hash,
/// drop tombstoned paths, page until has_more clears.
fn apply_delta(
    conn: &rusqlite::Connection,
    cache: &mut BTreeMap<String, String>,
    since: i64,
    page_size: i64,
) {
    let mut offset = 0;
    loop {
        let page = db::room_state(conn, "RM000001", since, page_size, offset).expect("state page");
        let fetched = page.files.len() as i64;
        for file in page.files {
            cache.insert(
                file.path_hash,
                file.content_encrypted.unwrap_or_default(),
            );
        }
        for hash in page.deleted_path_hashes {
            cache.remove(&hash);
        }
        if !page.has_more {
            break;
        }
        offset += fetched;
    }
}

fn full_scan(conn: &rusqlite::Connection) -> BTreeMap<String, String> {
    let mut fresh = BTreeMap::new();
    apply_delta(conn, &mut fresh, 0, 3);
    fresh
}

#[test]
fn delta_since_n_converges_to_a_fresh_fetch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    for i in 0..8 {
        db::upsert_file(&conn, "RM000001", &payload(&format!("h{i}"), &format!("v1-{i}")))
            .expect("seed");
    }

    // Client pulls everything and remembers the room version.
    let mut cache = BTreeMap::new();
    apply_delta(&conn, &mut cache, 0, 3);
    let checkpoint = db::room_version(&conn, "RM000001").expect("version");
    assert_eq!(cache.len(), 8);

    // Server moves on: edits, a new file, two deletions.
    db::upsert_file(&conn, "RM000001", &payload("h2", "v2-2")).expect("edit h2");
    db::upsert_file(&conn, "RM000001", &payload("h9", "v1-9")).expect("new h9");
    for hash in ["h4", "h6"] {
        let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
        let id = state
            .files
            .iter()
            .find(|f| f.path_hash == hash)
            .expect("file")
            .id
            .clone();
        db::delete_file(&conn, "RM000001", &id).expect("delete");
    }

    // Catch-up from the checkpoint must equal a from-scratch fetch.
    apply_delta(&conn, &mut cache, checkpoint, 3);
    assert_eq!(cache, full_scan(&conn));
    assert_eq!(cache.len(), 7);
    assert!(!cache.contains_key("h4"));
    assert_eq!(cache.get("h2").map(String::as_str), Some("v2-2"));
}

#[test]
fn single_shot_sync_matches_the_chunked_outcome() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    for hash in ["x", "y", "z"] {
        db::upsert_file(&conn, "RM000001", &payload(hash, "seed")).expect("seed");
    }

    let upload = vec![payload("x", "kept"), payload("w", "fresh")];
    let result = db::sync_replace(&conn, "RM000001", &upload).expect("sync");

    let mut deleted = result.deleted_path_hashes.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["y", "z"]);

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    let mut hashes: Vec<String> = state.files.iter().map(|f| f.path_hash.clone()).collect();
    hashes.sort();
    assert_eq!(hashes, vec!["w", "x"]);

    // One bump for the upserts, one for the reconciliation.
    assert_eq!(result.version, 3 + 2);
}

#[test]
fn empty_single_shot_sync_clears_the_room() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    db::upsert_file(&conn, "RM000001", &payload("x", "seed")).expect("seed");

    let result = db::sync_replace(&conn, "RM000001", &[]).expect("sync");
    assert_eq!(result.deleted_path_hashes, vec!["x".to_string()]);

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    assert!(state.files.is_empty());
}
