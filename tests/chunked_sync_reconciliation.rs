use livepaste::db;
use livepaste::db::FileUpsert;
use livepaste::session::SessionRegistry;

fn payload(path_hash: &str) -> FileUpsert {
    FileUpsert {
        path_hash: path_hash.to_string(),
        path_encrypted: format!("enc:{path_hash}"),
        content_encrypted: Some(format!("content:{path_hash}")),
        is_syncable: true,
        size_bytes: 0,
    }
}

#[test]
fn complete_deletes_files_missing_from_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    // Pre-state: files x, y, z.
    for hash in ["x", "y", "z"] {
        db::upsert_file(&conn, "RM000001", &payload(hash)).expect("seed");
    }
    let pre_version = db::room_version(&conn, "RM000001").expect("version");
    assert_eq!(pre_version, 3);

    let registry = SessionRegistry::new();
    let token = registry.begin("RM000001", "client-a", 2, 4).expect("begin");

    // Chunk 0 carries {x, new: w}; chunk 1 carries {y}.
    let chunk0 = vec![payload("x"), payload("w")];
    db::apply_sync_chunk(&conn, "RM000001", &chunk0).expect("chunk 0");
    registry
        .record_chunk(&token, "RM000001", 0, chunk0.iter().map(|f| f.path_hash.clone()))
        .expect("record 0");

    let chunk1 = vec![payload("y")];
    db::apply_sync_chunk(&conn, "RM000001", &chunk1).expect("chunk 1");
    let progress = registry
        .record_chunk(&token, "RM000001", 1, chunk1.iter().map(|f| f.path_hash.clone()))
        .expect("record 1");
    assert_eq!(progress.chunks_remaining, 0);

    let session = registry.complete(&token, "RM000001").expect("complete");
    let result =
        db::reconcile_missing_files(&conn, "RM000001", &session.path_hashes).expect("reconcile");

    // One bump per chunk plus one for the reconciliation.
    assert_eq!(result.version, pre_version + 3);
    assert_eq!(result.deleted_path_hashes, vec!["z".to_string()]);

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    let mut hashes: Vec<String> = state.files.iter().map(|f| f.path_hash.clone()).collect();
    hashes.sort();
    assert_eq!(hashes, vec!["w", "x", "y"]);

    let delta = db::room_state(&conn, "RM000001", pre_version, 1000, 0).expect("delta");
    assert_eq!(delta.deleted_path_hashes, vec!["z".to_string()]);
}

#[test]
fn complete_without_missing_files_keeps_the_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    db::upsert_file(&conn, "RM000001", &payload("x")).expect("seed");
    let pre_version = db::room_version(&conn, "RM000001").expect("version");

    let registry = SessionRegistry::new();
    let token = registry.begin("RM000001", "client-a", 1, 1).expect("begin");
    let chunk = vec![payload("x")];
    db::apply_sync_chunk(&conn, "RM000001", &chunk).expect("chunk");
    registry
        .record_chunk(&token, "RM000001", 0, chunk.iter().map(|f| f.path_hash.clone()))
        .expect("record");

    let session = registry.complete(&token, "RM000001").expect("complete");
    let result =
        db::reconcile_missing_files(&conn, "RM000001", &session.path_hashes).expect("reconcile");

    // The chunk bumped once; the no-op reconciliation must not.
    assert_eq!(result.version, pre_version + 1);
    assert!(result.deleted_path_hashes.is_empty());
}

#[test]
fn abandoned_session_leaves_partial_upserts_visible() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    db::ensure_room(&conn, "RM000001").expect("ensure");

    db::upsert_file(&conn, "RM000001", &payload("old")).expect("seed");

    let registry = SessionRegistry::new();
    let token = registry.begin("RM000001", "client-a", 2, 2).expect("begin");
    let chunk = vec![payload("new")];
    db::apply_sync_chunk(&conn, "RM000001", &chunk).expect("chunk");
    registry
        .record_chunk(&token, "RM000001", 0, chunk.iter().map(|f| f.path_hash.clone()))
        .expect("record");

    // No complete: nothing is reconciled away.
    drop(registry);
    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    let mut hashes: Vec<String> = state.files.iter().map(|f| f.path_hash.clone()).collect();
    hashes.sort();
    assert_eq!(hashes, vec!["new", "old"]);
}
