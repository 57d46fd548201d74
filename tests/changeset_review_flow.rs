use livepaste::db;
use livepaste::db::{ChangeCreate, ChangeStatus, ChangesetCreate, ChangesetStatus, FileUpsert};
use livepaste::error::Error;

fn seed_room(conn: &rusqlite::Connection) {
    db::ensure_room(conn, "RM000001").expect("ensure");
    for hash in ["g1", "g2"] {
        db::upsert_file(
            conn,
            "RM000001",
            &FileUpsert {
                path_hash: hash.to_string(),
                path_encrypted: format!("enc:{hash}"),
                content_encrypted: Some(format!("old:{hash}")),
                is_syncable: true,
                size_bytes: 0,
            },
        )
        .expect("seed file");
    }
}

fn proposal() -> ChangesetCreate {
    ChangesetCreate {
        author_encrypted: "enc:author".to_string(),
        message_encrypted: "enc:message".to_string(),
        changes: vec![
            ChangeCreate {
                file_path_encrypted: "enc:g1".to_string(),
                file_path_hash: "g1".to_string(),
                old_content_encrypted: Some("old:g1".to_string()),
                new_content_encrypted: "new:g1".to_string(),
                diff_encrypted: Some("diff:g1".to_string()),
            },
            ChangeCreate {
                file_path_encrypted: "enc:g2".to_string(),
                file_path_hash: "g2".to_string(),
                old_content_encrypted: Some("old:g2".to_string()),
                new_content_encrypted: "new:g2".to_string(),
                diff_encrypted: Some("diff:g2".to_string()),
            },
        ],
    }
}

#[test]
fn accepting_a_single_change_leaves_the_changeset_partial() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    seed_room(&conn);

    let changeset = db::create_changeset(&conn, "RM000001", &proposal()).expect("create");
    assert_eq!(changeset.status, ChangesetStatus::Pending);
    assert_eq!(changeset.changes.len(), 2);
    assert!(changeset.resolved_at_ms.is_none());

    let c1 = changeset
        .changes
        .iter()
        .find(|c| c.file_path_hash == "g1")
        .expect("c1");

    let resolution = db::resolve_change(&conn, "RM000001", &c1.id, true).expect("accept c1");
    assert_eq!(resolution.change_status, ChangeStatus::Accepted);
    assert_eq!(resolution.changeset_status, ChangesetStatus::Partial);

    let reread = db::read_changeset(&conn, "RM000001", &changeset.id).expect("reread");
    assert_eq!(reread.status, ChangesetStatus::Partial);
    assert!(reread.resolved_at_ms.is_some());
    let c2 = reread
        .changes
        .iter()
        .find(|c| c.file_path_hash == "g2")
        .expect("c2");
    assert_eq!(c2.status, ChangeStatus::Pending);

    // g1 took the proposed content; g2 is untouched.
    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    let g1 = state.files.iter().find(|f| f.path_hash == "g1").expect("g1");
    let g2 = state.files.iter().find(|f| f.path_hash == "g2").expect("g2");
    assert_eq!(g1.content_encrypted.as_deref(), Some("new:g1"));
    assert_eq!(g2.content_encrypted.as_deref(), Some("old:g2"));

    // The partially resolved changeset still shows up for review.
    assert_eq!(state.changesets.len(), 1);
    assert_eq!(state.changesets[0].status, ChangesetStatus::Partial);
}

#[test]
fn accepting_the_whole_changeset_applies_every_pending_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    seed_room(&conn);

    let changeset = db::create_changeset(&conn, "RM000001", &proposal()).expect("create");
    let accepted = db::accept_changeset(&conn, "RM000001", &changeset.id).expect("accept");

    assert_eq!(accepted.status, ChangesetStatus::Accepted);
    assert!(accepted.resolved_at_ms.is_some());
    assert!(accepted
        .changes
        .iter()
        .all(|c| c.status == ChangeStatus::Accepted));

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    for file in &state.files {
        assert_eq!(
            file.content_encrypted.as_deref(),
            Some(format!("new:{}", file.path_hash).as_str())
        );
    }
    // Seeds took versions 1-2, the changeset row 3, the two acceptance
    // upserts 4 and 5.
    let mut versions: Vec<i64> = state.files.iter().map(|f| f.version).collect();
    versions.sort();
    assert_eq!(versions, vec![4, 5]);
    assert!(state.changesets.is_empty());
}

#[test]
fn rejecting_the_whole_changeset_touches_no_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    seed_room(&conn);

    let changeset = db::create_changeset(&conn, "RM000001", &proposal()).expect("create");
    let rejected = db::reject_changeset(&conn, "RM000001", &changeset.id).expect("reject");

    assert_eq!(rejected.status, ChangesetStatus::Rejected);
    assert!(rejected
        .changes
        .iter()
        .all(|c| c.status == ChangeStatus::Rejected));

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    for file in &state.files {
        assert_eq!(
            file.content_encrypted.as_deref(),
            Some(format!("old:{}", file.path_hash).as_str())
        );
    }
    assert!(state.changesets.is_empty());
}

#[test]
fn resolved_changesets_reject_further_global_transitions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    seed_room(&conn);

    let changeset = db::create_changeset(&conn, "RM000001", &proposal()).expect("create");
    db::accept_changeset(&conn, "RM000001", &changeset.id).expect("accept");

    assert!(matches!(
        db::accept_changeset(&conn, "RM000001", &changeset.id),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        db::reject_changeset(&conn, "RM000001", &changeset.id),
        Err(Error::Validation(_))
    ));

    let unknown = db::accept_changeset(&conn, "RM000001", "no-such-changeset");
    assert!(matches!(unknown, Err(Error::NotFound(_))));
}

#[test]
fn acceptance_is_last_writer_wins_against_direct_edits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let conn = db::open(&dir.path().join("livepaste.sqlite3")).expect("open");
    seed_room(&conn);

    let changeset = db::create_changeset(&conn, "RM000001", &proposal()).expect("create");

    // A direct write races in before the review lands.
    db::upsert_file(
        &conn,
        "RM000001",
        &FileUpsert {
            path_hash: "g1".to_string(),
            path_encrypted: "enc:g1".to_string(),
            content_encrypted: Some("racing".to_string()),
            is_syncable: true,
            size_bytes: 0,
        },
    )
    .expect("racing upsert");

    db::accept_changeset(&conn, "RM000001", &changeset.id).expect("accept");

    let state = db::room_state(&conn, "RM000001", 0, 1000, 0).expect("state");
    let g1 = state.files.iter().find(|f| f.path_hash == "g1").expect("g1");
    assert_eq!(g1.content_encrypted.as_deref(), Some("new:g1"));
}
