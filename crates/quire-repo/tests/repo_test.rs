//! End-to-end behaviour of the repository service over in-memory and
//! file-backed stores.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use quire_crypto::{SignError, Signature, Signer, SigningKey};
use quire_lexicon::Catalog;
use quire_repo::{CompactionMode, ErrorKind, RepoConfig, RepoError, RepoService, WriteRecord, WriteResult};
use quire_types::{Did, OpContext};

const NOTE: &str = "com.example.note";

const NOTE_SCHEMA: &str = r##"{
  "lexicon": 1,
  "id": "com.example.note",
  "defs": {
    "main": {
      "type": "record",
      "key": "any",
      "record": {
        "type": "object",
        "required": ["text"],
        "properties": {
          "text": {"type": "string", "maxLength": 200},
          "pinned": {"type": "boolean"}
        }
      }
    }
  }
}"##;

fn catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog.add_json(NOTE, NOTE_SCHEMA).unwrap();
    catalog
}

fn service() -> RepoService {
    RepoService::in_memory(RepoConfig::default(), catalog()).unwrap()
}

fn did(name: &str) -> Did {
    Did::new(format!("did:example:{name}")).unwrap()
}

fn ctx() -> OpContext {
    OpContext::background()
}

fn note(text: &str) -> Vec<u8> {
    format!(r#"{{"text":"{text}"}}"#).into_bytes()
}

fn put(svc: &RepoService, who: &Did, rkey: &str, text: &str, key: &SigningKey) -> WriteResult {
    let value = note(text);
    svc.put_record(who, WriteRecord::new(NOTE, &value).rkey(rkey), key, &ctx())
        .unwrap()
}

fn texts(svc: &RepoService, who: &Did) -> Vec<(String, Vec<u8>)> {
    svc.list_records(who, NOTE, 100, None)
        .unwrap()
        .records
        .into_iter()
        .map(|r| (r.uri.path.rkey().to_string(), r.value))
        .collect()
}

struct UnavailableSigner;

impl Signer for UnavailableSigner {
    fn key_id(&self) -> String {
        "ed25519:offline".into()
    }

    fn sign(&self, _message: &[u8]) -> Result<Signature, SignError> {
        Err(SignError::Unavailable("hsm offline".into()))
    }
}

/// Holds the write lease long enough for a competing writer to collide.
struct SlowSigner(SigningKey);

impl Signer for SlowSigner {
    fn key_id(&self) -> String {
        self.0.key_id()
    }

    fn sign(&self, message: &[u8]) -> Result<Signature, SignError> {
        thread::sleep(Duration::from_millis(300));
        self.0.sign(message)
    }
}

// -----------------------------------------------------------------------
// Records
// -----------------------------------------------------------------------

#[test]
fn record_lifecycle() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let first = note("first");

    let created = svc
        .create_record(&alice, WriteRecord::new(NOTE, &first).rkey("a1"), &key, &ctx())
        .unwrap();
    assert_eq!(created.version, 1);
    assert_eq!(created.uri.to_string(), "at://did:example:alice/com.example.note/a1");

    let got = svc.get_record(&alice, NOTE, "a1").unwrap();
    assert_eq!(got.value, first);
    assert_eq!(Some(got.cid), created.cid);

    let second = note("second");
    let updated = svc
        .update_record(&alice, WriteRecord::new(NOTE, &second).rkey("a1"), &key, &ctx())
        .unwrap();
    assert_eq!(updated.version, 2);
    assert!(updated.rev > created.rev);
    assert_eq!(svc.get_record(&alice, NOTE, "a1").unwrap().value, second);

    let deleted = svc.delete_record(&alice, NOTE, "a1", &key, &ctx()).unwrap();
    assert_eq!(deleted.cid, None);
    let err = svc.get_record(&alice, NOTE, "a1").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let info = svc.get_repository(&alice).unwrap();
    assert_eq!(info.record_count, 0);
    assert_eq!(info.head.unwrap().version, 3);
}

#[test]
fn duplicate_create_is_a_conflict() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let value = note("once");
    let write = WriteRecord::new(NOTE, &value).rkey("k");

    svc.create_record(&alice, write, &key, &ctx()).unwrap();
    let err = svc.create_record(&alice, write, &key, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(svc.get_repository(&alice).unwrap().head.unwrap().version, 1);
}

#[test]
fn update_and_delete_need_an_existing_record() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let value = note("ghost");

    let err = svc
        .update_record(&alice, WriteRecord::new(NOTE, &value).rkey("nope"), &key, &ctx())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = svc.delete_record(&alice, NOTE, "nope", &key, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn created_keys_default_to_increasing_tids() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let value = note("auto");

    let a = svc.create_record(&alice, WriteRecord::new(NOTE, &value), &key, &ctx()).unwrap();
    let b = svc.create_record(&alice, WriteRecord::new(NOTE, &value), &key, &ctx()).unwrap();
    let (ka, kb) = (a.uri.path.rkey().to_string(), b.uri.path.rkey().to_string());
    assert_eq!(ka.len(), 13);
    assert!(kb > ka);

    let listed: Vec<String> = texts(&svc, &alice).into_iter().map(|(k, _)| k).collect();
    assert_eq!(listed, vec![ka, kb]);
}

#[test]
fn listing_pages_by_record_key() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    for rkey in ["c", "a", "b", "d"] {
        put(&svc, &alice, rkey, rkey, &key);
    }

    let first = svc.list_records(&alice, NOTE, 3, None).unwrap();
    let keys: Vec<&str> = first.records.iter().map(|r| r.uri.path.rkey()).collect();
    assert_eq!(keys, ["a", "b", "c"]);
    let cursor = first.cursor.unwrap();
    assert_eq!(cursor, "c");

    let rest = svc.list_records(&alice, NOTE, 3, Some(&cursor)).unwrap();
    let keys: Vec<&str> = rest.records.iter().map(|r| r.uri.path.rkey()).collect();
    assert_eq!(keys, ["d"]);

    let other = svc.list_records(&alice, "com.example.other", 10, None).unwrap();
    assert!(other.records.is_empty());
}

#[test]
fn invalid_record_names_the_field() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let value = br#"{"pinned":true}"#.to_vec();

    let err = svc
        .create_record(&alice, WriteRecord::new(NOTE, &value).rkey("bad"), &key, &ctx())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    assert!(err.to_string().contains("required field missing: text"), "{err}");
    assert!(!svc.has_repository(&alice) || svc.get_repository(&alice).unwrap().head.is_none());

    svc.create_record(
        &alice,
        WriteRecord::new(NOTE, &value).rkey("bad").skip_validation(),
        &key,
        &ctx(),
    )
    .unwrap();
}

#[test]
fn unknown_declared_type_is_not_found() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let value = note("x");

    let err = svc
        .create_record(
            &alice,
            WriteRecord::new("com.example.unknown", &value).rkey("x"),
            &key,
            &ctx(),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    match &err {
        RepoError::SchemaNotFound { schema, .. } => assert_eq!(schema, "com.example.unknown"),
        other => panic!("unexpected {other:?}"),
    }

    // Without validation the collection needs no schema.
    svc.create_record(
        &alice,
        WriteRecord::new("com.example.unknown", &value).rkey("x").skip_validation(),
        &key,
        &ctx(),
    )
    .unwrap();
}

#[test]
fn oversized_records_are_rejected_before_any_commit() {
    let mut config = RepoConfig::default();
    config.max_record_bytes = 64;
    let svc = RepoService::in_memory(config, catalog()).unwrap();
    let alice = did("alice");
    let key = SigningKey::generate();
    put(&svc, &alice, "small", "fits", &key);
    let before = svc.get_repository(&alice).unwrap().head;

    let big = note(&"x".repeat(100));
    for write in [
        WriteRecord::new(NOTE, &big).rkey("big"),
        WriteRecord::new(NOTE, &big).rkey("big").skip_validation(),
    ] {
        let err = svc.put_record(&alice, write, &key, &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(matches!(err, RepoError::RecordTooLarge { limit: 64, .. }), "{err}");
    }
    let err = svc
        .update_record(&alice, WriteRecord::new(NOTE, &big).rkey("small"), &key, &ctx())
        .unwrap_err();
    assert!(matches!(err, RepoError::RecordTooLarge { .. }), "{err}");
    assert_eq!(svc.get_repository(&alice).unwrap().head, before);

    // Everything accepted stays exportable.
    svc.export_repository(&alice, None, &ctx()).unwrap();
}

#[test]
fn signer_failure_leaves_head_untouched() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    put(&svc, &alice, "keep", "kept", &key);
    let before = svc.get_repository(&alice).unwrap().head;

    let value = note("lost");
    let err = svc
        .put_record(&alice, WriteRecord::new(NOTE, &value).rkey("lost"), &UnavailableSigner, &ctx())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(svc.get_repository(&alice).unwrap().head, before);
    assert_eq!(
        svc.get_record(&alice, NOTE, "lost").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn cancelled_write_publishes_nothing() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let cancelled = OpContext::background();
    cancelled.cancel();
    let value = note("never");

    let err = svc
        .put_record(&alice, WriteRecord::new(NOTE, &value).rkey("n"), &key, &cancelled)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Interrupted);
    assert!(err.is_retryable());
}

#[test]
fn concurrent_writers_to_one_identity_get_one_success() {
    let svc = Arc::new(service());
    let alice = did("alice");
    svc.create_repository(&alice).unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let (svc, alice, barrier) = (Arc::clone(&svc), alice.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                let signer = SlowSigner(SigningKey::generate());
                let value = note("race");
                let rkey = format!("r{i}");
                barrier.wait();
                svc.put_record(&alice, WriteRecord::new(NOTE, &value).rkey(&rkey), &signer, &ctx())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(svc.get_repository(&alice).unwrap().head.unwrap().version, 1);
}

// -----------------------------------------------------------------------
// Repositories and commits
// -----------------------------------------------------------------------

#[test]
fn repository_create_list_delete() {
    let svc = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let key = SigningKey::generate();

    svc.create_repository(&bob).unwrap();
    assert_eq!(svc.create_repository(&bob).unwrap_err().kind(), ErrorKind::Conflict);
    put(&svc, &alice, "a", "hello", &key);

    let listed: Vec<Did> = svc.list_repositories().into_iter().map(|(d, _)| d).collect();
    assert_eq!(listed, vec![alice.clone(), bob.clone()]);

    svc.delete_repository(&alice, &ctx()).unwrap();
    assert!(!svc.has_repository(&alice));
    assert_eq!(svc.get_repository(&alice).unwrap_err().kind(), ErrorKind::NotFound);

    // The identity can start over.
    put(&svc, &alice, "a", "again", &key);
    assert_eq!(svc.get_repository(&alice).unwrap().head.unwrap().version, 1);
}

#[test]
fn delete_cannot_interleave_with_an_in_flight_write() {
    let svc = Arc::new(service());
    let alice = did("alice");
    let key = SigningKey::generate();
    put(&svc, &alice, "first", "before", &key);
    let barrier = Arc::new(Barrier::new(2));

    let writer = {
        let (svc, alice, barrier) = (Arc::clone(&svc), alice.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            let signer = SlowSigner(SigningKey::generate());
            let value = note("during");
            barrier.wait();
            svc.put_record(&alice, WriteRecord::new(NOTE, &value).rkey("second"), &signer, &ctx())
        })
    };
    barrier.wait();
    thread::sleep(Duration::from_millis(100));
    let err = svc.delete_repository(&alice, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    writer.join().unwrap().unwrap();

    // Identity, head and records agree.
    let info = svc.get_repository(&alice).unwrap();
    assert_eq!(info.head.unwrap().version, 2);
    assert_eq!(info.record_count, 2);
    assert_eq!(svc.get_record(&alice, NOTE, "second").unwrap().value, note("during"));

    svc.delete_repository(&alice, &ctx()).unwrap();
    assert_eq!(svc.get_repository(&alice).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(
        svc.get_record(&alice, NOTE, "second").unwrap_err().kind(),
        ErrorKind::NotFound
    );

    put(&svc, &alice, "third", "after", &key);
    let info = svc.get_repository(&alice).unwrap();
    assert_eq!((info.head.unwrap().version, info.record_count), (1, 1));
    assert_eq!(svc.verify_repository(&alice, &ctx()).unwrap(), 1);
}

#[test]
fn commits_list_newest_first_and_verify() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    for i in 0..3 {
        put(&svc, &alice, &format!("k{i}"), "v", &key);
    }

    let page = svc.list_commits(&alice, 2, None).unwrap();
    let versions: Vec<u64> = page.commits.iter().map(|c| c.commit.version()).collect();
    assert_eq!(versions, vec![3, 2]);
    let rest = svc.list_commits(&alice, 2, page.cursor).unwrap();
    assert_eq!(rest.commits.len(), 1);
    assert_eq!(rest.commits[0].commit.version(), 1);

    assert_eq!(svc.verify_repository(&alice, &ctx()).unwrap(), 3);
    let head = svc.verify_head(&alice, &key.verifying_key()).unwrap();
    assert_eq!(head.commit.version(), 3);

    let stranger = SigningKey::generate();
    let err = svc.verify_head(&alice, &stranger.verifying_key()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SignatureInvalid);
}

// -----------------------------------------------------------------------
// Export and import
// -----------------------------------------------------------------------

#[test]
fn full_export_reproduces_records_under_another_identity() {
    let svc = service();
    let (alice, mirror) = (did("alice"), did("mirror"));
    let key = SigningKey::generate();
    for (rkey, text) in [("a", "one"), ("b", "two"), ("c", "three")] {
        put(&svc, &alice, rkey, text, &key);
    }
    svc.delete_record(&alice, NOTE, "b", &key, &ctx()).unwrap();

    let archive = svc.export_repository(&alice, None, &ctx()).unwrap();
    let summary = svc.import_repository(&mirror, &archive, &ctx()).unwrap();
    assert_eq!(summary.commits, 4);

    assert_eq!(texts(&svc, &mirror), texts(&svc, &alice));
    assert_eq!(svc.verify_repository(&mirror, &ctx()).unwrap(), 4);
    let head = svc.get_repository(&mirror).unwrap().head.unwrap();
    assert_eq!(Some(head), svc.get_repository(&alice).unwrap().head);

    // Importing the same archive again changes nothing.
    let again = svc.import_repository(&mirror, &archive, &ctx()).unwrap();
    assert_eq!(again.commits, 0);
}

#[test]
fn import_into_a_separate_service() {
    let (source, target) = (service(), service());
    let alice = did("alice");
    let key = SigningKey::generate();
    put(&source, &alice, "a", "moved", &key);

    let archive = source.export_repository(&alice, None, &ctx()).unwrap();
    target.import_repository(&alice, &archive, &ctx()).unwrap();
    assert_eq!(target.get_record(&alice, NOTE, "a").unwrap().value, note("moved"));
    target.verify_head(&alice, &key.verifying_key()).unwrap();

    // The imported chain accepts further local commits.
    put(&target, &alice, "b", "local", &key);
    assert_eq!(target.verify_repository(&alice, &ctx()).unwrap(), 2);
}

#[test]
fn fresh_repository_exports_the_empty_marker() {
    let svc = service();
    let (alice, bob) = (did("alice"), did("bob"));
    svc.create_repository(&alice).unwrap();

    let archive = svc.export_repository(&alice, None, &ctx()).unwrap();
    let summary = svc.import_repository(&bob, &archive, &ctx()).unwrap();
    assert_eq!(summary.head, None);
    assert!(svc.has_repository(&bob));
    assert!(svc.get_repository(&bob).unwrap().head.is_none());
}

#[test]
fn tampered_archive_is_corruption() {
    let svc = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let key = SigningKey::generate();
    put(&svc, &alice, "a", "original", &key);

    let mut archive = svc.export_repository(&alice, None, &ctx()).unwrap();
    let last = archive.len() - 1;
    archive[last] ^= 0x01;

    let err = svc.import_repository(&bob, &archive, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corruption);
    assert!(svc.get_repository(&bob).map_or(true, |info| info.head.is_none()));
}

#[test]
fn incremental_export_fast_forwards_a_mirror() {
    let svc = service();
    let (alice, mirror) = (did("alice"), did("mirror"));
    let key = SigningKey::generate();
    put(&svc, &alice, "a", "one", &key);
    put(&svc, &alice, "b", "two", &key);

    let full = svc.export_repository(&alice, None, &ctx()).unwrap();
    svc.import_repository(&mirror, &full, &ctx()).unwrap();
    let synced = svc.get_repository(&mirror).unwrap().head.unwrap();

    put(&svc, &alice, "c", "three", &key);
    put(&svc, &alice, "a", "one again", &key);

    let delta = svc.export_repository(&alice, Some(synced.rev), &ctx()).unwrap();
    assert!(delta.len() < svc.export_repository(&alice, None, &ctx()).unwrap().len());
    let summary = svc.import_repository(&mirror, &delta, &ctx()).unwrap();
    assert_eq!(summary.commits, 2);
    assert_eq!(texts(&svc, &mirror), texts(&svc, &alice));
    assert_eq!(svc.verify_repository(&mirror, &ctx()).unwrap(), 4);
}

#[test]
fn incremental_export_from_an_unknown_revision_fails() {
    let svc = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let key = SigningKey::generate();
    put(&svc, &bob, "x", "bob's", &key);
    put(&svc, &alice, "a", "alice's", &key);

    let foreign = svc.get_repository(&bob).unwrap().head.unwrap().rev;
    let err = svc.export_repository(&alice, Some(foreign), &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn diverged_import_is_rejected() {
    let svc = service();
    let (alice, bob) = (did("alice"), did("bob"));
    let key = SigningKey::generate();
    put(&svc, &alice, "a", "alice", &key);
    put(&svc, &bob, "b", "bob", &key);
    let before = svc.get_repository(&bob).unwrap().head;

    let archive = svc.export_repository(&alice, None, &ctx()).unwrap();
    let err = svc.import_repository(&bob, &archive, &ctx()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(svc.get_repository(&bob).unwrap().head, before);
}

// -----------------------------------------------------------------------
// Compaction
// -----------------------------------------------------------------------

/// Six rewrites of one record, then a second record: seven commits.
fn history(svc: &RepoService, who: &Did, key: &SigningKey) -> Vec<WriteResult> {
    let mut writes: Vec<WriteResult> = (0..6)
        .map(|i| put(svc, who, "hot", &format!("rev {i}"), key))
        .collect();
    writes.push(put(svc, who, "cold", "stable", key));
    writes
}

#[test]
fn normal_compaction_keeps_recent_trees_readable() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let writes = history(&svc, &alice, &key);
    let before = svc.get_repository(&alice).unwrap().stats;

    let report = svc.compact(&alice, CompactionMode::Normal, &ctx()).unwrap();
    assert_eq!(report.retained_roots, 3);
    assert!(report.removed > 0);
    assert!(svc.get_repository(&alice).unwrap().stats.blocks < before.blocks);

    // The head and the two commits before it.
    let at = |i: usize, rkey: &str| svc.get_record_at(&alice, &writes[i].commit, NOTE, rkey);
    assert_eq!(at(6, "cold").unwrap().value, note("stable"));
    assert_eq!(at(5, "hot").unwrap().value, note("rev 5"));
    assert_eq!(at(4, "hot").unwrap().value, note("rev 4"));
    assert!(matches!(at(4, "cold"), Err(RepoError::RecordNotFound(_))));

    for i in 0..4 {
        let err = at(i, "hot").unwrap_err();
        assert!(matches!(err, RepoError::TreeCompacted { .. }), "{err}");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
    // Commits outlive their trees.
    assert_eq!(svc.get_commit(&alice, &writes[0].commit).unwrap().commit.version(), 1);
    assert_eq!(svc.verify_repository(&alice, &ctx()).unwrap(), 7);
}

#[test]
fn aggressive_compaction_keeps_only_the_head_tree() {
    let svc = service();
    let alice = did("alice");
    let key = SigningKey::generate();
    let writes = history(&svc, &alice, &key);
    assert_eq!(
        svc.get_record_at(&alice, &writes[5].commit, NOTE, "hot").unwrap().value,
        note("rev 5")
    );

    let report = svc.compact(&alice, CompactionMode::Aggressive, &ctx()).unwrap();
    assert_eq!(report.retained_roots, 1);
    assert!(report.removed > 0);

    for write in &writes[..6] {
        let err = svc.get_record_at(&alice, &write.commit, NOTE, "hot").unwrap_err();
        assert!(matches!(err, RepoError::TreeCompacted { .. }), "{err}");
    }
    assert_eq!(svc.get_record(&alice, NOTE, "hot").unwrap().value, note("rev 5"));
    assert_eq!(svc.get_record(&alice, NOTE, "cold").unwrap().value, note("stable"));
    assert_eq!(svc.verify_repository(&alice, &ctx()).unwrap(), 7);

    // A normal pass afterwards skips the trees already dropped.
    let again = svc.compact(&alice, CompactionMode::Normal, &ctx()).unwrap();
    assert_eq!((again.retained_roots, again.removed), (1, 0));

    let archive = svc.export_repository(&alice, None, &ctx()).unwrap();
    svc.import_repository(&did("copy"), &archive, &ctx()).unwrap();
    assert_eq!(texts(&svc, &did("copy")), texts(&svc, &alice));
}

#[test]
fn incremental_export_after_compaction_ships_the_head_tree() {
    let svc = service();
    let (alice, mirror) = (did("alice"), did("mirror"));
    let key = SigningKey::generate();
    for (rkey, text) in [("a", "one"), ("b", "two"), ("c", "three"), ("d", "four"), ("e", "five")] {
        put(&svc, &alice, rkey, text, &key);
    }
    let full = svc.export_repository(&alice, None, &ctx()).unwrap();
    svc.import_repository(&mirror, &full, &ctx()).unwrap();
    let synced = svc.get_repository(&mirror).unwrap().head.unwrap();

    for (rkey, text) in [("f", "six"), ("a", "one again"), ("g", "seven"), ("b", "two again")] {
        put(&svc, &alice, rkey, text, &key);
    }
    svc.compact(&alice, CompactionMode::Aggressive, &ctx()).unwrap();

    let delta = svc.export_repository(&alice, Some(synced.rev), &ctx()).unwrap();
    let summary = svc.import_repository(&mirror, &delta, &ctx()).unwrap();
    assert_eq!(summary.commits, 4);
    assert_eq!(texts(&svc, &mirror), texts(&svc, &alice));
    assert_eq!(svc.verify_repository(&mirror, &ctx()).unwrap(), 9);
    assert_eq!(
        svc.get_repository(&mirror).unwrap().head,
        svc.get_repository(&alice).unwrap().head
    );
}

#[test]
fn compacting_an_empty_repository_is_a_no_op() {
    let svc = service();
    let alice = did("alice");
    svc.create_repository(&alice).unwrap();
    let report = svc.compact(&alice, CompactionMode::Aggressive, &ctx()).unwrap();
    assert_eq!(report.removed, 0);
    assert_eq!(report.retained_roots, 0);
}

// -----------------------------------------------------------------------
// Persistence
// -----------------------------------------------------------------------

#[test]
fn file_backed_service_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let schemas = dir.path().join("lexicons");
    std::fs::create_dir_all(schemas.join("com/example")).unwrap();
    std::fs::write(schemas.join("com/example/note.json"), NOTE_SCHEMA).unwrap();

    let mut config = RepoConfig::default().with_data_dir(dir.path().join("data"));
    config.lexicon_dir = Some(schemas);
    let alice = did("alice");
    let key = SigningKey::generate();

    {
        let svc = RepoService::open(config.clone()).unwrap();
        assert_eq!(svc.catalog().len(), 1);
        put(&svc, &alice, "a", "durable", &key);
        put(&svc, &alice, "b", "also durable", &key);
        svc.delete_record(&alice, NOTE, "b", &key, &ctx()).unwrap();
    }

    let svc = RepoService::open(config).unwrap();
    assert_eq!(svc.get_record(&alice, NOTE, "a").unwrap().value, note("durable"));
    assert_eq!(
        svc.get_record(&alice, NOTE, "b").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(svc.verify_repository(&alice, &ctx()).unwrap(), 3);
    svc.verify_head(&alice, &key.verifying_key()).unwrap();
}
