use std::fs;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::remote::{FailureMode, MemoryRemote, RemoteNote, RemoteOp, RemoteResult};

fn config(dir: &TempDir) -> NotesConfig {
    let mut config = NotesConfig::new(dir.path().join("db")).with_sync(true);
    config.sync_debounce_secs = 0.0;
    config
}

fn open_with(dir: &TempDir, remote: Arc<dyn RemoteService>) -> NotesDb {
    NotesDb::builder(config(dir))
        .with_remote(remote)
        .with_fatal_handler(|error| panic!("unexpected write failure: {error}"))
        .open()
        .unwrap()
}

fn open(dir: &TempDir) -> (NotesDb, Arc<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::new());
    (open_with(dir, remote.clone()), remote)
}

/// Like `open`, for tests that make writes fail on purpose.
fn open_ignoring_write_failures(dir: &TempDir) -> (NotesDb, Arc<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::new());
    let db = NotesDb::builder(config(dir))
        .with_remote(remote.clone())
        .with_fatal_handler(|_| {})
        .open()
        .unwrap();
    (db, remote)
}

fn sync_now(db: &mut NotesDb) -> SyncTick {
    let mut tick = db.sync_to_server_threaded(false);
    tick.absorb(db.wait_for_sync());
    tick
}

fn json_path(dir: &TempDir, key: &NoteKey) -> std::path::PathBuf {
    dir.path().join("db").join(format!("{key}.json"))
}

fn remote_copy(key: &str, version: u64, content: &str, modify_date: f64) -> RemoteNote {
    RemoteNote {
        key: NoteKey::from(key),
        version,
        content: Some(content.to_string()),
        tags: Vec::new(),
        system_tags: Vec::new(),
        create_date: Some(modify_date),
        modify_date: Some(modify_date),
        deleted: false,
    }
}

/// Remote whose writes block until the test lets them through.
struct GatedRemote {
    inner: MemoryRemote,
    entered: Sender<()>,
    proceed: Receiver<()>,
}

impl GatedRemote {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (proceed_tx, proceed_rx) = crossbeam_channel::unbounded();
        let remote = Arc::new(Self {
            inner: MemoryRemote::new(),
            entered: entered_tx,
            proceed: proceed_rx,
        });
        (remote, entered_rx, proceed_tx)
    }

    fn gate(&self) {
        self.entered.send(()).unwrap();
        self.proceed.recv().unwrap();
    }
}

impl RemoteService for GatedRemote {
    fn create(&self, note: &Note) -> RemoteResult<RemoteNote> {
        self.gate();
        self.inner.create(note)
    }

    fn update(&self, note: &Note) -> RemoteResult<RemoteNote> {
        self.gate();
        self.inner.update(note)
    }

    fn get(&self, key: &NoteKey) -> RemoteResult<RemoteNote> {
        self.inner.get(key)
    }

    fn list(&self, include_content: bool) -> RemoteResult<Vec<RemoteNote>> {
        self.inner.list(include_content)
    }
}

#[test]
fn create_is_memory_only() {
    let dir = TempDir::new().unwrap();
    let (db, remote) = open(&dir);

    let key = db.create("shopping list");
    let note = db.get_note(&key).unwrap();

    assert_eq!(note.content, "shopping list");
    assert_eq!(note.save_date, 0.0);
    assert_eq!(note.sync_date, 0.0);
    assert!(note.remote_key.is_none());
    assert!(!json_path(&dir, &key).exists());
    assert_eq!(remote.len(), 0);
}

#[test]
fn new_note_is_created_on_remote() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("shopping list");

    let tick = sync_now(&mut db);

    assert_eq!(tick, SyncTick { queued: 1, synced: 1, failed: 0 });
    let note = db.get_note(&key).unwrap();
    assert_eq!(note.remote_key, Some(NoteKey::from("K1")));
    assert_eq!(note.remote_version, Some(1));
    assert!(note.sync_date >= note.modify_date);
    assert!(!note.needs_sync());
    assert_eq!(remote.stored(&NoteKey::from("K1")).unwrap().content.as_deref(), Some("shopping list"));
}

#[test]
fn add_tags_merges_sorted_and_advances_once() {
    let dir = TempDir::new().unwrap();
    let (db, _remote) = open(&dir);
    let key = db.create("tagged");
    db.add_tags(&key, "work").unwrap();
    let before = db.get_note(&key).unwrap().modify_date;

    assert!(db.add_tags(&key, "work, urgent").unwrap());
    let note = db.get_note(&key).unwrap();
    assert_eq!(note.tags, vec!["urgent", "work"]);
    assert!(note.modify_date > before);

    let after = note.modify_date;
    assert!(!db.add_tags(&key, "Work").unwrap());
    assert_eq!(db.get_note(&key).unwrap().modify_date, after);
}

#[test]
fn redundant_edits_do_not_dirty() {
    let dir = TempDir::new().unwrap();
    let (mut db, _remote) = open(&dir);
    let key = db.create("a");
    db.save_threaded();
    db.wait_for_save();
    let saved = db.get_note(&key).unwrap();

    assert!(!db.set_content(&key, "a").unwrap());
    assert!(!db.remove_tag(&key, "absent").unwrap());
    assert!(!db.set_pinned(&key, false).unwrap());
    assert_eq!(db.get_note(&key).unwrap(), saved);
    assert!(!saved.needs_save());
}

#[test]
fn unknown_key_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (db, _remote) = open(&dir);
    let missing = NoteKey::from("missing");
    assert!(matches!(db.set_content(&missing, "x"), Err(Error::NotFound(_))));
    assert!(matches!(db.note_status(&missing), Err(Error::NotFound(_))));
}

#[test]
fn save_clears_dirty_flag_and_reloads() {
    let dir = TempDir::new().unwrap();
    let key;
    {
        let (mut db, _remote) = open(&dir);
        key = db.create("first line\nbody");
        db.set_pinned(&key, true).unwrap();

        assert_eq!(db.save_threaded(), 1);
        // Already in flight, not queued twice.
        assert_eq!(db.save_threaded(), 0);
        db.wait_for_save();

        assert!(!db.get_note(&key).unwrap().needs_save());
        assert!(db.note_status(&key).unwrap().saved);
        db.set_content(&key, "first line\nchanged").unwrap();
        assert!(db.get_note(&key).unwrap().needs_save());
        db.close();
    }

    let (db, _remote) = open(&dir);
    let note = db.get_note(&key).unwrap();
    assert_eq!(note.content, "first line\nchanged");
    assert!(note.is_pinned());
    assert!(!note.needs_save());
}

#[test]
fn save_emits_events() {
    let dir = TempDir::new().unwrap();
    let (mut db, _remote) = open(&dir);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = db.subscribe(move |event| sink.lock().push(event.clone()));

    let key = db.create("a");
    db.set_content(&key, "b").unwrap();
    db.save_threaded();
    db.wait_for_save();

    assert_eq!(
        *seen.lock(),
        vec![
            NoteEvent::NoteStatusChanged {
                what: StatusField::ModifyDate,
                key: key.clone()
            },
            NoteEvent::NoteSaved { key: key.clone() },
            NoteEvent::NoteStatusChanged {
                what: StatusField::SaveDate,
                key
            },
        ]
    );
}

#[test]
fn debounce_holds_back_recent_edits() {
    let dir = TempDir::new().unwrap();
    let remote = Arc::new(MemoryRemote::new());
    let mut config = config(&dir);
    config.sync_debounce_secs = 3600.0;
    let mut db = NotesDb::builder(config)
        .with_remote(remote.clone())
        .open()
        .unwrap();
    db.create("typing");

    assert_eq!(db.sync_to_server_threaded(true).queued, 0);
    assert_eq!(db.sync_to_server_threaded(false).queued, 1);
    db.wait_for_sync();
    assert_eq!(remote.len(), 1);
}

#[test]
fn edit_during_round_trip_is_not_overwritten() {
    let dir = TempDir::new().unwrap();
    let (remote, entered, proceed) = GatedRemote::new();
    let mut db = open_with(&dir, remote.clone());
    let key = db.create("draft");

    db.sync_to_server_threaded(false);
    entered.recv().unwrap();
    assert!(db.is_worker_busy());
    db.set_content(&key, "draft, keeps growing").unwrap();
    proceed.send(()).unwrap();
    let tick = db.wait_for_sync();

    assert_eq!(tick.synced, 0);
    let note = db.get_note(&key).unwrap();
    assert_eq!(note.content, "draft, keeps growing");
    assert_eq!(note.remote_key, Some(NoteKey::from("K1")));
    assert_eq!(note.remote_version, Some(1));
    assert!(note.needs_sync());

    // The next tick sends the newer content.
    db.sync_to_server_threaded(false);
    entered.recv().unwrap();
    proceed.send(()).unwrap();
    assert_eq!(db.wait_for_sync().synced, 1);
    let stored = remote.inner.stored(&NoteKey::from("K1")).unwrap();
    assert_eq!(stored.content.as_deref(), Some("draft, keeps growing"));
    assert_eq!(remote.inner.len(), 1);
}

#[test]
fn lost_update_response_is_recovered() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("v1");
    sync_now(&mut db);

    db.set_content(&key, "v2").unwrap();
    remote.fail_next(RemoteOp::Update, FailureMode::ApplyThenFail);
    let tick = sync_now(&mut db);

    assert_eq!(tick, SyncTick { queued: 1, synced: 1, failed: 0 });
    assert_eq!(remote.calls(RemoteOp::Update), 1);
    assert_eq!(remote.calls(RemoteOp::Get), 1);
    let note = db.get_note(&key).unwrap();
    assert!(!note.needs_sync());
    assert_eq!(note.remote_version, Some(2));
}

#[test]
fn rejected_update_stays_dirty_and_retries() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("v1");
    sync_now(&mut db);

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let _subscription = db.subscribe(move |event| {
        if let NoteEvent::NoteSyncFailed { key, .. } = event {
            sink.lock().push(key.clone());
        }
    });

    db.set_content(&key, "v2").unwrap();
    remote.fail_next(RemoteOp::Update, FailureMode::Reject);
    let tick = sync_now(&mut db);

    assert_eq!(tick.failed, 1);
    assert!(db.get_note(&key).unwrap().needs_sync());
    assert_eq!(*failures.lock(), vec![key.clone()]);

    assert_eq!(sync_now(&mut db).synced, 1);
    assert!(!db.get_note(&key).unwrap().needs_sync());
    let stored = remote.stored(&NoteKey::from("K1")).unwrap();
    assert_eq!(stored.content.as_deref(), Some("v2"));
}

#[test]
fn failed_create_is_retried_later() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("offline");
    remote.fail_next(RemoteOp::Create, FailureMode::Reject);

    assert_eq!(sync_now(&mut db).failed, 1);
    assert!(db.get_note(&key).unwrap().remote_key.is_none());
    assert_eq!(sync_now(&mut db).synced, 1);
    assert!(db.get_note(&key).unwrap().remote_key.is_some());
}

#[test]
fn sync_note_pulls_newer_remote_copy() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("mine");
    sync_now(&mut db);

    let local = db.get_note(&key).unwrap();
    let mut newer = remote_copy("K1", 5, "theirs", local.modify_date + 10.0);
    newer.create_date = Some(local.create_date);
    remote.insert(newer);

    assert!(db.sync_note(&key).unwrap());
    let note = db.get_note(&key).unwrap();
    assert_eq!(note.content, "theirs");
    assert_eq!(note.remote_version, Some(5));
    assert!(!note.needs_sync());
    assert!(!db.sync_note(&key).unwrap());
}

#[test]
fn full_sync_pushes_rekeys_and_pulls() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let local_key = db.create("local note");
    db.save_threaded();
    db.wait_for_save();
    remote.insert(remote_copy("R1", 3, "from another device", 50.0));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = db.subscribe(move |event| sink.lock().push(event.clone()));

    assert_eq!(db.sync_full().unwrap(), 0);

    let keys = db.keys();
    assert_eq!(keys, vec![NoteKey::from("K1"), NoteKey::from("R1")]);
    assert!(!json_path(&dir, &local_key).exists());
    assert!(json_path(&dir, &NoteKey::from("K1")).exists());
    assert!(json_path(&dir, &NoteKey::from("R1")).exists());

    let pulled = db.get_note(&NoteKey::from("R1")).unwrap();
    assert_eq!(pulled.content, "from another device");
    assert!(!pulled.needs_sync());
    assert!(!pulled.needs_save());
    assert!(!db.is_full_syncing());

    let events = events.lock();
    assert!(events.contains(&NoteEvent::KeyChanged {
        old_key: local_key,
        new_key: NoteKey::from("K1"),
    }));
    assert!(events
        .iter()
        .any(|event| matches!(event, NoteEvent::SyncProgress { .. })));
    assert_eq!(events.last(), Some(&NoteEvent::SyncCompleted { errors: 0 }));
}

#[test]
fn full_sync_prunes_only_previously_synced_notes() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("will vanish remotely");
    sync_now(&mut db);
    db.save_threaded();
    db.wait_for_save();
    assert!(json_path(&dir, &key).exists());
    remote.remove(&NoteKey::from("K1"));

    // Push of the never-synced note fails, so it keeps sync_date 0.
    let fresh = db.create("never synced");
    remote.fail_next(RemoteOp::Create, FailureMode::Reject);
    assert!(matches!(db.sync_full(), Err(Error::Sync(_))));
    assert!(!db.is_full_syncing());

    let outcome = db.sync_full().unwrap();
    assert_eq!(outcome, 0);
    assert!(db.get_note(&key).is_err());
    assert!(!json_path(&dir, &key).exists());
    assert_eq!(db.keys(), vec![NoteKey::from("K2")]);
    assert_eq!(db.note_content(&NoteKey::from("K2")).unwrap(), "never synced");
    assert!(db.get_note(&fresh).is_err());
}

#[test]
fn pruning_keeps_never_synced_notes() {
    let dir = TempDir::new().unwrap();
    let (mut db, _remote) = open(&dir);
    let synced = db.create("synced once");
    let unsynced = db.create("never synced");
    db.sync_note(&synced).unwrap();
    db.save_threaded();
    db.wait_for_save();
    assert_eq!(db.get_note(&unsynced).unwrap().sync_date, 0.0);

    full_sync::prune_missing(&db.shared, &[]).unwrap();

    assert!(db.get_note(&synced).is_err());
    assert!(!json_path(&dir, &synced).exists());
    assert_eq!(db.note_content(&unsynced).unwrap(), "never synced");
    assert!(json_path(&dir, &unsynced).exists());
}

#[test]
fn full_sync_abort_reports_failure() {
    let dir = TempDir::new().unwrap();
    let (db, remote) = open(&dir);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _subscription = db.subscribe(move |event| {
        if let NoteEvent::SyncFailed { diagnostic, .. } = event {
            sink.lock().push(diagnostic.clone());
        }
    });

    remote.fail_next(RemoteOp::List, FailureMode::Reject);
    assert!(db.sync_full().is_err());
    assert_eq!(seen.lock().len(), 1);
    assert!(seen.lock()[0].contains("list rejected"));
}

#[test]
fn threaded_full_sync_refuses_reentry() {
    let dir = TempDir::new().unwrap();
    let (remote, entered, proceed) = GatedRemote::new();
    let mut db = open_with(&dir, remote);
    db.create("pending push");

    assert!(db.sync_full_threaded().unwrap());
    entered.recv().unwrap();
    assert!(db.is_full_syncing());
    assert!(db.note_status(&db.keys()[0]).unwrap().full_syncing);
    assert!(!db.sync_full_threaded().unwrap());
    assert_eq!(db.sync_to_server_threaded(false).queued, 0);

    proceed.send(()).unwrap();
    assert_eq!(db.wait_for_full_sync().unwrap().unwrap(), 0);
    assert!(!db.is_full_syncing());
    assert_eq!(db.keys(), vec![NoteKey::from("K1")]);
}

#[test]
fn deleted_note_stays_as_tombstone_until_remote_drops_it() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let key = db.create("short lived");
    sync_now(&mut db);

    assert!(db.delete(&key).unwrap());
    assert!(!db.delete(&key).unwrap());
    assert_eq!(db.filter(None).active, 0);
    sync_now(&mut db);
    assert!(remote.stored(&NoteKey::from("K1")).unwrap().deleted);
    assert!(db.get_note(&key).unwrap().deleted);

    remote.remove(&NoteKey::from("K1"));
    db.sync_full().unwrap();
    assert!(db.is_empty());
}

#[test]
fn filter_sorts_pinned_first() {
    let dir = TempDir::new().unwrap();
    let (db, _remote) = open(&dir);
    let older = db.create("older note");
    db.create("newer note");
    db.set_pinned(&older, true).unwrap();
    let newest = db.create("newest note");

    let result = db.filter(Some("note"));
    let order: Vec<&NoteKey> = result.notes.iter().map(|info| &info.key).collect();
    assert_eq!(order[0], &older);
    assert_eq!(order[1], &newest);
    assert_eq!(result.active, 3);
}

#[test]
fn close_flushes_dirty_notes() {
    let dir = TempDir::new().unwrap();
    let (db, _remote) = open(&dir);
    let key = db.create("written on close");
    db.close();

    let raw = fs::read_to_string(json_path(&dir, &key)).unwrap();
    assert!(raw.contains("written on close"));
}

#[test]
fn write_failure_invokes_fatal_handler() {
    let dir = TempDir::new().unwrap();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let mut db = NotesDb::builder(NotesConfig::new(dir.path().join("db")))
        .with_fatal_handler(move |error| sink.lock().push(error.to_string()))
        .open()
        .unwrap();
    let key = db.create("doomed");
    fs::remove_dir_all(dir.path().join("db")).unwrap();

    db.save_threaded();
    db.wait_for_save();

    assert_eq!(failures.lock().len(), 1);
    assert!(db.get_note(&key).unwrap().needs_save());
    assert_eq!(db.save_threaded(), 0);
}

#[test]
fn local_only_database_rejects_sync() {
    let dir = TempDir::new().unwrap();
    let mut db = NotesDb::open(NotesConfig::new(dir.path().join("db"))).unwrap();
    db.create("local");
    assert_eq!(db.sync_to_server_threaded(false), SyncTick::default());
    assert!(matches!(db.sync_full(), Err(Error::Config(_))));
}

#[test]
fn rekey_keeps_old_file_when_new_file_cannot_be_written() {
    let dir = TempDir::new().unwrap();
    let (mut db, _remote) = open_ignoring_write_failures(&dir);
    let local_key = db.create("precious");
    db.save_threaded();
    db.wait_for_save();
    fs::create_dir_all(json_path(&dir, &NoteKey::from("K1"))).unwrap();

    assert!(matches!(db.sync_full(), Err(Error::Write { .. })));
    let on_disk = fs::read_to_string(json_path(&dir, &local_key)).unwrap();
    assert!(on_disk.contains("precious"));
    assert!(!db.is_full_syncing());
}

#[test]
fn full_sync_counts_pull_errors_and_finishes_the_pass() {
    let dir = TempDir::new().unwrap();
    let (db, remote) = open(&dir);
    remote.insert(remote_copy("R1", 1, "first", 50.0));
    remote.insert(remote_copy("R2", 1, "second", 60.0));
    remote.fail_next(RemoteOp::Get, FailureMode::Reject);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = db.subscribe(move |event| sink.lock().push(event.clone()));

    assert_eq!(db.sync_full().unwrap(), 1);
    assert_eq!(db.keys(), vec![NoteKey::from("R2")]);
    assert_eq!(db.note_content(&NoteKey::from("R2")).unwrap(), "second");
    assert_eq!(
        events.lock().last(),
        Some(&NoteEvent::SyncCompleted { errors: 1 })
    );
}

#[test]
fn full_sync_aborts_when_a_pulled_note_cannot_be_written() {
    let dir = TempDir::new().unwrap();
    let (db, remote) = open_ignoring_write_failures(&dir);
    remote.insert(remote_copy("R1", 1, "first", 50.0));
    remote.insert(remote_copy("R2", 1, "second", 60.0));
    fs::create_dir_all(json_path(&dir, &NoteKey::from("R1"))).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = db.subscribe(move |event| sink.lock().push(event.clone()));

    assert!(matches!(db.sync_full(), Err(Error::Write { .. })));
    assert!(db.get_note(&NoteKey::from("R2")).is_err());
    assert!(matches!(
        events.lock().last(),
        Some(NoteEvent::SyncFailed { .. })
    ));
}

#[test]
fn note_dated_ahead_of_the_clock_settles_after_one_save() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    let ahead = crate::util::unix_timestamp_now() + 3600.0;
    remote.insert(remote_copy("R1", 1, "from a fast clock", ahead));

    db.sync_full().unwrap();
    let pulled = db.get_note(&NoteKey::from("R1")).unwrap();
    assert!(!pulled.needs_save());
    assert_eq!(db.save_threaded(), 0);

    // The save worker path: a partial pull dirties the note again.
    let mut newer = remote_copy("R1", 2, "still ahead", ahead + 60.0);
    newer.create_date = Some(pulled.create_date);
    remote.insert(newer);
    assert!(db.sync_note(&NoteKey::from("R1")).unwrap());
    assert_eq!(db.save_threaded(), 1);
    db.wait_for_save();
    assert!(!db.get_note(&NoteKey::from("R1")).unwrap().needs_save());
    assert_eq!(db.save_threaded(), 0);
    db.close();

    let db = NotesDb::open(config(&dir)).unwrap();
    assert!(!db.get_note(&NoteKey::from("R1")).unwrap().needs_save());
}

#[test]
fn threaded_full_sync_can_be_restarted_without_waiting() {
    let dir = TempDir::new().unwrap();
    let (mut db, remote) = open(&dir);
    remote.insert(remote_copy("R1", 1, "first", 50.0));

    assert!(db.sync_full_threaded().unwrap());
    while db.is_full_syncing() {
        std::thread::yield_now();
    }
    assert!(db.sync_full_threaded().unwrap());

    assert_eq!(db.wait_for_full_sync().unwrap().unwrap(), 0);
    assert!(db.wait_for_full_sync().is_none());
    assert_eq!(db.keys(), vec![NoteKey::from("R1")]);
}
