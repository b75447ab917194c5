//! Whole-table bidirectional reconciliation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use super::sync_worker::{push_note, PushResult};
use super::Shared;
use crate::error::{Error, Result};
use crate::events::NoteEvent;
use crate::models::{Note, NoteKey};
use crate::remote::{RemoteNote, RemoteService};
use crate::util::unix_timestamp_now;

/// Raise `full_syncing`; false when a pass is already running.
pub(crate) fn try_begin(flag: &AtomicBool) -> bool {
    flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

/// Clears `full_syncing` however the pass ends.
struct FullSyncFlag<'a>(&'a AtomicBool);

impl Drop for FullSyncFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Run a full sync after [`try_begin`] succeeded.
///
/// Returns the number of notes that could not be pulled.
pub(crate) fn run(shared: &Shared, remote: &dyn RemoteService) -> Result<usize> {
    let _flag = FullSyncFlag(&shared.full_syncing);
    let _sync = shared.sync_lock.lock();

    tracing::info!("Full sync started");
    match sync_all(shared, remote) {
        Ok(errors) => {
            tracing::info!("Full sync completed with {errors} errors");
            shared.events.emit(&NoteEvent::SyncCompleted { errors });
            Ok(errors)
        }
        Err(error) => {
            tracing::error!("Full sync aborted: {error}");
            shared.events.emit(&NoteEvent::SyncFailed {
                error: "Full sync failed".to_string(),
                diagnostic: error.to_string(),
            });
            Err(error)
        }
    }
}

fn progress(shared: &Shared, message: String) {
    tracing::info!("{message}");
    shared.events.emit(&NoteEvent::SyncProgress { message });
}

fn sync_all(shared: &Shared, remote: &dyn RemoteService) -> Result<usize> {
    push_local_changes(shared, remote)?;

    progress(shared, "Retrieving full note list from server".to_string());
    let remote_notes = remote.list(false).map_err(|error| {
        Error::Sync(format!("Could not retrieve the note list: {error}"))
    })?;
    progress(
        shared,
        format!("Retrieved {} notes from server", remote_notes.len()),
    );

    prune_missing(shared, &remote_notes)?;

    let mut errors = 0;
    let mut updated = 0;
    let mut added = 0;
    for remote_note in &remote_notes {
        match pull(shared, remote, remote_note) {
            Ok(Pulled::Updated) => updated += 1,
            Ok(Pulled::Added) => added += 1,
            Ok(Pulled::Unchanged) => {}
            Err(error @ Error::Write { .. }) => return Err(error),
            Err(error) => {
                tracing::warn!("Could not pull note {}: {error}", remote_note.key);
                errors += 1;
            }
        }
    }
    progress(
        shared,
        format!("Pulled {updated} updated and {added} new notes from server"),
    );
    Ok(errors)
}

/// Step 1: push every dirty note, aborting on the first failure.
fn push_local_changes(shared: &Shared, remote: &dyn RemoteService) -> Result<()> {
    let keys = shared.table.lock().keys_needing_sync();
    progress(
        shared,
        format!("Pushing {} local changes to server", keys.len()),
    );

    let mut pushed = 0;
    for key in keys {
        match push_note(shared, remote, &key) {
            Ok(PushResult::Synced { .. } | PushResult::EditedInFlight) => pushed += 1,
            Ok(PushResult::UpToDate | PushResult::Vanished) => continue,
            Err(error) => {
                return Err(Error::Sync(format!("Could not push note {key}: {error}")));
            }
        }

        adopt_remote_key(shared, &key)?;
    }
    progress(shared, format!("Pushed {pushed} notes to server"));
    Ok(())
}

/// Move a freshly pushed note to its remote key and persist it there.
///
/// The file under the old key is only removed once the new one is written,
/// so a failed write leaves the note on disk under its old key.
fn adopt_remote_key(shared: &Shared, key: &NoteKey) -> Result<()> {
    let moved = {
        let mut table = shared.table.lock();
        match table.get(key).and_then(|note| note.remote_key.clone()) {
            Some(remote_key) if table.rekey(key, &remote_key) => Some(remote_key),
            _ => None,
        }
    };
    let Some(new_key) = moved else {
        return persist(shared, key);
    };

    tracing::debug!("Note {key} is now known as {new_key}");
    persist(shared, &new_key)?;
    shared.store.lock().delete(key)?;
    shared.events.emit(&NoteEvent::KeyChanged {
        old_key: key.clone(),
        new_key,
    });
    Ok(())
}

/// Step 3: drop local notes the remote no longer has.
pub(super) fn prune_missing(shared: &Shared, remote_notes: &[RemoteNote]) -> Result<()> {
    let remote_keys: HashSet<&NoteKey> = remote_notes.iter().map(|note| &note.key).collect();

    let removed: Vec<(NoteKey, Note)> = {
        let mut table = shared.table.lock();
        let doomed: Vec<NoteKey> = table
            .iter()
            .filter(|&(key, note)| {
                let remote_key = note.remote_key.as_ref().unwrap_or(key);
                note.sync_date != 0.0 && !remote_keys.contains(remote_key)
            })
            .map(|(key, _)| key.clone())
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| table.remove(&key).map(|note| (key, note)))
            .collect()
    };

    let mut store = shared.store.lock();
    for (key, note) in &removed {
        tracing::debug!("Note {key} was removed from the server, deleting it locally");
        store.delete_text_file(key, note)?;
        store.delete(key)?;
    }
    drop(store);

    progress(
        shared,
        format!("Removed {} notes deleted on server", removed.len()),
    );
    Ok(())
}

enum Pulled {
    Updated,
    Added,
    Unchanged,
}

/// Steps 4 and 5: adopt newer remote copies and notes new to this client.
fn pull(shared: &Shared, remote: &dyn RemoteService, listed: &RemoteNote) -> Result<Pulled> {
    let local = {
        let table = shared.table.lock();
        table.find_remote(&listed.key).map(|key| {
            let newer = table.get(&key).is_some_and(|note| listed.is_newer_than(note));
            (key, newer)
        })
    };

    match local {
        Some((_, false)) => Ok(Pulled::Unchanged),
        None if listed.deleted => Ok(Pulled::Unchanged),
        Some((key, true)) => {
            let full = fetch_content(remote, listed)?;
            {
                let mut table = shared.table.lock();
                let Some(note) = table.get_mut(&key) else {
                    return Ok(Pulled::Unchanged);
                };
                note.apply_remote(&full);
                note.sync_date = unix_timestamp_now().max(note.modify_date);
            }
            persist(shared, &key)?;
            shared.events.emit(&NoteEvent::NoteSynced { key });
            Ok(Pulled::Updated)
        }
        None => {
            let full = fetch_content(remote, listed)?;
            let mut note = Note::from_remote(&full);
            note.sync_date = unix_timestamp_now().max(note.modify_date);
            let key = {
                let mut table = shared.table.lock();
                let key = if table.contains(&full.key) {
                    table.fresh_key()
                } else {
                    full.key.clone()
                };
                table.insert(key.clone(), note);
                key
            };
            persist(shared, &key)?;
            shared.events.emit(&NoteEvent::NoteSynced { key });
            Ok(Pulled::Added)
        }
    }
}

fn fetch_content(remote: &dyn RemoteService, listed: &RemoteNote) -> Result<RemoteNote> {
    if listed.content.is_some() {
        return Ok(listed.clone());
    }
    Ok(remote.get(&listed.key)?)
}

/// Write one note now and stamp its `save_date`.
fn persist(shared: &Shared, key: &NoteKey) -> Result<()> {
    let Some(note) = shared.table.lock().get(key).cloned() else {
        return Ok(());
    };
    shared.store.lock().save(key, &note)?;

    let save_date = note.save_stamp(unix_timestamp_now());
    if let Some(live) = shared.table.lock().get_mut(key) {
        if live.modify_date == note.modify_date && live.sync_date == note.sync_date {
            live.save_date = save_date;
        }
    }
    shared.events.emit(&NoteEvent::NoteSaved { key: key.clone() });
    Ok(())
}
