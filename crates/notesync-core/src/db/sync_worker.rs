//! Per-note synchronization with the remote service.
//!
//! [`push_note`] is the single send-and-merge routine shared by the partial
//! sync worker, full sync and `NotesDb::sync_note`. Callers hold the global
//! sync lock around it; the table lock is only taken to copy the note out and
//! to merge the response back in.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::Shared;
use crate::error::{Error, Result};
use crate::models::{Note, NoteKey};
use crate::remote::{RemoteError, RemoteNote, RemoteResult, RemoteService};
use crate::util::{compact_text, unix_timestamp_now};

/// What a push did to the live note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushResult {
    /// The remote response was merged and the note is synced.
    Synced { content_changed: bool },
    /// The note was edited during the round trip; only the remote key and
    /// version were taken over and the note stays dirty.
    EditedInFlight,
    /// Nothing to send.
    UpToDate,
    /// The note left the table during the round trip.
    Vanished,
}

/// Outcome of one partial sync task.
#[derive(Debug)]
pub(crate) struct SyncOutcome {
    pub key: NoteKey,
    pub result: RemoteResult<PushResult>,
}

/// Clears the waiting flag when the remote call returns or unwinds.
struct WaitingForRemote<'a>(&'a Shared);

impl<'a> WaitingForRemote<'a> {
    fn begin(shared: &'a Shared) -> Self {
        shared.waiting_for_remote.store(true, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for WaitingForRemote<'_> {
    fn drop(&mut self) {
        self.0.waiting_for_remote.store(false, Ordering::SeqCst);
    }
}

/// Send one note to the remote and merge the response into the table.
pub(crate) fn push_note(
    shared: &Shared,
    remote: &dyn RemoteService,
    key: &NoteKey,
) -> RemoteResult<PushResult> {
    let snapshot = {
        let table = shared.table.lock();
        match table.get(key) {
            Some(note) if note.needs_sync() => note.clone(),
            Some(_) => return Ok(PushResult::UpToDate),
            None => return Ok(PushResult::Vanished),
        }
    };

    let response = {
        let _waiting = WaitingForRemote::begin(shared);
        send(remote, key, &snapshot)?
    };

    let mut table = shared.table.lock();
    let Some(live) = table.get_mut(key) else {
        tracing::debug!("Note {key} was removed while it was being synced");
        return Ok(PushResult::Vanished);
    };

    if live.modify_date > snapshot.modify_date {
        tracing::debug!("Note {key} was edited during sync, keeping local content");
        live.absorb_remote_identity(&response);
        live.sync_date = live.sync_date.max(snapshot.modify_date);
        return Ok(PushResult::EditedInFlight);
    }

    let before = live.content.clone();
    live.apply_remote(&response);
    live.sync_date = unix_timestamp_now().max(live.modify_date);
    Ok(PushResult::Synced {
        content_changed: live.content != before,
    })
}

fn send(remote: &dyn RemoteService, key: &NoteKey, snapshot: &Note) -> RemoteResult<RemoteNote> {
    let Some(remote_key) = snapshot.remote_key.as_ref() else {
        tracing::debug!("Creating note {key} on the remote");
        return remote.create(snapshot).map_err(|error| {
            tracing::warn!("Remote create of note {key} failed: {error}");
            error
        });
    };

    tracing::debug!("Updating note {key} (remote {remote_key}) on the remote");
    match remote.update(snapshot) {
        Ok(response) => Ok(response),
        Err(error) => {
            tracing::warn!("Remote update of note {key} failed, checking remote copy: {error}");
            recover(remote, remote_key, snapshot, &error)
        }
    }
}

/// After a failed update, accept the remote copy if it already matches what
/// was sent.
fn recover(
    remote: &dyn RemoteService,
    remote_key: &NoteKey,
    snapshot: &Note,
    error: &RemoteError,
) -> RemoteResult<RemoteNote> {
    let current = remote.get(remote_key).map_err(|get_error| {
        RemoteError::new(format!("{error} (fetching remote copy failed: {get_error})"))
    })?;

    let mut merged = snapshot.clone();
    merged.apply_remote(&current);
    if merged.is_content_identical(snapshot) {
        tracing::info!("Remote already holds note {remote_key}, treating it as synced");
        Ok(current)
    } else {
        Err(RemoteError::new(format!(
            "{error} (remote copy of {remote_key} differs: {})",
            compact_text(current.content.as_deref().unwrap_or_default())
        )))
    }
}

/// Fetch the remote copy of a note that needs no push and adopt it if newer.
pub(crate) fn pull_note(shared: &Shared, remote: &dyn RemoteService, key: &NoteKey) -> Result<bool> {
    let remote_key = {
        let table = shared.table.lock();
        let note = table.note(key)?;
        note.remote_key.clone().unwrap_or_else(|| key.clone())
    };

    let current = {
        let _waiting = WaitingForRemote::begin(shared);
        remote.get(&remote_key)?
    };

    let mut table = shared.table.lock();
    let live = table.note_mut(key)?;
    if !current.is_newer_than(live) {
        return Ok(false);
    }
    tracing::debug!("Remote copy of note {key} is newer, adopting it");
    let before = live.content.clone();
    live.apply_remote(&current);
    live.sync_date = unix_timestamp_now().max(live.modify_date);
    Ok(live.content != before)
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    remote: Arc<dyn RemoteService>,
    tasks: Receiver<NoteKey>,
    outcomes: Sender<SyncOutcome>,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("notesync-sync".into())
        .spawn(move || {
            for key in &tasks {
                let result = {
                    let _sync = shared.sync_lock.lock();
                    push_note(&shared, remote.as_ref(), &key)
                };
                if let Err(error) = &result {
                    tracing::warn!("Sync of note {key} failed, will retry: {error}");
                }
                if outcomes.send(SyncOutcome { key, result }).is_err() {
                    return;
                }
            }
            tracing::debug!("Sync queue closed");
        })
        .map_err(Error::Io)
}
