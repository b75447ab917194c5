//! Note database: in-memory table, background workers and sync coordination.
//!
//! [`NotesDb`] owns the note table. Foreground calls mutate the table under a
//! short lock and never touch the disk or the network. Disk writes happen on
//! the save worker, remote round trips on the sync worker or a full-sync
//! thread. The owner drives both with periodic [`NotesDb::save_threaded`] and
//! [`NotesDb::sync_to_server_threaded`] calls and applies the results they
//! send back.

mod full_sync;
mod save_worker;
mod sync_worker;
mod table;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::config::NotesConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, NoteEvent, Subscription};
use crate::models::{Note, NoteKey, NoteStatus, StatusField};
use crate::remote::RemoteService;
use crate::search::{FilterResult, NoteFilter, NoteSorter};
use crate::store::NoteStore;
use crate::util::{sanitize_tags, unix_timestamp_now};

use save_worker::{SaveOutcome, SaveTask};
use sync_worker::{PushResult, SyncOutcome};
use table::NoteTable;

/// Called when the save worker cannot write a note.
pub type FatalHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// State shared between the owner and the background workers.
pub(crate) struct Shared {
    pub config: NotesConfig,
    pub table: Mutex<NoteTable>,
    pub store: Mutex<NoteStore>,
    /// Held for the duration of every remote round trip
    pub sync_lock: Mutex<()>,
    pub full_syncing: AtomicBool,
    pub waiting_for_remote: AtomicBool,
    pub events: Arc<EventBus>,
}

/// Result of one partial sync tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncTick {
    /// Notes handed to the sync worker by this tick
    pub queued: usize,
    /// Completed syncs applied by this tick
    pub synced: usize,
    /// Failed syncs reported by this tick; those notes stay dirty
    pub failed: usize,
}

impl SyncTick {
    fn absorb(&mut self, other: Self) {
        self.synced += other.synced;
        self.failed += other.failed;
    }
}

/// Builder for [`NotesDb`].
pub struct NotesDbBuilder {
    config: NotesConfig,
    remote: Option<Arc<dyn RemoteService>>,
    fatal: FatalHandler,
}

impl NotesDbBuilder {
    /// Synchronize with `remote`.
    #[must_use]
    pub fn with_remote(mut self, remote: Arc<dyn RemoteService>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Replace the default fatal write handler, which exits the process.
    #[must_use]
    pub fn with_fatal_handler(mut self, handler: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.fatal = Arc::new(handler);
        self
    }

    /// Load the store and start the workers.
    pub fn open(self) -> Result<NotesDb> {
        self.config.validate()?;
        if self.remote.is_some() && !self.config.sync_enabled {
            tracing::warn!("Remote configured but sync is disabled; remote will not be used");
        }
        let remote = self.remote.filter(|_| self.config.sync_enabled);

        let mut store = NoteStore::open(&self.config)?;
        let notes = store.load_all()?;

        let shared = Arc::new(Shared {
            config: self.config,
            table: Mutex::new(NoteTable::new(notes)),
            store: Mutex::new(store),
            sync_lock: Mutex::new(()),
            full_syncing: AtomicBool::new(false),
            waiting_for_remote: AtomicBool::new(false),
            events: Arc::new(EventBus::new()),
        });

        let (save_tx, save_rx) = crossbeam_channel::unbounded();
        let (saved_tx, saved_rx) = crossbeam_channel::unbounded();
        let save_worker = save_worker::spawn(Arc::clone(&shared), save_rx, saved_tx, self.fatal)?;

        let sync = match &remote {
            Some(remote) => {
                let (sync_tx, sync_rx) = crossbeam_channel::unbounded();
                let (synced_tx, synced_rx) = crossbeam_channel::unbounded();
                let worker =
                    sync_worker::spawn(Arc::clone(&shared), Arc::clone(remote), sync_rx, synced_tx)?;
                Some(SyncChannels {
                    tasks: Some(sync_tx),
                    outcomes: synced_rx,
                    worker: Some(worker),
                })
            }
            None => None,
        };

        Ok(NotesDb {
            shared,
            remote,
            save: SaveChannels {
                tasks: Some(save_tx),
                outcomes: saved_rx,
                worker: Some(save_worker),
            },
            sync,
            pending_save: HashSet::new(),
            pending_sync: HashSet::new(),
            full_sync: None,
        })
    }
}

struct SaveChannels {
    tasks: Option<Sender<SaveTask>>,
    outcomes: Receiver<SaveOutcome>,
    worker: Option<JoinHandle<()>>,
}

struct SyncChannels {
    tasks: Option<Sender<NoteKey>>,
    outcomes: Receiver<SyncOutcome>,
    worker: Option<JoinHandle<()>>,
}

/// The note database.
pub struct NotesDb {
    shared: Arc<Shared>,
    remote: Option<Arc<dyn RemoteService>>,
    save: SaveChannels,
    sync: Option<SyncChannels>,
    /// Keys with a save task in flight
    pending_save: HashSet<NoteKey>,
    /// Keys with a sync task in flight
    pending_sync: HashSet<NoteKey>,
    full_sync: Option<JoinHandle<Result<usize>>>,
}

fn exit_on_write_error(error: &Error) {
    tracing::error!("Notes can no longer be saved, exiting: {error}");
    std::process::exit(1);
}

impl NotesDb {
    pub fn builder(config: NotesConfig) -> NotesDbBuilder {
        NotesDbBuilder {
            config,
            remote: None,
            fatal: Arc::new(exit_on_write_error),
        }
    }

    /// Open a local-only database.
    pub fn open(config: NotesConfig) -> Result<Self> {
        Self::builder(config).open()
    }

    pub fn config(&self) -> &NotesConfig {
        &self.shared.config
    }

    /// Subscribe to note events.
    pub fn subscribe(&self, callback: impl Fn(&NoteEvent) + Send + Sync + 'static) -> Subscription {
        self.shared.events.subscribe(callback)
    }

    fn emit(&self, event: NoteEvent) {
        self.shared.events.emit(&event);
    }

    fn modified(&self, key: &NoteKey) {
        self.emit(NoteEvent::NoteStatusChanged {
            what: StatusField::ModifyDate,
            key: key.clone(),
        });
    }

    // Foreground operations

    /// Create a note whose content is `title`.
    pub fn create(&self, title: &str) -> NoteKey {
        let key = {
            let mut table = self.shared.table.lock();
            let key = table.fresh_key();
            table.insert(key.clone(), Note::new(title));
            key
        };
        tracing::debug!("Created note {key}");
        key
    }

    /// Replace the content of a note. Returns whether it changed.
    pub fn set_content(&self, key: &NoteKey, content: &str) -> Result<bool> {
        self.mutate(key, |note| note.set_content(content))
    }

    /// Add comma or whitespace separated tags. Returns whether any was new.
    pub fn add_tags(&self, key: &NoteKey, tags: &str) -> Result<bool> {
        let tags = sanitize_tags(tags);
        self.mutate(key, |note| note.add_tags(tags))
    }

    /// Remove one tag. Returns whether the note had it.
    pub fn remove_tag(&self, key: &NoteKey, tag: &str) -> Result<bool> {
        let tag = tag.trim().to_lowercase();
        self.mutate(key, |note| note.remove_tag(&tag))
    }

    pub fn set_pinned(&self, key: &NoteKey, pinned: bool) -> Result<bool> {
        self.mutate(key, |note| note.set_pinned(pinned))
    }

    /// Turn a note into a tombstone. Returns whether it was live.
    pub fn delete(&self, key: &NoteKey) -> Result<bool> {
        self.mutate(key, Note::mark_deleted)
    }

    fn mutate(&self, key: &NoteKey, change: impl FnOnce(&mut Note) -> bool) -> Result<bool> {
        let changed = change(self.shared.table.lock().note_mut(key)?);
        if changed {
            self.modified(key);
        }
        Ok(changed)
    }

    /// Copy of one note.
    pub fn get_note(&self, key: &NoteKey) -> Result<Note> {
        self.shared.table.lock().note(key).cloned()
    }

    pub fn note_content(&self, key: &NoteKey) -> Result<String> {
        Ok(self.shared.table.lock().note(key)?.content.clone())
    }

    /// All keys, tombstones included.
    pub fn keys(&self) -> Vec<NoteKey> {
        self.shared.table.lock().keys()
    }

    pub fn len(&self) -> usize {
        self.shared.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live notes matching `query`, sorted per configuration.
    pub fn filter(&self, query: Option<&str>) -> FilterResult {
        let config = &self.shared.config;
        let mut result = {
            let table = self.shared.table.lock();
            NoteFilter::from_config(config).filter(table.iter(), query)
        };
        NoteSorter::from_config(config).sort(&mut result.notes);
        result
    }

    pub fn note_status(&self, key: &NoteKey) -> Result<NoteStatus> {
        let table = self.shared.table.lock();
        Ok(NoteStatus::of(table.note(key)?, self.is_full_syncing()))
    }

    pub fn is_full_syncing(&self) -> bool {
        self.shared.full_syncing.load(Ordering::SeqCst)
    }

    // Queue observability

    pub fn save_queue_len(&self) -> usize {
        self.save.tasks.as_ref().map_or(0, Sender::len)
    }

    pub fn sync_queue_len(&self) -> usize {
        self.sync
            .as_ref()
            .and_then(|sync| sync.tasks.as_ref())
            .map_or(0, Sender::len)
    }

    /// Whether any worker has queued work or a remote call is running.
    pub fn is_worker_busy(&self) -> bool {
        self.save_queue_len() > 0
            || self.sync_queue_len() > 0
            || self.shared.waiting_for_remote.load(Ordering::SeqCst)
            || self.shared.sync_lock.is_locked()
    }

    // Save path

    /// Queue every dirty note for writing and apply finished writes.
    ///
    /// Returns the number of notes queued by this call.
    pub fn save_threaded(&mut self) -> usize {
        self.apply_save_outcomes();

        let tasks: Vec<SaveTask> = {
            let table = self.shared.table.lock();
            table
                .iter()
                .filter(|(key, note)| note.needs_save() && !self.pending_save.contains(*key))
                .map(|(key, note)| SaveTask {
                    key: key.clone(),
                    note: note.clone(),
                })
                .collect()
        };

        let Some(sender) = &self.save.tasks else {
            return 0;
        };
        let mut queued = 0;
        for task in tasks {
            let key = task.key.clone();
            if sender.send(task).is_err() {
                tracing::error!("Save worker is gone, note {key} was not queued");
                break;
            }
            self.pending_save.insert(key);
            queued += 1;
        }

        self.apply_save_outcomes();
        queued
    }

    /// Block until every queued write has finished and been applied.
    pub fn wait_for_save(&mut self) {
        while !self.pending_save.is_empty() {
            match self.save.outcomes.recv() {
                Ok(outcome) => self.apply_save_outcome(outcome),
                Err(_) => {
                    self.pending_save.clear();
                    break;
                }
            }
        }
    }

    fn apply_save_outcomes(&mut self) {
        while let Ok(outcome) = self.save.outcomes.try_recv() {
            self.apply_save_outcome(outcome);
        }
    }

    fn apply_save_outcome(&mut self, outcome: SaveOutcome) {
        self.pending_save.remove(&outcome.key);
        let applied = {
            let mut table = self.shared.table.lock();
            table.get_mut(&outcome.key).map(|live| {
                live.save_date = outcome.save_date_for(live);
            })
        };

        if applied.is_none() {
            // The note left the table while its copy was being written.
            if let Err(error) = self.shared.store.lock().delete(&outcome.key) {
                tracing::warn!("Could not remove stale file of note {}: {error}", outcome.key);
            }
            return;
        }

        self.emit(NoteEvent::NoteSaved {
            key: outcome.key.clone(),
        });
        self.emit(NoteEvent::NoteStatusChanged {
            what: StatusField::SaveDate,
            key: outcome.key,
        });
    }

    // Partial sync path

    /// Queue notes that need syncing and apply finished syncs.
    ///
    /// With `wait_for_idle`, only notes left alone for the debounce window
    /// are queued. Nothing is queued while a full sync runs.
    pub fn sync_to_server_threaded(&mut self, wait_for_idle: bool) -> SyncTick {
        let mut tick = self.apply_sync_outcomes();
        let Some(sender) = self.sync.as_ref().and_then(|sync| sync.tasks.clone()) else {
            return tick;
        };
        if self.is_full_syncing() {
            return tick;
        }

        let now = unix_timestamp_now();
        let debounce = self.shared.config.sync_debounce().as_secs_f64();
        let keys: Vec<NoteKey> = {
            let table = self.shared.table.lock();
            table
                .iter()
                .filter(|(key, note)| {
                    note.needs_sync()
                        && !self.pending_sync.contains(*key)
                        && (!wait_for_idle || now - note.modify_date > debounce)
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        for key in keys {
            if sender.send(key.clone()).is_err() {
                tracing::error!("Sync worker is gone, note {key} was not queued");
                break;
            }
            self.pending_sync.insert(key);
            tick.queued += 1;
        }

        tick.absorb(self.apply_sync_outcomes());
        tick
    }

    /// Block until every queued sync has finished and been applied.
    pub fn wait_for_sync(&mut self) -> SyncTick {
        let mut tick = SyncTick::default();
        while !self.pending_sync.is_empty() {
            let Some(outcome) = self.sync.as_ref().map(|sync| sync.outcomes.recv()) else {
                break;
            };
            match outcome {
                Ok(outcome) => tick.absorb(self.apply_sync_outcome(outcome)),
                Err(_) => {
                    self.pending_sync.clear();
                    break;
                }
            }
        }
        tick
    }

    fn apply_sync_outcomes(&mut self) -> SyncTick {
        let mut tick = SyncTick::default();
        loop {
            let Some(Ok(outcome)) = self.sync.as_ref().map(|sync| sync.outcomes.try_recv()) else {
                return tick;
            };
            tick.absorb(self.apply_sync_outcome(outcome));
        }
    }

    fn apply_sync_outcome(&mut self, outcome: SyncOutcome) -> SyncTick {
        self.pending_sync.remove(&outcome.key);
        let mut tick = SyncTick::default();
        match outcome.result {
            Ok(PushResult::Synced { .. }) => {
                tick.synced += 1;
                self.emit(NoteEvent::NoteSynced {
                    key: outcome.key.clone(),
                });
                self.emit(NoteEvent::NoteStatusChanged {
                    what: StatusField::SyncDate,
                    key: outcome.key,
                });
            }
            Ok(PushResult::EditedInFlight) => {
                self.emit(NoteEvent::NoteStatusChanged {
                    what: StatusField::SyncDate,
                    key: outcome.key,
                });
            }
            Ok(PushResult::UpToDate | PushResult::Vanished) => {}
            Err(error) => {
                tick.failed += 1;
                self.emit(NoteEvent::NoteSyncFailed {
                    key: outcome.key,
                    message: error.to_string(),
                });
            }
        }
        tick
    }

    /// Sync one note now, on the calling thread.
    ///
    /// A dirty note is pushed; a clean one adopts the remote copy if that is
    /// newer. Returns whether the local content changed.
    pub fn sync_note(&self, key: &NoteKey) -> Result<bool> {
        let remote = self.remote()?;
        let _sync = self.shared.sync_lock.lock();

        let needs_sync = self.shared.table.lock().note(key)?.needs_sync();
        let changed = if needs_sync {
            match sync_worker::push_note(&self.shared, remote.as_ref(), key)? {
                PushResult::Synced { content_changed } => content_changed,
                PushResult::EditedInFlight | PushResult::UpToDate => false,
                PushResult::Vanished => return Err(Error::NotFound(key.to_string())),
            }
        } else {
            sync_worker::pull_note(&self.shared, remote.as_ref(), key)?
        };

        self.emit(NoteEvent::NoteSynced { key: key.clone() });
        self.emit(NoteEvent::NoteStatusChanged {
            what: StatusField::SyncDate,
            key: key.clone(),
        });
        Ok(changed)
    }

    fn remote(&self) -> Result<Arc<dyn RemoteService>> {
        self.remote
            .clone()
            .ok_or_else(|| Error::Config("sync is not enabled".to_string()))
    }

    // Full sync

    /// Run a full sync on the calling thread.
    ///
    /// Returns the number of notes that could not be pulled.
    pub fn sync_full(&self) -> Result<usize> {
        let remote = self.remote()?;
        if !full_sync::try_begin(&self.shared.full_syncing) {
            return Err(Error::Sync("a full sync is already running".to_string()));
        }
        full_sync::run(&self.shared, remote.as_ref())
    }

    /// Start a full sync on its own thread.
    ///
    /// Returns false when a full sync is already running.
    pub fn sync_full_threaded(&mut self) -> Result<bool> {
        let remote = self.remote()?;
        if !full_sync::try_begin(&self.shared.full_syncing) {
            tracing::debug!("Full sync already running");
            return Ok(false);
        }

        match self.wait_for_full_sync() {
            Some(Err(error)) => tracing::warn!("Previous full sync failed: {error}"),
            Some(Ok(errors)) => tracing::debug!("Previous full sync finished with {errors} errors"),
            None => {}
        }
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("notesync-full-sync".into())
            .spawn(move || full_sync::run(&shared, remote.as_ref()));
        match spawned {
            Ok(handle) => {
                self.full_sync = Some(handle);
                Ok(true)
            }
            Err(error) => {
                self.shared.full_syncing.store(false, Ordering::SeqCst);
                Err(Error::Io(error))
            }
        }
    }

    /// Wait for the last threaded full sync, returning its result.
    pub fn wait_for_full_sync(&mut self) -> Option<Result<usize>> {
        let handle = self.full_sync.take()?;
        Some(
            handle
                .join()
                .unwrap_or_else(|_| Err(Error::Sync("full sync thread panicked".to_string()))),
        )
    }

    // Shutdown

    /// Drain the workers, write every dirty note and stop.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.wait_for_full_sync().is_some() {
            tracing::debug!("Full sync finished before shutdown");
        }

        if let Some(sync) = self.sync.as_mut() {
            drop(sync.tasks.take());
            if let Some(worker) = sync.worker.take() {
                if worker.join().is_err() {
                    tracing::error!("Sync worker panicked");
                }
            }
        }
        self.apply_sync_outcomes();
        self.pending_sync.clear();

        if self.save.tasks.is_some() {
            self.save_threaded();
            drop(self.save.tasks.take());
            if let Some(worker) = self.save.worker.take() {
                if worker.join().is_err() {
                    tracing::error!("Save worker panicked");
                }
            }
            self.apply_save_outcomes();
            self.pending_save.clear();
        }
        tracing::debug!("Note database closed");
    }
}

impl Drop for NotesDb {
    fn drop(&mut self) {
        self.shutdown();
    }
}
