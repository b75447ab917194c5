//! Background writer of dirty notes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::{FatalHandler, Shared};
use crate::error::{Error, Result};
use crate::models::{Note, NoteKey};
use crate::util::unix_timestamp_now;

/// Deep copy of a note queued for writing.
#[derive(Debug)]
pub(crate) struct SaveTask {
    pub key: NoteKey,
    pub note: Note,
}

/// A note that reached the disk.
#[derive(Debug)]
pub(crate) struct SaveOutcome {
    pub key: NoteKey,
    /// The copy that was written
    pub note: Note,
    pub save_date: f64,
}

impl SaveOutcome {
    /// `save_date` to record on the live note.
    ///
    /// When the live note moved past the written copy, the stamp stays below
    /// its newer dates so it is written again on the next tick.
    pub fn save_date_for(&self, live: &Note) -> f64 {
        if live.modify_date > self.note.modify_date || live.sync_date > self.note.sync_date {
            self.note.modify_date.max(self.note.sync_date)
        } else {
            self.save_date
        }
    }
}

pub(crate) fn spawn(
    shared: Arc<Shared>,
    tasks: Receiver<SaveTask>,
    outcomes: Sender<SaveOutcome>,
    fatal: FatalHandler,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("notesync-save".into())
        .spawn(move || run(&shared, &tasks, &outcomes, &fatal))
        .map_err(Error::Io)
}

fn run(
    shared: &Shared,
    tasks: &Receiver<SaveTask>,
    outcomes: &Sender<SaveOutcome>,
    fatal: &FatalHandler,
) {
    for SaveTask { key, note } in tasks {
        if let Err(error) = shared.store.lock().save(&key, &note) {
            tracing::error!("Save worker stopping, note {key} could not be written: {error}");
            fatal(&error);
            return;
        }
        tracing::debug!("Saved note {key}");

        let save_date = note.save_stamp(unix_timestamp_now());
        let outcome = SaveOutcome {
            key,
            note,
            save_date,
        };
        if outcomes.send(outcome).is_err() {
            return;
        }
    }
    tracing::debug!("Save queue closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_copy_keeps_note_dirty() {
        let written = Note::new("a");
        let outcome = SaveOutcome {
            key: NoteKey::from("a"),
            note: written.clone(),
            save_date: written.modify_date + 10.0,
        };

        let mut live = written;
        assert_eq!(outcome.save_date_for(&live), outcome.save_date);

        live.touch();
        live.save_date = outcome.save_date_for(&live);
        assert!(live.needs_save());
    }
}
