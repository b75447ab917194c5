//! Plain text mirror of the note store.
//!
//! Every live note is also written to `<txt_path>/<title>.txt`. Text files are
//! reconciled against the JSON store by modification time when the store is
//! loaded, so notes edited with an external editor flow back in.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{modified_secs, write_atomic, JsonEntry};
use crate::config::NotesConfig;
use crate::error::{Error, Result};
use crate::models::{Note, NoteKey};
use crate::util::{note_title, title_file_name, unix_timestamp_now};

/// Text file mirror and the title-to-file mapping of the current session.
#[derive(Debug)]
pub struct TextMirror {
    txt_path: PathBuf,
    extensions: Vec<String>,
    replace_spaces: bool,
    titles: HashMap<NoteKey, String>,
}

impl TextMirror {
    pub fn new(config: &NotesConfig) -> Self {
        Self {
            txt_path: config.txt_dir(),
            extensions: config.read_txt_extensions.clone(),
            replace_spaces: config.replace_filename_spaces,
            titles: HashMap::new(),
        }
    }

    /// Merge JSON notes with the text files on disk.
    pub(crate) fn load(
        &mut self,
        entries: Vec<JsonEntry>,
        keep_tombstones: bool,
    ) -> Result<BTreeMap<NoteKey, Note>> {
        fs::create_dir_all(&self.txt_path)?;
        let now = unix_timestamp_now();
        let mut text_files = self.text_files()?;
        let mut notes = BTreeMap::new();

        if text_files.is_empty() && !entries.is_empty() {
            tracing::info!("Text mirror activated for the first time, scheduling every note for re-save and re-sync");
            for entry in entries {
                let mut note = entry.note;
                note.save_date = 0.0;
                note.sync_date = 0.0;
                notes.insert(entry.key, note);
            }
            return Ok(notes);
        }

        for entry in entries {
            let JsonEntry { key, path, mut note } = entry;
            let text_file = title_file_name(&note.content, self.replace_spaces)
                .map(|name| (self.txt_path.join(&name), name))
                .filter(|(text_path, _)| text_path.is_file());

            if let Some((text_path, name)) = text_file {
                text_files.remove(&text_path);
                let text_mtime = modified_secs(&text_path).map_err(|error| Error::read(&text_path, error))?;
                let json_mtime = modified_secs(&path).map_err(|error| Error::read(&path, error))?;
                if text_mtime > json_mtime {
                    tracing::debug!("Text note was changed: {}", text_path.display());
                    note.content = read_text(&text_path)?;
                    note.modify_date = text_mtime;
                }
                self.titles.insert(key.clone(), name);
            } else if keep_tombstones {
                tracing::debug!("Text file of note {key} is gone, marking it deleted");
                note.deleted = true;
                note.modify_date = now;
            } else {
                tracing::debug!("Text file of note {key} is gone, deleting {}", path.display());
                fs::remove_file(&path).map_err(|error| Error::write(&path, error))?;
                continue;
            }

            note.save_date = note.save_stamp(now);
            notes.insert(key, note);
        }

        let mut text_files: Vec<_> = text_files.into_iter().collect();
        text_files.sort();
        for text_path in text_files {
            tracing::debug!("New text note found: {}", text_path.display());
            let content = read_text(&text_path)?;
            let mut key = NoteKey::generate();
            while notes.contains_key(&key) {
                key = NoteKey::generate();
            }

            let mut note = Note::new(content);
            let stem = text_path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default();
            if stem != note_title(&note.content) {
                note.content = format!("{stem}\n\n{}", note.content);
            }
            notes.insert(key, note);

            fs::remove_file(&text_path).map_err(|error| Error::write(&text_path, error))?;
        }

        Ok(notes)
    }

    /// Write (or remove, for tombstones) the text file of a note.
    pub fn save(&mut self, key: &NoteKey, note: &Note) -> Result<()> {
        let Some(name) = title_file_name(&note.content, self.replace_spaces) else {
            return Ok(());
        };

        if note.deleted {
            if let Some(previous) = self.titles.remove(key) {
                remove_if_exists(&self.txt_path.join(previous))?;
            }
            return Ok(());
        }

        if let Some(previous) = self.titles.get(key) {
            if previous != &name {
                tracing::debug!("Note {key} was renamed from {previous} to {name}");
                remove_if_exists(&self.txt_path.join(previous))?;
            }
        }

        let path = self.txt_path.join(&name);
        self.titles.insert(key.clone(), name);
        write_atomic(&path, note.content.as_bytes()).map_err(|error| {
            tracing::error!("Error writing {}: {}", path.display(), error);
            Error::write(&path, error)
        })
    }

    /// Remove the text file of a note that left the table.
    pub fn remove_file(&mut self, key: &NoteKey, note: &Note) -> Result<()> {
        let name = self
            .titles
            .remove(key)
            .or_else(|| title_file_name(&note.content, self.replace_spaces));
        match name {
            Some(name) => remove_if_exists(&self.txt_path.join(name)),
            None => Ok(()),
        }
    }

    /// Drop the file mapping of a key without touching the file.
    pub fn forget(&mut self, key: &NoteKey) {
        self.titles.remove(key);
    }

    fn text_files(&self) -> Result<HashSet<PathBuf>> {
        let entries = fs::read_dir(&self.txt_path).map_err(|error| Error::read(&self.txt_path, error))?;
        let mut files = HashSet::new();
        for entry in entries {
            let path = entry.map_err(|error| Error::read(&self.txt_path, error))?.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext));
            if matches && path.is_file() {
                files.insert(path);
            }
        }
        Ok(files)
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|error| {
        tracing::error!("Error opening {}: {}", path.display(), error);
        Error::read(path, error)
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("Deleted text file {}", path.display());
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(Error::write(path, error)),
    }
}
