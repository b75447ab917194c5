use std::env;
use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use chrono::Utc;
use notesync_core::{DirectoryRemote, NoteInfo, NoteKey, NotesDb};
use serde::Serialize;

use crate::config::Settings;
use crate::error::CliError;

/// Number of key characters shown in listings.
pub const SHORT_KEY_LEN: usize = 12;

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub key: String,
    pub title: String,
    pub content: String,
    pub created_at: f64,
    pub modified_at: f64,
    pub relative_time: String,
    pub tags: Vec<String>,
    pub pinned: bool,
    pub synced: bool,
}

pub fn open_database(settings: &Settings) -> Result<NotesDb, CliError> {
    let mut builder = NotesDb::builder(settings.notes.clone());
    if let Some(remote_dir) = &settings.remote_dir {
        tracing::debug!("Using remote note store at {}", remote_dir.display());
        builder = builder.with_remote(Arc::new(DirectoryRemote::open(remote_dir)?));
    }
    Ok(builder.open()?)
}

/// Resolve a full key or a unique prefix of a live note's key.
pub fn resolve_note_key(db: &NotesDb, note_query: &str) -> Result<NoteKey, CliError> {
    let note_query = normalize_note_identifier(note_query)?;
    let live = db.filter(None).notes;

    if let Some(info) = live.iter().find(|info| info.key.as_str() == note_query) {
        return Ok(info.key.clone());
    }

    let matching: Vec<&NoteKey> = live
        .iter()
        .map(|info| &info.key)
        .filter(|key| key.as_str().starts_with(&note_query))
        .collect();

    match matching.as_slice() {
        [] => Err(CliError::NoteNotFound(note_query)),
        [key] => Ok((*key).clone()),
        keys => {
            let options = keys
                .iter()
                .take(3)
                .map(|key| short_key(key))
                .collect::<Vec<_>>()
                .join(", ");

            Err(CliError::AmbiguousNoteKey(format!(
                "Key prefix '{note_query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_key(key: &NoteKey) -> String {
    key.as_str().chars().take(SHORT_KEY_LEN).collect()
}

pub fn format_note_lines(notes: &[NoteInfo]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|info| {
            let short_key = short_key(&info.key);
            let marker = if info.note.is_pinned() { "*" } else { " " };
            let preview = note_preview(&info.note.content, 40);
            let relative_time = format_relative_time(timestamp_millis(info.note.modify_date), now_ms);
            let tags = render_tags(&info.note.tags);

            if tags.is_empty() {
                format!("{short_key:<12} {marker} {preview:<40}  {relative_time}")
            } else {
                format!("{short_key:<12} {marker} {preview:<40}  {relative_time:<10}  {tags}")
            }
        })
        .collect()
}

pub fn note_to_list_item(info: &NoteInfo) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    let note = &info.note;

    NoteListItem {
        key: info.key.to_string(),
        title: note.title().to_string(),
        content: note.content.clone(),
        created_at: note.create_date,
        modified_at: note.modify_date,
        relative_time: format_relative_time(timestamp_millis(note.modify_date), now_ms),
        tags: note.tags.clone(),
        pinned: note.is_pinned(),
        synced: !note.needs_sync(),
    }
}

#[allow(clippy::cast_possible_truncation)]
pub fn timestamp_millis(timestamp_secs: f64) -> i64 {
    (timestamp_secs * 1000.0) as i64
}

pub fn note_preview(content: &str, max_chars: usize) -> String {
    let title = notesync_core::util::note_title(content);
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn format_timestamp(timestamp_secs: f64) -> String {
    if timestamp_secs <= 0.0 {
        return "never".to_string();
    }
    let timestamp_ms = timestamp_millis(timestamp_secs);
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

/// Coarse age of `timestamp_ms`, e.g. `3h ago`.
pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    const UNITS: [(i64, &str); 6] = [
        (365 * 86_400_000, "y"),
        (30 * 86_400_000, "mo"),
        (7 * 86_400_000, "w"),
        (86_400_000, "d"),
        (3_600_000, "h"),
        (60_000, "m"),
    ];

    let age = now_ms.saturating_sub(timestamp_ms);
    UNITS
        .iter()
        .find(|(span, _)| age >= *span)
        .map_or_else(
            || "just now".to_string(),
            |(span, suffix)| format!("{}{suffix} ago", age / span),
        )
}

/// Note text from the arguments, then piped stdin, then the editor.
pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }
    edit_text("")?.ok_or(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    Some(content.trim())
        .filter(|trimmed| !trimmed.is_empty())
        .map(str::to_string)
}

pub fn normalize_note_identifier(key: &str) -> Result<String, CliError> {
    normalize_content(key).ok_or(CliError::EmptyNoteKey)
}

/// Let the user edit `initial` in `$VISUAL`/`$EDITOR`.
///
/// When stdin is not a terminal the new text is read from it instead, so
/// `echo text | notesync edit <key>` works in scripts.
pub fn edit_text(initial: &str) -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        let mut piped = String::new();
        stdin.lock().read_to_string(&mut piped)?;
        return Ok(normalize_content(&piped));
    }

    let mut buffer = tempfile::Builder::new()
        .prefix("notesync-")
        .suffix(".md")
        .tempfile()?;
    buffer.write_all(initial.as_bytes())?;
    buffer.flush()?;

    run_editor(&preferred_editor(), buffer.path())?;
    Ok(normalize_content(&std::fs::read_to_string(buffer.path())?))
}

/// Run `editor` on `file`. An editor value with arguments (`code --wait`)
/// is split on whitespace.
fn run_editor(editor: &str, file: &Path) -> Result<(), CliError> {
    let mut words = editor.split_whitespace();
    let program = words
        .next()
        .ok_or_else(|| CliError::EditorFailed("no editor configured".into()))?;

    let status = Command::new(program).args(words).arg(file).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!("`{editor}` exited with {status}")))
    }
}

pub fn preferred_editor() -> String {
    ["VISUAL", "EDITOR"]
        .into_iter()
        .find_map(|name| env::var(name).ok().filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}
