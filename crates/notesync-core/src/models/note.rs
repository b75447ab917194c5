//! Note model

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::remote::RemoteNote;
use crate::util::{note_title, unix_timestamp_now};

/// System tag marking a note as pinned.
pub const PINNED_TAG: &str = "pinned";

/// Smallest step used to keep `modify_date` strictly increasing.
const MODIFY_TICK: f64 = 1e-6;

/// Key of a note in the local table.
///
/// A key is either a locally generated one (before the remote service has
/// accepted the note) or the remote key assigned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteKey(String);

impl NoteKey {
    /// Generate a fresh random local key
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Get the string representation of this key
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NoteKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NoteKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for NoteKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A versioned note record.
///
/// `save_date` and `sync_date` are bookkeeping: they record when the note was
/// last written to disk and last reconciled with the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Plain text body; its first line is the title
    pub content: String,
    /// User tags, kept sorted
    #[serde(default)]
    pub tags: Vec<String>,
    /// System tags such as `pinned`
    #[serde(default)]
    pub system_tags: Vec<String>,
    /// Creation timestamp (Unix seconds)
    pub create_date: f64,
    /// Last user modification (Unix seconds)
    pub modify_date: f64,
    /// Last write to disk (Unix seconds, 0 when never written)
    #[serde(default)]
    pub save_date: f64,
    /// Last reconciliation with the remote (Unix seconds, 0 when never synced)
    #[serde(default)]
    pub sync_date: f64,
    /// Key assigned by the remote service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_key: Option<NoteKey>,
    /// Version counter assigned by the remote service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_version: Option<u64>,
    /// Tombstone flag
    #[serde(default)]
    pub deleted: bool,
}

impl Note {
    /// Create a new, never saved and never synced note
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let now = unix_timestamp_now();
        Self {
            content: content.into(),
            tags: Vec::new(),
            system_tags: Vec::new(),
            create_date: now,
            modify_date: now,
            save_date: 0.0,
            sync_date: 0.0,
            remote_key: None,
            remote_version: None,
            deleted: false,
        }
    }

    /// Build a local record from a full remote copy.
    #[must_use]
    pub fn from_remote(remote: &RemoteNote) -> Self {
        let now = unix_timestamp_now();
        let mut note = Self {
            content: String::new(),
            tags: Vec::new(),
            system_tags: Vec::new(),
            create_date: remote.create_date.unwrap_or(now),
            modify_date: remote.modify_date.unwrap_or(now),
            save_date: 0.0,
            sync_date: 0.0,
            remote_key: None,
            remote_version: None,
            deleted: false,
        };
        note.apply_remote(remote);
        note
    }

    /// Whether the note has changes not yet written to disk.
    pub fn needs_save(&self) -> bool {
        self.modify_date > self.save_date || self.sync_date > self.save_date
    }

    /// `save_date` to record after writing this note at `now`.
    ///
    /// Never below the note's own dates, so a note dated ahead of the local
    /// clock still counts as saved.
    pub fn save_stamp(&self, now: f64) -> f64 {
        now.max(self.modify_date).max(self.sync_date)
    }

    /// Whether the note has to be sent to the remote service.
    pub fn needs_sync(&self) -> bool {
        self.remote_key.is_none() || self.modify_date > self.sync_date
    }

    /// Compare every field except the `save_date`/`sync_date` bookkeeping.
    pub fn is_identical(&self, other: &Self) -> bool {
        self.is_content_identical(other) && self.remote_version == other.remote_version
    }

    /// Like [`Note::is_identical`] but also ignores `remote_version`, which
    /// the remote service bumps on every accepted write.
    pub fn is_content_identical(&self, other: &Self) -> bool {
        self.content == other.content
            && self.tags == other.tags
            && self.system_tags == other.system_tags
            && self.create_date == other.create_date
            && self.modify_date == other.modify_date
            && self.remote_key == other.remote_key
            && self.deleted == other.deleted
    }

    /// First non-blank line of the content.
    pub fn title(&self) -> &str {
        note_title(&self.content)
    }

    pub fn is_pinned(&self) -> bool {
        self.system_tags.iter().any(|tag| tag == PINNED_TAG)
    }

    /// Advance `modify_date`, never leaving it equal to the previous value.
    pub fn touch(&mut self) {
        self.modify_date = unix_timestamp_now().max(self.modify_date + MODIFY_TICK);
    }

    /// Replace content, returning whether anything changed.
    pub fn set_content(&mut self, content: &str) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content.to_string();
        self.touch();
        true
    }

    /// Merge tags into the sorted tag set, returning whether anything changed.
    pub fn add_tags<I, S>(&mut self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut merged = self.tags.clone();
        merged.extend(tags.into_iter().map(Into::into));
        merged.sort();
        merged.dedup();
        if merged == self.tags {
            return false;
        }
        self.tags = merged;
        self.touch();
        true
    }

    /// Remove one tag, returning whether it was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        if self.tags.len() == before {
            return false;
        }
        self.touch();
        true
    }

    /// Set or clear the pinned system tag, returning whether anything changed.
    pub fn set_pinned(&mut self, pinned: bool) -> bool {
        if self.is_pinned() == pinned {
            return false;
        }
        if pinned {
            self.system_tags.push(PINNED_TAG.to_string());
        } else {
            self.system_tags.retain(|tag| tag != PINNED_TAG);
        }
        self.touch();
        true
    }

    /// Turn the note into a tombstone, returning whether it was live.
    pub fn mark_deleted(&mut self) -> bool {
        if self.deleted {
            return false;
        }
        self.deleted = true;
        self.touch();
        true
    }

    /// Overwrite local fields with a remote copy.
    ///
    /// Fields the remote omitted (content, dates) keep their local values.
    pub fn apply_remote(&mut self, remote: &RemoteNote) {
        self.absorb_remote_identity(remote);
        if let Some(content) = &remote.content {
            self.content.clone_from(content);
        }
        self.tags.clone_from(&remote.tags);
        self.system_tags.clone_from(&remote.system_tags);
        if let Some(create_date) = remote.create_date {
            self.create_date = create_date;
        }
        if let Some(modify_date) = remote.modify_date {
            self.modify_date = modify_date;
        }
        self.deleted = remote.deleted;
    }

    /// Take over only the key and version the remote assigned.
    pub fn absorb_remote_identity(&mut self, remote: &RemoteNote) {
        self.remote_key = Some(remote.key.clone());
        self.remote_version = Some(remote.version);
    }
}
