//! Composable ordering of filter results.
//!
//! Each policy is a function from a note to an orderable key; a sorter
//! compares notes by the tuple of its keys, left to right.

use std::cmp::{Ordering, Reverse};

use super::NoteInfo;
use crate::config::{NotesConfig, SortMode};

/// Orderable key produced by a sort policy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortKey {
    Rank(u8),
    Text(String),
    AlphaNum(Vec<AlphaNumElement>),
    NewestFirst(Reverse<i64>),
}

/// One run of an alphanumerically split title.
///
/// Exactly one component is set for a non-empty run; an absent component
/// sorts before a present one. Digit runs are stored as
/// `(significant digits, digits)` so they compare by numeric value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AlphaNumElement {
    digits: Option<(usize, String)>,
    letters: Option<String>,
    other: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Digit,
    Letter,
    Other,
}

impl CharClass {
    fn of(c: char) -> Self {
        if c.is_ascii_digit() {
            Self::Digit
        } else if c.is_alphanumeric() {
            Self::Letter
        } else {
            Self::Other
        }
    }
}

/// Sort policy: extracts one key from a note.
pub type KeyFn = fn(&NoteInfo) -> SortKey;

/// Pinned notes first.
pub fn pinned_first(info: &NoteInfo) -> SortKey {
    SortKey::Rank(u8::from(!info.note.is_pinned()))
}

/// Alphabetical by title.
pub fn title(info: &NoteInfo) -> SortKey {
    SortKey::Text(info.note.title().to_string())
}

/// Alphanumeric by title: `note 2` before `note 10`.
pub fn alpha_num_title(info: &NoteInfo) -> SortKey {
    SortKey::AlphaNum(alpha_num_elements(info.note.title()))
}

/// Last modified first.
pub fn modified_newest_first(info: &NoteInfo) -> SortKey {
    SortKey::NewestFirst(Reverse(timestamp_micros(info.note.modify_date)))
}

/// Last created first.
pub fn created_newest_first(info: &NoteInfo) -> SortKey {
    SortKey::NewestFirst(Reverse(timestamp_micros(info.note.create_date)))
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp_micros(secs: f64) -> i64 {
    (secs * 1_000_000.0) as i64
}

/// Split a title into runs of digits, letters and other characters.
pub fn alpha_num_elements(title: &str) -> Vec<AlphaNumElement> {
    let mut elements = Vec::new();
    let mut chars = title.chars().peekable();

    while let Some(first) = chars.next() {
        let class = CharClass::of(first);
        let mut run = String::from(first);
        while let Some(&next) = chars.peek() {
            if CharClass::of(next) != class {
                break;
            }
            run.push(next);
            chars.next();
        }
        elements.push(match class {
            CharClass::Digit => {
                let significant = run.trim_start_matches('0').to_string();
                AlphaNumElement {
                    digits: Some((significant.len(), significant)),
                    letters: None,
                    other: None,
                }
            }
            CharClass::Letter => AlphaNumElement {
                digits: None,
                letters: Some(run),
                other: None,
            },
            CharClass::Other => AlphaNumElement {
                digits: None,
                letters: None,
                other: Some(run),
            },
        });
    }

    if elements.is_empty() {
        elements.push(AlphaNumElement {
            digits: None,
            letters: None,
            other: None,
        });
    }
    elements
}

/// Lexicographic combination of sort policies.
#[derive(Clone)]
pub struct NoteSorter {
    keys: Vec<KeyFn>,
}

impl NoteSorter {
    pub fn new(keys: Vec<KeyFn>) -> Self {
        Self { keys }
    }

    /// Sorter for the configured sort mode, pinned notes first if enabled.
    pub fn from_config(config: &NotesConfig) -> Self {
        let mut keys: Vec<KeyFn> = Vec::new();
        if config.pinned_on_top {
            keys.push(pinned_first);
        }
        keys.push(match config.sort_mode {
            SortMode::Alpha => title,
            SortMode::AlphaNum => alpha_num_title,
            SortMode::ModificationDate => modified_newest_first,
            SortMode::CreationDate => created_newest_first,
        });
        Self::new(keys)
    }

    pub fn compare(&self, a: &NoteInfo, b: &NoteInfo) -> Ordering {
        self.keys
            .iter()
            .map(|key| key(a).cmp(&key(b)))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable sort; notes equal under every policy keep their order.
    pub fn sort(&self, notes: &mut [NoteInfo]) {
        notes.sort_by(|a, b| self.compare(a, b));
    }
}
