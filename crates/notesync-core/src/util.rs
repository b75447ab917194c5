//! Shared utility functions used across multiple modules.

use std::sync::OnceLock;

use regex::Regex;

/// Characters that cannot appear in a mirrored text file name.
const FILENAME_ILLEGAL_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Current Unix timestamp in seconds, with sub-second precision.
pub fn unix_timestamp_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Split a comma/whitespace separated tag list into lowercase tags.
///
/// Empty fragments are dropped; duplicates are kept for the caller to merge.
pub fn sanitize_tags(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Title of a note body: its first non-blank line, trimmed.
pub fn note_title(content: &str) -> &str {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

/// File name used by the text mirror for a note body.
///
/// Returns `None` when the note has no usable title.
pub fn title_file_name(content: &str, replace_spaces: bool) -> Option<String> {
    static COLLAPSE: OnceLock<Regex> = OnceLock::new();

    let cleaned: String = note_title(content)
        .chars()
        .filter(|c| !FILENAME_ILLEGAL_CHARS.contains(c) && !c.is_control())
        .collect();
    let collapse = COLLAPSE.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    let cleaned = collapse.replace_all(cleaned.trim(), " ");
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        return None;
    }

    let stem = if replace_spaces {
        cleaned.replace(' ', "_")
    } else {
        cleaned.to_string()
    };
    Some(format!("{stem}.txt"))
}
