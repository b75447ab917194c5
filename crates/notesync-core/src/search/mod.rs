//! Note filtering.
//!
//! Filtering never mutates notes; the caller hands in a view of the table and
//! gets copies of the matching notes back.

pub mod sort;

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::config::{NotesConfig, SearchMode};
use crate::models::{Note, NoteKey};

pub use sort::NoteSorter;

/// A note matched by a filter.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteInfo {
    pub key: NoteKey,
    pub note: Note,
    /// The query matched through a tag
    pub tag_found: bool,
}

/// Outcome of filtering the table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterResult {
    pub notes: Vec<NoteInfo>,
    /// Pattern a UI can use to highlight matches in note bodies
    pub highlight: String,
    /// Number of notes that are not tombstones
    pub active: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagMatch {
    Missing,
    Matched,
    NotRequested,
}

/// Query parser and matcher configured from [`NotesConfig`].
#[derive(Debug, Clone)]
pub struct NoteFilter {
    mode: SearchMode,
    case_sensitive: bool,
    search_tags: bool,
}

impl NoteFilter {
    pub fn from_config(config: &NotesConfig) -> Self {
        Self {
            mode: config.search_mode,
            case_sensitive: config.case_sensitive,
            search_tags: config.search_tags,
        }
    }

    /// Match notes against `query`. Tombstones are skipped and not counted.
    pub fn filter<'a, I>(&self, notes: I, query: Option<&str>) -> FilterResult
    where
        I: IntoIterator<Item = (&'a NoteKey, &'a Note)>,
    {
        let query = query.map(str::trim).filter(|query| !query.is_empty());
        match self.mode {
            SearchMode::Gstyle => self.filter_gstyle(notes, query),
            SearchMode::Regexp => self.filter_regexp(notes, query),
        }
    }

    fn filter_gstyle<'a, I>(&self, notes: I, query: Option<&str>) -> FilterResult
    where
        I: IntoIterator<Item = (&'a NoteKey, &'a Note)>,
    {
        let mut result = FilterResult::default();

        let Some(query) = query else {
            for (key, note) in notes {
                if !note.deleted {
                    result.active += 1;
                    result.notes.push(info(key, note, false));
                }
            }
            return result;
        };

        let (tag_patterns, word_patterns) = parse_gstyle(query);
        let word_patterns_folded: Vec<String> = if self.case_sensitive {
            word_patterns.clone()
        } else {
            word_patterns.iter().map(|word| word.to_lowercase()).collect()
        };

        for (key, note) in notes {
            if note.deleted {
                continue;
            }
            result.active += 1;

            let tag_match = match_tags(&tag_patterns, note);
            if tag_match == TagMatch::Missing {
                continue;
            }

            let content = if self.case_sensitive {
                note.content.clone()
            } else {
                note.content.to_lowercase()
            };
            if word_patterns_folded
                .iter()
                .all(|word| content.contains(word.as_str()))
            {
                result
                    .notes
                    .push(info(key, note, tag_match == TagMatch::Matched));
            }
        }

        result.highlight = word_patterns
            .iter()
            .map(|word| regex::escape(word))
            .collect::<Vec<_>>()
            .join("|");
        result
    }

    fn filter_regexp<'a, I>(&self, notes: I, query: Option<&str>) -> FilterResult
    where
        I: IntoIterator<Item = (&'a NoteKey, &'a Note)>,
    {
        let mut result = FilterResult::default();
        let pattern = query.and_then(|query| {
            RegexBuilder::new(query)
                .multi_line(true)
                .case_insensitive(!self.case_sensitive)
                .build()
                .map_err(|error| tracing::debug!("Ignoring invalid search pattern: {error}"))
                .ok()
        });
        if let (Some(query), Some(_)) = (query, &pattern) {
            result.highlight = query.to_string();
        }

        for (key, note) in notes {
            if note.deleted {
                continue;
            }
            result.active += 1;

            let Some(pattern) = &pattern else {
                result.notes.push(info(key, note, false));
                continue;
            };

            if self.search_tags && note.tags.iter().any(|tag| pattern.is_match(tag)) {
                result.notes.push(info(key, note, true));
            } else if pattern.is_match(&note.content) {
                result.notes.push(info(key, note, false));
            }
        }
        result
    }
}

fn info(key: &NoteKey, note: &Note, tag_found: bool) -> NoteInfo {
    NoteInfo {
        key: key.clone(),
        note: note.clone(),
        tag_found,
    }
}

/// Split a gstyle query into tag prefixes and words/phrases.
fn parse_gstyle(query: &str) -> (Vec<String>, Vec<String>) {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    let tokens = TOKENS.get_or_init(|| {
        Regex::new(r#"t(?:ag)?:(\S+)|"([^"]+)"|(\S+)"#).expect("valid regex")
    });

    let mut tags = Vec::new();
    let mut phrases = Vec::new();
    let mut words = Vec::new();
    for captures in tokens.captures_iter(query) {
        if let Some(tag) = captures.get(1) {
            tags.push(tag.as_str().to_string());
        } else if let Some(phrase) = captures.get(2) {
            phrases.push(phrase.as_str().to_string());
        } else if let Some(word) = captures.get(3) {
            words.push(word.as_str().to_string());
        }
    }
    phrases.extend(words);
    (tags, phrases)
}

fn match_tags(patterns: &[String], note: &Note) -> TagMatch {
    if patterns.is_empty() {
        return TagMatch::NotRequested;
    }
    if note.tags.is_empty() {
        return TagMatch::Missing;
    }
    let all_found = patterns
        .iter()
        .all(|pattern| note.tags.iter().any(|tag| tag.starts_with(pattern.as_str())));
    if all_found {
        TagMatch::Matched
    } else {
        TagMatch::Missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> Vec<(NoteKey, Note)> {
        let mut work = Note::new("Quarterly report\ndraft the Summary");
        work.tags = vec!["work".to_string(), "urgent".to_string()];
        let home = Note::new("Shopping list\nmilk and eggs");
        let mut gone = Note::new("deleted report");
        gone.deleted = true;
        vec![
            (NoteKey::from("a"), work),
            (NoteKey::from("b"), home),
            (NoteKey::from("c"), gone),
        ]
    }

    fn keys(result: &FilterResult) -> Vec<&str> {
        result.notes.iter().map(|info| info.key.as_str()).collect()
    }

    fn run(config: &NotesConfig, query: Option<&str>) -> FilterResult {
        let notes = table();
        NoteFilter::from_config(config).filter(notes.iter().map(|(k, n)| (k, n)), query)
    }

    #[test]
    fn empty_query_lists_live_notes() {
        let result = run(&NotesConfig::new("x"), None);
        assert_eq!(keys(&result), vec!["a", "b"]);
        assert_eq!(result.active, 2);
        assert_eq!(result.highlight, "");
    }

    #[test]
    fn gstyle_words_are_case_insensitive_by_default() {
        let result = run(&NotesConfig::new("x"), Some("REPORT"));
        assert_eq!(keys(&result), vec!["a"]);
        assert_eq!(result.active, 2);
        assert_eq!(result.highlight, "REPORT");
    }

    #[test]
    fn gstyle_tags_and_phrases() {
        let result = run(&NotesConfig::new("x"), Some(r#"t:urg "the summary""#));
        assert_eq!(keys(&result), vec!["a"]);
        assert!(result.notes[0].tag_found);
        assert_eq!(result.highlight, "the summary");

        let result = run(&NotesConfig::new("x"), Some("tag:home"));
        assert!(result.notes.is_empty());
    }

    #[test]
    fn gstyle_case_sensitive() {
        let mut config = NotesConfig::new("x");
        config.case_sensitive = true;
        assert!(run(&config, Some("shopping")).notes.is_empty());
        assert_eq!(keys(&run(&config, Some("Shopping"))), vec!["b"]);
    }

    #[test]
    fn regexp_matches_content_and_tags() {
        let mut config = NotesConfig::new("x");
        config.search_mode = SearchMode::Regexp;
        let result = run(&config, Some("^milk"));
        assert_eq!(keys(&result), vec!["b"]);
        assert_eq!(result.highlight, "^milk");

        let result = run(&config, Some("^urgent$"));
        assert_eq!(keys(&result), vec!["a"]);
        assert!(result.notes[0].tag_found);
    }

    #[test]
    fn invalid_regexp_matches_everything() {
        let mut config = NotesConfig::new("x");
        config.search_mode = SearchMode::Regexp;
        let result = run(&config, Some("(unclosed"));
        assert_eq!(keys(&result), vec!["a", "b"]);
        assert_eq!(result.highlight, "");
    }

    #[test]
    fn parse_gstyle_groups_tokens() {
        let (tags, words) = parse_gstyle(r#"t:tag1 tag:tag2 word1 "word2 word3""#);
        assert_eq!(tags, vec!["tag1", "tag2"]);
        assert_eq!(words, vec!["word2 word3", "word1"]);
    }
}
