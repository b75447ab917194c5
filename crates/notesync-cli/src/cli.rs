use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use notesync_core::{SearchMode, SortMode};

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "Keep plain text notes on disk and in sync with a remote note store")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory holding the note files
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Shared directory acting as the remote note store
    #[arg(long, global = true, value_name = "PATH")]
    pub remote_dir: Option<PathBuf>,

    /// Quick capture: notesync "my note here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note content; the first line is the title
        content: Vec<String>,
    },
    /// List notes, optionally filtered
    List {
        /// Filter query (`tag:name`, "quoted phrase", words, or a regex)
        query: Option<String>,
        /// Number of notes to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the content of a note
    Show {
        /// Note key or unique key prefix
        key: String,
    },
    /// Edit a note in $EDITOR
    Edit {
        /// Note key or unique key prefix
        key: String,
    },
    /// Add or remove tags
    Tag {
        #[command(subcommand)]
        command: TagCommands,
    },
    /// Pin a note to the top of listings
    Pin {
        /// Note key or unique key prefix
        key: String,
    },
    /// Unpin a note
    Unpin {
        /// Note key or unique key prefix
        key: String,
    },
    /// Delete a note
    Delete {
        /// Note key or unique key prefix
        key: String,
    },
    /// Show save and sync status of a note
    Status {
        /// Note key or unique key prefix
        key: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync notes with the remote note store
    Sync {
        /// Reconcile the whole database instead of pushing local changes
        #[arg(long)]
        full: bool,
    },
    /// Show or update the CLI configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// Add comma or space separated tags
    Add {
        /// Note key or unique key prefix
        key: String,
        /// Tags to add
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove one tag
    Remove {
        /// Note key or unique key prefix
        key: String,
        /// Tag to remove
        tag: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Create or update the configuration file
    Init {
        /// Mirror every note as a plain text file
        #[arg(long, value_name = "BOOL")]
        notes_as_txt: Option<bool>,
        /// Directory of the text mirror
        #[arg(long, value_name = "PATH")]
        txt_path: Option<PathBuf>,
        /// How list queries are interpreted
        #[arg(long, value_enum)]
        search_mode: Option<SearchModeArg>,
        /// Primary ordering of listings
        #[arg(long, value_enum)]
        sort_mode: Option<SortModeArg>,
        /// Seconds a note must stay untouched before it is synced
        #[arg(long, value_name = "SECONDS")]
        sync_debounce_secs: Option<f64>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SearchModeArg {
    Gstyle,
    Regexp,
}

impl From<SearchModeArg> for SearchMode {
    fn from(value: SearchModeArg) -> Self {
        match value {
            SearchModeArg::Gstyle => Self::Gstyle,
            SearchModeArg::Regexp => Self::Regexp,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortModeArg {
    Alpha,
    AlphaNum,
    Modified,
    Created,
}

impl From<SortModeArg> for SortMode {
    fn from(value: SortModeArg) -> Self {
        match value {
            SortModeArg::Alpha => Self::Alpha,
            SortModeArg::AlphaNum => Self::AlphaNum,
            SortModeArg::Modified => Self::ModificationDate,
            SortModeArg::Created => Self::CreationDate,
        }
    }
}
