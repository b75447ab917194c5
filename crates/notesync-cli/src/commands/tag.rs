use crate::cli::TagCommands;
use crate::commands::common::{open_database, render_tags, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_tag(command: &TagCommands, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;

    let key = match command {
        TagCommands::Add { key, tags } => {
            let tags = tags.join(",");
            if notesync_core::util::sanitize_tags(&tags).is_empty() {
                return Err(CliError::EmptyTags);
            }
            let key = resolve_note_key(&db, key)?;
            db.add_tags(&key, &tags)?;
            key
        }
        TagCommands::Remove { key, tag } => {
            let key = resolve_note_key(&db, key)?;
            if !db.remove_tag(&key, tag)? {
                tracing::info!("Note {key} has no tag '{}'", tag.trim());
            }
            key
        }
    };

    let note = db.get_note(&key)?;
    db.close();

    println!("{key} {}", render_tags(&note.tags));
    Ok(())
}
