use crate::commands::common::{edit_text, open_database, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_edit(key: &str, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let key = resolve_note_key(&db, key)?;
    let current = db.note_content(&key)?;

    let Some(updated) = edit_text(&current)? else {
        return Err(CliError::EmptyEditedContent);
    };

    if db.set_content(&key, &updated)? {
        println!("{key}");
    } else {
        println!("No changes");
    }
    db.close();
    Ok(())
}
