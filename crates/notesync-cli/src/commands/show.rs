use crate::commands::common::{open_database, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_show(key: &str, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let key = resolve_note_key(&db, key)?;
    let content = db.note_content(&key)?;
    db.close();

    println!("{content}");
    Ok(())
}
