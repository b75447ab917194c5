use crate::commands::common::{open_database, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_delete(key: &str, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let key = resolve_note_key(&db, key)?;

    db.delete(&key)?;
    db.close();

    println!("{key}");
    Ok(())
}
