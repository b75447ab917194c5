use crate::commands::common::{open_database, resolve_note_content};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_add(content_parts: &[String], settings: &Settings) -> Result<(), CliError> {
    let content = resolve_note_content(content_parts)?;

    let db = open_database(settings)?;
    let key = db.create(&content);
    db.close();

    println!("{key}");
    Ok(())
}
