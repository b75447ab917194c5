use crate::commands::common::{open_database, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_pin(key: &str, pinned: bool, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let key = resolve_note_key(&db, key)?;
    let changed = db.set_pinned(&key, pinned)?;
    db.close();

    if changed {
        println!("{key}");
    } else if pinned {
        println!("Already pinned");
    } else {
        println!("Not pinned");
    }
    Ok(())
}
