use notesync_core::NoteStatus;
use serde::Serialize;

use crate::commands::common::{format_timestamp, open_database, resolve_note_key};
use crate::config::Settings;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusReport {
    key: String,
    remote_key: Option<String>,
    remote_version: Option<u64>,
    modified_at: f64,
    saved_at: f64,
    synced_at: f64,
    #[serde(flatten)]
    status: NoteStatus,
}

pub fn run_status(key: &str, json: bool, settings: &Settings) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let key = resolve_note_key(&db, key)?;
    let note = db.get_note(&key)?;
    let status = db.note_status(&key)?;
    db.close();

    let report = StatusReport {
        key: key.to_string(),
        remote_key: note.remote_key.as_ref().map(ToString::to_string),
        remote_version: note.remote_version,
        modified_at: note.modify_date,
        saved_at: note.save_date,
        synced_at: note.sync_date,
        status,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("key:      {}", report.key);
    if let Some(remote_key) = &report.remote_key {
        let version = report
            .remote_version
            .map_or_else(String::new, |version| format!(" (version {version})"));
        println!("remote:   {remote_key}{version}");
    }
    println!("modified: {}", format_timestamp(report.modified_at));
    println!(
        "saved:    {}{}",
        format_timestamp(report.saved_at),
        if status.saved { "" } else { " (pending)" }
    );
    println!(
        "synced:   {}{}",
        format_timestamp(report.synced_at),
        if status.synced { "" } else { " (pending)" }
    );
    Ok(())
}
