use notesync_core::NoteEvent;

use crate::commands::common::open_database;
use crate::config::Settings;
use crate::error::CliError;

pub fn run_sync(full: bool, settings: &Settings) -> Result<(), CliError> {
    if settings.remote_dir.is_none() {
        return Err(CliError::SyncNotConfigured);
    }

    // An explicit sync pushes every dirty note, however recent.
    let mut settings = settings.clone();
    settings.notes.sync_debounce_secs = 0.0;
    let mut db = open_database(&settings)?;

    if full {
        let _subscription = db.subscribe(|event| match event {
            NoteEvent::SyncProgress { message } => eprintln!("{message}"),
            NoteEvent::KeyChanged { old_key, new_key } => {
                tracing::info!("Note {old_key} is now {new_key}");
            }
            NoteEvent::SyncFailed { error, diagnostic } => {
                tracing::error!("{error}: {diagnostic}");
            }
            _ => {}
        });

        let result = if db.sync_full_threaded()? {
            db.wait_for_full_sync()
        } else {
            None
        };
        db.close();
        let errors = result.ok_or_else(|| {
            notesync_core::Error::Sync("a full sync is already running".to_string())
        })??;
        if errors == 0 {
            println!("Full sync complete");
        } else {
            println!("Full sync complete, {errors} notes could not be pulled");
        }
        return Ok(());
    }

    let first = db.sync_to_server_threaded(false);
    let rest = db.wait_for_sync();
    db.close();

    println!(
        "Queued {} notes: {} synced, {} failed",
        first.queued,
        first.synced + rest.synced,
        first.failed + rest.failed
    );
    Ok(())
}
