use crate::commands::common::{format_note_lines, note_to_list_item, open_database, NoteListItem};
use crate::config::Settings;
use crate::error::CliError;

pub fn run_list(
    query: Option<&str>,
    limit: Option<usize>,
    json: bool,
    settings: &Settings,
) -> Result<(), CliError> {
    let db = open_database(settings)?;
    let query = query.map(str::trim).filter(|query| !query.is_empty());
    let mut result = db.filter(query);
    db.close();

    if let Some(limit) = limit {
        result.notes.truncate(limit);
    }

    if json {
        let items: Vec<NoteListItem> = result.notes.iter().map(note_to_list_item).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if result.notes.is_empty() {
        if query.is_some() {
            println!("No notes match the query");
        } else {
            println!("No notes yet");
        }
        return Ok(());
    }

    for line in format_note_lines(&result.notes) {
        println!("{line}");
    }
    tracing::debug!(
        "Listed {} of {} active notes",
        result.notes.len(),
        result.active
    );
    Ok(())
}
