use std::path::PathBuf;

use crate::cli::ConfigCommands;
use crate::config::{default_config_path, normalize_path_option, CliConfig};
use crate::error::CliError;

pub fn run_config(
    command: &ConfigCommands,
    db_path: Option<PathBuf>,
    remote_dir: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let config = CliConfig::load().map_err(CliError::Config)?;
            let settings = config.settings(db_path, remote_dir);
            println!("{}", serde_json::to_string_pretty(&settings.notes)?);
            if let Some(remote_dir) = &settings.remote_dir {
                println!("remote: {}", remote_dir.display());
            }
            println!("config: {}", default_config_path().display());
            Ok(())
        }
        ConfigCommands::Init {
            notes_as_txt,
            txt_path,
            search_mode,
            sort_mode,
            sync_debounce_secs,
        } => {
            let mut config = CliConfig::load().map_err(CliError::Config)?;

            if let Some(db_path) = normalize_path_option(db_path) {
                config.notes.db_path = db_path;
            }
            if let Some(remote_dir) = normalize_path_option(remote_dir) {
                config.remote_dir = Some(remote_dir);
            }
            if let Some(notes_as_txt) = notes_as_txt {
                config.notes.notes_as_txt = *notes_as_txt;
            }
            if let Some(txt_path) = normalize_path_option(txt_path.clone()) {
                config.notes.txt_path = Some(txt_path);
            }
            if let Some(search_mode) = search_mode {
                config.notes.search_mode = (*search_mode).into();
            }
            if let Some(sort_mode) = sort_mode {
                config.notes.sort_mode = (*sort_mode).into();
            }
            if let Some(secs) = sync_debounce_secs {
                config.notes.sync_debounce_secs = *secs;
            }

            config
                .notes
                .validate()
                .map_err(|error| CliError::Config(error.to_string()))?;
            let path = config.save().map_err(CliError::Config)?;
            println!("Saved configuration to {}", path.display());
            Ok(())
        }
    }
}
