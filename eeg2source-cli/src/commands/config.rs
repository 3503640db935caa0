//! Configuration management CLI commands.

use clap::Subcommand;

use eeg2source::config::{config_file_path, to_config_string, ConfigFile};

use super::common;
use crate::error::CliError;

/// Config action subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration in INI form
    Show,
    /// Print the configuration file path
    Path,
    /// Create the configuration file with defaults if it does not exist
    Init,
}

/// Run a config subcommand.
pub fn run(action: ConfigAction) -> Result<i32, CliError> {
    match action {
        ConfigAction::Show => {
            let config = common::load_config()?;
            print!("{}", to_config_string(&config));
            Ok(0)
        }
        ConfigAction::Path => {
            println!("{}", config_file_path().display());
            Ok(0)
        }
        ConfigAction::Init => {
            let path = ConfigFile::ensure_exists()
                .map_err(|e| CliError::Config(e.to_string()))?;
            println!("Configuration at: {}", path.display());
            Ok(0)
        }
    }
}
