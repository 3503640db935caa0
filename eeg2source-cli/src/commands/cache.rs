//! Cache management CLI commands.

use clap::Subcommand;

use eeg2source::cache::ArtifactCache;
use eeg2source::config::{format_size, ConfigFile};

use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show artifact cache statistics
    Stats,
    /// Clear the artifact cache, removing all cached operators and results
    Clear,
}

/// Run a cache subcommand.
pub async fn run(action: CacheAction) -> Result<i32, CliError> {
    let config = ConfigFile::load().unwrap_or_default();
    let settings = config.cache;

    let cache = ArtifactCache::open(settings.directory.clone(), settings.max_size)
        .await
        .map_err(|e| CliError::Setup(format!("opening artifact cache: {e}")))?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("Artifact cache: {}", cache.directory().display());
            println!("  Entries: {}", stats.entry_count);
            println!(
                "  Size:    {} of {}",
                format_size(stats.total_bytes),
                format_size(stats.max_bytes)
            );
            Ok(0)
        }
        CacheAction::Clear => {
            println!("Clearing artifact cache at: {}", cache.directory().display());
            let (entries, bytes) = cache
                .clear()
                .await
                .map_err(|e| CliError::Setup(format!("clearing artifact cache: {e}")))?;
            println!("Deleted {} entries, freed {}", entries, format_size(bytes));
            Ok(0)
        }
    }
}
