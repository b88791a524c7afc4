pub mod handlers;

use crate::logging;
use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use rotguard_core::Config;
use rotguard_core::error::Result;
use tracing::info;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    logging::init(&config.log_level);

    info!(
        backend = %config.backend,
        redundancy = config.redundancy_percent,
        timeout_s = config.parity_timeout.as_secs(),
        min_size = config.min_file_size,
        max_size = %config.max_size_display(),
        verify_percent = config.verify_percent,
        exclude = %config.exclude_patterns.join(","),
        "config"
    );

    match cli.command {
        Commands::Scan { seed } => handlers::handle_scan(&config, seed),
        Commands::Verify { seed } => handlers::handle_verify(&config, seed),
        Commands::Repair => handlers::handle_repair(&config),
        Commands::Report => handlers::handle_report(&config),
    }
}
