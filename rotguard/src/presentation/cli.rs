use clap::{Parser, Subcommand};

/// Configuration comes from the environment (DATA_ROOT, PARITY_ROOT,
/// PAR2_REDUNDANCY, VERIFY_PERCENT, ...); the command line only picks the action.
#[derive(Parser)]
#[command(
    author,
    version,
    about = "rotguard: bit-rot protection with content-addressed parity",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full scan: detect changes, create parity, verify a sample, prune deletions
    Scan {
        /// Seed for the verification sample (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Verify unchanged files against their parity; creates and deletes nothing
    Verify {
        /// Seed for the verification sample (reproducible runs)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Attempt to repair every file marked damaged
    Repair,

    /// Print the manifest status report
    Report,
}
