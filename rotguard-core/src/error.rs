use std::path::PathBuf;

use thiserror::Error;

/// Exit status used when another run already holds the lease (`EX_TEMPFAIL`).
pub const EXIT_LOCK_HELD: u8 = 75;
/// Exit status for fatal configuration problems (`EX_CONFIG`).
pub const EXIT_CONFIG: u8 = 78;

#[derive(Error, Debug)]
pub enum RotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Manifest error: {0}")]
    Manifest(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Another run holds the lock at {}", .0.display())]
    LockHeld(PathBuf),

    #[error("Parity error: {0}")]
    Parity(String),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),

    #[error("Format error: {0}")]
    Format(String),
}

impl RotError {
    /// Process exit status for a run-level failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            RotError::LockHeld(_) => EXIT_LOCK_HELD,
            RotError::Config(_) => EXIT_CONFIG,
            _ => 1,
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, RotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_run_level_failures() {
        assert_eq!(RotError::LockHeld(PathBuf::from("/x")).exit_code(), 75);
        assert_eq!(RotError::Config("bad".into()).exit_code(), 78);
        assert_eq!(RotError::Parity("boom".into()).exit_code(), 1);
    }
}
