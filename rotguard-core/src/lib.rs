#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod notify;
pub mod parity;
pub mod parity_factory;
pub mod reconcile;
pub mod repair;
pub mod report;
pub mod snapshot;
pub mod stats;

pub mod util {
    pub mod clock;
    pub mod hash_forward;
}

pub mod hash {
    pub mod sha256;
}

// Re-exports: stable API surface
pub use config::Config;
pub use domain::{ContentHash, FileKey, FileRecord, FileStatus, RunKind, RunRecord};
pub use error::{Result, RotError};
pub use lock::RunLease;
pub use manifest::Manifest;
pub use parity::{ParityService, layout::ParityLayout, layout::ParityRef};
pub use parity_factory::{Backend, open_parity};
pub use reconcile::Reconciler;
pub use repair::Repairer;
pub use report::{Report, write_run_log};
pub use snapshot::{FsSnapshot, SnapshotSource};
pub use stats::RunSummary;
