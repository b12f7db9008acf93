use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BanditError {
    #[error("Snapshot (de)serialization failed: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },
    #[error("Inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid parameter {name} = {value}: must lie in {expected}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        expected: &'static str,
    },
    #[error("Unknown strategy: {0}")]
    UnknownStrategy(String),
    #[error("No choices available")]
    NoChoices,
    #[error("Unknown choice: {0}")]
    UnknownChoice(Uuid),
    #[error("Choice {0} has no display left to succeed")]
    SuccessExceedsDisplays(Uuid),
    #[error("Strategy returned lever {index} but only {lever_count} exist")]
    LeverOutOfRange { index: usize, lever_count: usize },
}

pub type Result<T> = std::result::Result<T, BanditError>;
