//! Per-component error types shared across the crate.
//!
//! Each component that can fail defines its own error enum with `thiserror`,
//! following the same convention the rest of this crate's modules use
//! (`XError` + `pub type XResult<T> = Result<T, XError>`). This module holds
//! the handful of error kinds shared by more than one component (lock
//! acquisition, I/O, JSON) so individual modules can `#[from]` into their own
//! enum without duplicating variants.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from acquiring or holding an advisory file lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("could not acquire lock on {path} after {attempts} attempts")]
    TimedOut { path: PathBuf, attempts: u32 },

    #[error("io error opening lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from reading, parsing, or writing the append-only JSONL stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record is not JSON-serialisable: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
