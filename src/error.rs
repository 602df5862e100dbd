//! Error types for release-archivist
//!
//! This module provides the error taxonomy for the ingestion pipeline:
//! - Registry availability errors (dedup resolution aborts wholesale)
//! - Fetch, pack, split and upload failures (abort the current entity/release)
//! - Task lifecycle violations
//! - Machine-readable error codes for UI/chat layers

use crate::types::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release-archivist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for release-archivist
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "encryption_password")
        key: Option<String>,
    },

    /// The file registry could not be reached; no partial results are returned
    #[error("registry unavailable: {0}")]
    StoreUnavailable(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Fetching release files failed
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Archive packing/splitting error
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Remote upload error
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Attempted a task status change that is not a forward transition
    #[error("invalid task transition for {id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Task whose status change was rejected
        id: TaskId,
        /// Current status
        from: TaskStatus,
        /// Requested status
        to: TaskStatus,
    },

    /// Storage root is at or above the configured usage limit
    #[error("storage limit reached: {used} bytes used, limit {limit} bytes")]
    InsufficientSpace {
        /// Bytes currently used under the storage root
        used: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new releases
    #[error("shutdown in progress: not accepting new releases")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Constraint violation (e.g., duplicate content hash)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Archive packing, splitting and unpacking errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Building the encrypted archive failed; the output directory may be contaminated
    #[error("packing {archive} failed: {reason}")]
    PackFailed {
        /// The archive being written
        archive: PathBuf,
        /// The reason packing failed
        reason: String,
    },

    /// Splitting failed; the unsplit archive is left in place for manual recovery
    #[error("splitting {archive} incomplete: {reason}")]
    SplitIncomplete {
        /// The unsplit archive left on disk
        archive: PathBuf,
        /// The reason splitting failed
        reason: String,
    },

    /// Reassembling or decrypting parts failed
    #[error("unpacking {archive} failed: {reason}")]
    UnpackFailed {
        /// The (reassembled) archive being extracted
        archive: PathBuf,
        /// The reason unpacking failed
        reason: String,
    },
}

/// Remote artifact upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The uploading identity is not established
    #[error("uploader is not authorized")]
    NotAuthorized,

    /// The upload of a single part failed
    #[error("failed to upload {path}: {reason}")]
    Failed {
        /// Local path of the part
        path: PathBuf,
        /// The reason the upload failed
        reason: String,
    },
}

impl Error {
    /// Machine-readable error code, stable across releases
    ///
    /// Intended for chat/UI layers that want to branch on failure kind without
    /// parsing messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::StoreUnavailable(_) => "store_unavailable",
            Error::Database(_) => "database_error",
            Error::Sqlx(_) => "database_error",
            Error::FetchFailed(_) => "fetch_failed",
            Error::Archive(e) => match e {
                ArchiveError::PackFailed { .. } => "pack_failed",
                ArchiveError::SplitIncomplete { .. } => "split_incomplete",
                ArchiveError::UnpackFailed { .. } => "unpack_failed",
            },
            Error::Upload(e) => match e {
                UploadError::NotAuthorized => "not_authorized",
                UploadError::Failed { .. } => "upload_failed",
            },
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::InsufficientSpace { .. } => "insufficient_space",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    /// Returns (Error, expected_error_code) for every match arm in `error_code`.
    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "missing".into(),
                    key: Some("encryption_password".into()),
                },
                "config_error",
            ),
            (
                Error::StoreUnavailable("pool closed".into()),
                "store_unavailable",
            ),
            (
                Error::Database(DatabaseError::QueryFailed("timeout".into())),
                "database_error",
            ),
            (Error::FetchFailed("no peers".into()), "fetch_failed"),
            (
                Error::Archive(ArchiveError::PackFailed {
                    archive: PathBuf::from("/tmp/a.7z"),
                    reason: "disk full".into(),
                }),
                "pack_failed",
            ),
            (
                Error::Archive(ArchiveError::SplitIncomplete {
                    archive: PathBuf::from("/tmp/a.7z"),
                    reason: "disk full".into(),
                }),
                "split_incomplete",
            ),
            (
                Error::Archive(ArchiveError::UnpackFailed {
                    archive: PathBuf::from("/tmp/a.7z"),
                    reason: "bad password".into(),
                }),
                "unpack_failed",
            ),
            (Error::Upload(UploadError::NotAuthorized), "not_authorized"),
            (
                Error::Upload(UploadError::Failed {
                    path: PathBuf::from("/tmp/a.7z.001"),
                    reason: "reset".into(),
                }),
                "upload_failed",
            ),
            (
                Error::InvalidTransition {
                    id: TaskId::from("abcd1234"),
                    from: TaskStatus::Completed,
                    to: TaskStatus::Downloading,
                },
                "invalid_transition",
            ),
            (
                Error::InsufficientSpace {
                    used: 10,
                    limit: 5,
                },
                "insufficient_space",
            ),
            (
                Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone")),
                "io_error",
            ),
            (Error::ShuttingDown, "shutting_down"),
            (Error::Other("unknown".into()), "internal_error"),
        ]
    }

    #[test]
    fn every_variant_has_expected_error_code() {
        for (error, expected) in all_error_variants() {
            assert_eq!(error.error_code(), expected, "wrong code for {error:?}");
        }
    }

    #[test]
    fn nested_errors_convert_via_from() {
        let err: Error = UploadError::NotAuthorized.into();
        assert!(matches!(err, Error::Upload(UploadError::NotAuthorized)));

        let err: Error = DatabaseError::ConnectionFailed("refused".into()).into();
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn split_incomplete_message_names_archive() {
        let err = Error::Archive(ArchiveError::SplitIncomplete {
            archive: PathBuf::from("/data/abc.7z"),
            reason: "no space left".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("/data/abc.7z"));
        assert!(msg.contains("no space left"));
    }
}
