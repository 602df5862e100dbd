//! Database layer for release-archivist
//!
//! Handles SQLite persistence of the file registry: one row per stored entity
//! plus one row per uploaded archive part.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`registry`] - Lookups and the transactional per-entity commit
//! - [`store`] - The [`RegistryStore`] capability consumed by the pipeline

use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod registry;
mod store;

pub use store::RegistryStore;

/// New registry record to be inserted for a stored entity
#[derive(Debug, Clone)]
pub struct NewFileRecord {
    /// Entity name as it appeared in the release (relative path)
    pub original_name: String,
    /// Entity size in bytes (sum of members for folders)
    pub size: i64,
    /// Identity hash for folder entities
    pub content_hash: Option<String>,
    /// Category label (Base, Update, DLC, Unknown, Folder)
    pub category: String,
}

/// Registry record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FileRecord {
    /// Unique database ID
    pub id: i64,
    /// Entity name as it appeared in the release (relative path)
    pub original_name: String,
    /// Entity size in bytes
    pub size: i64,
    /// Identity hash for folder entities
    pub content_hash: Option<String>,
    /// Category label
    pub category: String,
    /// Unix timestamp when the record was committed
    pub created_at: i64,
}

/// New storage location (one per uploaded archive part)
#[derive(Debug, Clone)]
pub struct NewStorageLocation {
    /// Link returned by the remote uploader
    pub remote_link: String,
    /// Obfuscated archive name shared by all parts of one entity
    pub archive_name: String,
    /// Whether the archive was split into several parts
    pub is_parted: bool,
    /// 1-based part number
    pub part_number: i32,
    /// Number of parts of the archive
    pub total_parts: i32,
}

/// Storage location record from database
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StorageLocation {
    /// Unique database ID
    pub id: i64,
    /// Owning registry record
    pub file_id: i64,
    /// Link returned by the remote uploader
    pub remote_link: String,
    /// Obfuscated archive name shared by all parts of one entity
    pub archive_name: String,
    /// Whether the archive was split into several parts
    pub is_parted: bool,
    /// 1-based part number
    pub part_number: i32,
    /// Number of parts of the archive
    pub total_parts: i32,
}

/// Result of committing an entity to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new record was inserted with this id
    Inserted(i64),
    /// A record with the same identity hash was committed first; nothing was written
    AlreadyCommitted(i64),
}

impl CommitOutcome {
    /// Id of the registry record holding the entity
    pub fn id(&self) -> i64 {
        match self {
            CommitOutcome::Inserted(id) | CommitOutcome::AlreadyCommitted(id) => *id,
        }
    }
}

/// Database handle for release-archivist
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
