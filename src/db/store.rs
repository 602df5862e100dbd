//! Registry capability consumed by the dedup resolver and the pipeline.

use async_trait::async_trait;

use super::{
    CommitOutcome, Database, FileRecord, NewFileRecord, NewStorageLocation, StorageLocation,
};
use crate::Result;

/// Persistent registry of stored entities and their remote parts
///
/// Implementations must make [`commit_entity`](RegistryStore::commit_entity)
/// atomic (a record is never visible without all of its storage rows) and
/// keyed on the identity hash, so that committing an already stored folder
/// yields [`CommitOutcome::AlreadyCommitted`] instead of an error.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Look up a folder entity by its identity hash
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>>;

    /// Look up a file entity by relative path and size
    async fn find_by_name_size(&self, name: &str, size: u64) -> Result<Option<FileRecord>>;

    /// Storage rows of a record, ascending by part number
    async fn storage_locations(&self, file_id: i64) -> Result<Vec<StorageLocation>>;

    /// Persist a record and its parts
    async fn commit_entity(
        &self,
        record: NewFileRecord,
        parts: Vec<NewStorageLocation>,
    ) -> Result<CommitOutcome>;
}

#[async_trait]
impl RegistryStore for Database {
    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>> {
        Database::find_by_hash(self, content_hash).await
    }

    async fn find_by_name_size(&self, name: &str, size: u64) -> Result<Option<FileRecord>> {
        let size = i64::try_from(size).unwrap_or(i64::MAX);
        Database::find_by_name_size(self, name, size).await
    }

    async fn storage_locations(&self, file_id: i64) -> Result<Vec<StorageLocation>> {
        Database::storage_locations(self, file_id).await
    }

    async fn commit_entity(
        &self,
        record: NewFileRecord,
        parts: Vec<NewStorageLocation>,
    ) -> Result<CommitOutcome> {
        Database::commit_entity(self, &record, &parts).await
    }
}
