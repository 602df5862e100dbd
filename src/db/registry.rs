//! File registry lookups and the per-entity commit.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{
    CommitOutcome, Database, FileRecord, NewFileRecord, NewStorageLocation, StorageLocation,
};

impl Database {
    /// Find a registry record by folder identity hash
    pub async fn find_by_hash(&self, content_hash: &str) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, original_name, size, content_hash, category, created_at
            FROM files_registry
            WHERE content_hash = ?
            LIMIT 1
            "#,
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query by content hash: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Find a registry record by (name, size)
    ///
    /// When several records match, the oldest wins.
    pub async fn find_by_name_size(&self, name: &str, size: i64) -> Result<Option<FileRecord>> {
        let row = sqlx::query_as::<_, FileRecord>(
            r#"
            SELECT id, original_name, size, content_hash, category, created_at
            FROM files_registry
            WHERE original_name = ? AND size = ?
            ORDER BY id ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .bind(size)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to query by name and size: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Get all storage locations of a registry record, ordered by part number
    pub async fn storage_locations(&self, file_id: i64) -> Result<Vec<StorageLocation>> {
        let rows = sqlx::query_as::<_, StorageLocation>(
            r#"
            SELECT id, file_id, remote_link, archive_name, is_parted, part_number, total_parts
            FROM storage_locations
            WHERE file_id = ?
            ORDER BY part_number ASC
            "#,
        )
        .bind(file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list storage locations: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Insert a registry record together with all of its storage locations
    ///
    /// Runs in a single transaction: either the record and every part row are
    /// visible afterwards, or none of them are.
    ///
    /// Commits are keyed on the identity hash. If a record with the same
    /// `content_hash` already exists (e.g. a concurrent release stored the same
    /// folder first), nothing is written and the existing record's id is
    /// returned as [`CommitOutcome::AlreadyCommitted`].
    pub async fn commit_entity(
        &self,
        record: &NewFileRecord,
        parts: &[NewStorageLocation],
    ) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        let now = chrono::Utc::now().timestamp();

        let inserted = sqlx::query(
            r#"
            INSERT INTO files_registry (original_name, size, content_hash, category, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.original_name)
        .bind(record.size)
        .bind(&record.content_hash)
        .bind(&record.category)
        .bind(now)
        .execute(&mut *tx)
        .await;

        let result = match inserted {
            Ok(result) => result,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to roll back duplicate commit: {}",
                        e
                    )))
                })?;
                return self.existing_commit(record, db_err.message()).await;
            }
            Err(e) => {
                return Err(Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert registry record: {}",
                    e
                ))));
            }
        };

        let file_id = result.last_insert_rowid();

        for part in parts {
            sqlx::query(
                r#"
                INSERT INTO storage_locations (
                    file_id, remote_link, archive_name, is_parted, part_number, total_parts
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file_id)
            .bind(&part.remote_link)
            .bind(&part.archive_name)
            .bind(part.is_parted)
            .bind(part.part_number)
            .bind(part.total_parts)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert storage location: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit entity: {}",
                e
            )))
        })?;

        Ok(CommitOutcome::Inserted(file_id))
    }

    /// Resolve a unique violation to the record committed first
    async fn existing_commit(&self, record: &NewFileRecord, violation: &str) -> Result<CommitOutcome> {
        let existing = match &record.content_hash {
            Some(hash) => self.find_by_hash(hash).await?,
            None => None,
        };

        match existing {
            Some(found) => {
                tracing::info!(
                    entity = %record.original_name,
                    file_id = found.id,
                    "entity already committed under the same identity hash"
                );
                Ok(CommitOutcome::AlreadyCommitted(found.id))
            }
            None => Err(Error::Database(DatabaseError::ConstraintViolation(format!(
                "Entity {} already registered: {}",
                record.original_name, violation
            )))),
        }
    }

    /// Count registry records
    pub async fn count_records(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files_registry")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count registry records: {}",
                    e
                )))
            })?;

        Ok(count)
    }
}
