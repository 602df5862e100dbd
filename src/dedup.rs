//! Release deduplication
//!
//! Turns a release manifest into the list of entities that are packed and
//! uploaded as one unit each, and checks every entity against the registry:
//!
//! - files are bucketed by parent directory, in first-encounter order
//! - a bucket with more than `threshold` members becomes one [`EntityKind::Folder`]
//!   identified by a SHA-256 over its sorted `(path, size)` members
//! - every other file is its own [`EntityKind::File`] identified by `(path, size)`
//!
//! Resolution is read-only and idempotent. A registry failure aborts the whole
//! resolution with [`Error::StoreUnavailable`].

use crate::db::RegistryStore;
use crate::types::{EntityKind, ReleaseEntity, ReleaseFile};
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Entity name used for a bucket of files at the release root
pub const ROOT_FOLDER_NAME: &str = ".";

/// Parent directory of a `/`-separated relative path (`""` at the root)
fn parent_dir(relative_path: &str) -> &str {
    relative_path
        .rsplit_once('/')
        .map(|(dir, _)| dir)
        .unwrap_or("")
}

/// Identity hash of a folder's members
///
/// Members are sorted by relative path before hashing, so the result does not
/// depend on manifest order.
pub fn folder_identity_hash<'a, I>(members: I) -> String
where
    I: IntoIterator<Item = &'a ReleaseFile>,
{
    let mut sorted: Vec<&ReleaseFile> = members.into_iter().collect();
    sorted.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(format!("{}|{}|", file.relative_path, file.size).as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Split a manifest into entities without consulting the registry
pub fn plan_entities(files: &[ReleaseFile], threshold: usize) -> Vec<ReleaseEntity> {
    // Buckets stay in encounter order; the map only locates them
    let mut buckets: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, file) in files.iter().enumerate() {
        let dir = parent_dir(&file.relative_path);
        match positions.get(dir) {
            Some(&position) => buckets[position].1.push(index),
            None => {
                positions.insert(dir, buckets.len());
                buckets.push((dir, vec![index]));
            }
        }
    }

    let mut entities = Vec::with_capacity(files.len());
    for (dir, mut members) in buckets {
        if members.len() > threshold {
            members.sort_by(|&a, &b| files[a].relative_path.cmp(&files[b].relative_path));
            let hash = folder_identity_hash(members.iter().map(|&i| &files[i]));
            let size = members.iter().map(|&i| files[i].size).sum();
            let name = if dir.is_empty() { ROOT_FOLDER_NAME } else { dir };

            entities.push(ReleaseEntity {
                kind: EntityKind::Folder,
                name: name.to_string(),
                size,
                member_indices: members,
                identity_hash: Some(hash),
                exists: false,
                storage_link: None,
            });
        } else {
            entities.extend(members.into_iter().map(|i| ReleaseEntity {
                kind: EntityKind::File,
                name: files[i].relative_path.clone(),
                size: files[i].size,
                member_indices: vec![i],
                identity_hash: None,
                exists: false,
                storage_link: None,
            }));
        }
    }
    entities
}

/// Look up one entity in the registry, filling `exists` and `storage_link`
async fn lookup(store: &dyn RegistryStore, mut entity: ReleaseEntity) -> Result<ReleaseEntity> {
    let record = match (&entity.kind, &entity.identity_hash) {
        (EntityKind::Folder, Some(hash)) => store.find_by_hash(hash).await?,
        _ => store.find_by_name_size(&entity.name, entity.size).await?,
    };

    if let Some(record) = record {
        let locations = store.storage_locations(record.id).await?;
        entity.exists = true;
        entity.storage_link = locations.into_iter().next().map(|l| l.remote_link);
    }
    Ok(entity)
}

/// Resolve a manifest into entities annotated with registry state
///
/// Entities come back in directory-encounter order.
pub async fn resolve(
    files: &[ReleaseFile],
    threshold: usize,
    store: &dyn RegistryStore,
) -> Result<Vec<ReleaseEntity>> {
    let planned = plan_entities(files, threshold);
    tracing::debug!(
        files = files.len(),
        entities = planned.len(),
        threshold,
        "resolving release entities"
    );

    let lookups = planned.into_iter().map(|entity| lookup(store, entity));
    let entities = futures::future::try_join_all(lookups)
        .await
        .map_err(|e| match e {
            Error::StoreUnavailable(_) => e,
            other => Error::StoreUnavailable(other.to_string()),
        })?;

    let existing = entities.iter().filter(|e| e.exists).count();
    tracing::info!(
        entities = entities.len(),
        existing,
        "resolved release entities"
    );

    Ok(entities)
}

/// Sorted manifest indices of every member of every entity not yet stored
pub fn fetch_indices(entities: &[ReleaseEntity]) -> Vec<usize> {
    let mut indices: Vec<usize> = entities
        .iter()
        .filter(|e| !e.exists)
        .flat_map(|e| e.member_indices.iter().copied())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewFileRecord, NewStorageLocation};
    use tempfile::NamedTempFile;

    fn dlc_folder(count: usize) -> Vec<ReleaseFile> {
        (0..count)
            .map(|i| ReleaseFile::new(format!("Game/DLC/dlc{i}.nsp"), 100 + i as u64))
            .collect()
    }

    async fn store() -> (Database, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db = Database::new(temp_file.path()).await.unwrap();
        (db, temp_file)
    }

    #[test]
    fn hash_is_order_independent() {
        let files = dlc_folder(5);
        let mut reversed = files.clone();
        reversed.reverse();

        assert_eq!(
            folder_identity_hash(&files),
            folder_identity_hash(&reversed)
        );
        assert_eq!(folder_identity_hash(&files).len(), 64);
    }

    #[test]
    fn hash_changes_with_any_member_size() {
        let files = dlc_folder(5);
        let mut changed = files.clone();
        changed[2].size += 1;
        assert_ne!(folder_identity_hash(&files), folder_identity_hash(&changed));
    }

    #[test]
    fn hash_matches_concatenated_digest() {
        let files = vec![ReleaseFile::new("d/b", 2), ReleaseFile::new("d/a", 1)];
        let expected = format!("{:x}", Sha256::digest(b"d/a|1|d/b|2|"));
        assert_eq!(folder_identity_hash(&files), expected);
    }

    #[test]
    fn threshold_is_exclusive() {
        let at = plan_entities(&dlc_folder(4), 4);
        assert_eq!(at.len(), 4);
        assert!(at.iter().all(|e| e.kind == EntityKind::File));

        let over = plan_entities(&dlc_folder(5), 4);
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].kind, EntityKind::Folder);
        assert_eq!(over[0].name, "Game/DLC");
        assert_eq!(over[0].size, (100..105).sum::<u64>());
    }

    #[test]
    fn folder_members_sorted_by_path() {
        let mut files = dlc_folder(5);
        files.swap(0, 4);
        let entities = plan_entities(&files, 4);
        let members: Vec<&str> = entities[0]
            .member_indices
            .iter()
            .map(|&i| files[i].relative_path.as_str())
            .collect();
        let mut sorted = members.clone();
        sorted.sort();
        assert_eq!(members, sorted);
    }

    #[test]
    fn directory_encounter_order_is_preserved() {
        let files = vec![
            ReleaseFile::new("B/one.nsp", 1),
            ReleaseFile::new("A/two.nsp", 2),
            ReleaseFile::new("B/three.nsp", 3),
            ReleaseFile::new("root.nsp", 4),
        ];
        let names: Vec<String> = plan_entities(&files, 4)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["B/one.nsp", "B/three.nsp", "A/two.nsp", "root.nsp"]);
    }

    #[test]
    fn interleaved_directories_bucket_in_first_seen_order() {
        // 500 directories, files dealt round-robin so every bucket is revisited
        let files: Vec<ReleaseFile> = (0..3000)
            .map(|i| ReleaseFile::new(format!("pack{:03}/file{i}.bin", i % 500), 1))
            .collect();

        let entities = plan_entities(&files, 4);
        assert_eq!(entities.len(), 500);
        assert!(entities.iter().all(|e| e.kind == EntityKind::Folder));
        for (position, entity) in entities.iter().enumerate() {
            assert_eq!(entity.name, format!("pack{:03}", position));
            assert_eq!(entity.member_indices.len(), 6);
            assert!(entity.member_indices.iter().all(|&i| i % 500 == position));
        }
    }

    #[test]
    fn root_files_follow_threshold() {
        let files: Vec<ReleaseFile> = (0..6)
            .map(|i| ReleaseFile::new(format!("file{i}.bin"), 10))
            .collect();
        let entities = plan_entities(&files, 4);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, ROOT_FOLDER_NAME);
        assert_eq!(entities[0].kind, EntityKind::Folder);
    }

    #[test]
    fn fetch_indices_skip_existing_entities() {
        let files = vec![
            ReleaseFile::new("a.nsp", 1),
            ReleaseFile::new("b.nsp", 2),
            ReleaseFile::new("c.nsp", 3),
        ];
        let mut entities = plan_entities(&files, 4);
        entities[1].exists = true;
        assert_eq!(fetch_indices(&entities), vec![0, 2]);
    }

    #[tokio::test]
    async fn resolve_marks_existing_entities() {
        let (db, _tmp) = store().await;
        let mut files = dlc_folder(6);
        files.push(ReleaseFile::new("Game/base.nsp", 999));

        let hash = folder_identity_hash(&files[..6]);
        db.commit_entity(
            &NewFileRecord {
                original_name: "Game/DLC".into(),
                size: 0,
                content_hash: Some(hash),
                category: "Folder".into(),
            },
            &[NewStorageLocation {
                remote_link: "link-1".into(),
                archive_name: "abc".into(),
                is_parted: false,
                part_number: 1,
                total_parts: 1,
            }],
        )
        .await
        .unwrap();

        let entities = resolve(&files, 4, &db).await.unwrap();
        assert_eq!(entities.len(), 2);
        assert!(entities[0].exists);
        assert_eq!(entities[0].storage_link.as_deref(), Some("link-1"));
        assert!(!entities[1].exists);
        assert_eq!(fetch_indices(&entities), vec![6]);

        db.close().await;
    }

    #[tokio::test]
    async fn resolve_is_idempotent() {
        let (db, _tmp) = store().await;
        let files = dlc_folder(7);

        let first = resolve(&files, 4, &db).await.unwrap();
        let second = resolve(&files, 4, &db).await.unwrap();
        assert_eq!(first, second);

        db.close().await;
    }

    #[tokio::test]
    async fn store_failure_is_store_unavailable() {
        let (db, _tmp) = store().await;
        db.pool().close().await;

        let err = resolve(&dlc_folder(2), 4, &db).await.unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)), "got {err:?}");
    }
}
