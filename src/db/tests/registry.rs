use crate::db::*;
use tempfile::NamedTempFile;

fn folder_record(hash: &str) -> NewFileRecord {
    NewFileRecord {
        original_name: "Game/Updates".to_string(),
        size: 5000,
        content_hash: Some(hash.to_string()),
        category: "Folder".to_string(),
    }
}

fn parts(archive: &str, total: i32) -> Vec<NewStorageLocation> {
    (1..=total)
        .map(|n| NewStorageLocation {
            remote_link: format!("https://store.example/{archive}/{n}"),
            archive_name: archive.to_string(),
            is_parted: total > 1,
            part_number: n,
            total_parts: total,
        })
        .collect()
}

#[tokio::test]
async fn test_commit_and_find_by_hash() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let id = db
        .commit_entity(&folder_record("abc123"), &parts("xyz", 3))
        .await
        .unwrap()
        .id();

    let found = db.find_by_hash("abc123").await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(found.category, "Folder");
    assert_eq!(found.size, 5000);

    assert!(db.find_by_hash("other").await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_storage_locations_ordered_by_part() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Insert parts out of order to check the ORDER BY
    let mut rows = parts("arch", 3);
    rows.reverse();
    let id = db
        .commit_entity(&folder_record("h1"), &rows)
        .await
        .unwrap()
        .id();

    let locations = db.storage_locations(id).await.unwrap();
    assert_eq!(locations.len(), 3);
    assert_eq!(
        locations.iter().map(|l| l.part_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(locations.iter().all(|l| l.total_parts == 3 && l.is_parted));
    assert!(locations.iter().all(|l| l.archive_name == "arch"));
    assert_eq!(locations[0].remote_link, "https://store.example/arch/1");

    db.close().await;
}

#[tokio::test]
async fn test_find_by_name_size_requires_both() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let record = NewFileRecord {
        original_name: "Game/game.nsp".to_string(),
        size: 42,
        content_hash: None,
        category: "Base".to_string(),
    };
    db.commit_entity(&record, &parts("a", 1)).await.unwrap();

    assert!(db.find_by_name_size("Game/game.nsp", 42).await.unwrap().is_some());
    assert!(db.find_by_name_size("Game/game.nsp", 43).await.unwrap().is_none());
    assert!(db.find_by_name_size("game.nsp", 42).await.unwrap().is_none());

    db.close().await;
}

#[tokio::test]
async fn test_duplicate_hash_resolves_to_first_commit() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let first = db
        .commit_entity(&folder_record("dup"), &parts("first", 1))
        .await
        .unwrap();
    assert!(matches!(first, CommitOutcome::Inserted(_)));

    let second = db
        .commit_entity(&folder_record("dup"), &parts("second", 2))
        .await
        .unwrap();
    assert_eq!(second, CommitOutcome::AlreadyCommitted(first.id()));

    // The losing commit is rolled back entirely
    assert_eq!(db.count_records().await.unwrap(), 1);
    let orphans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM storage_locations WHERE archive_name = 'second'")
            .fetch_one(db.pool())
            .await
            .unwrap();
    assert_eq!(orphans, 0);

    let locations = db.storage_locations(first.id()).await.unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].archive_name, "first");

    db.close().await;
}

#[tokio::test]
async fn test_same_name_and_size_files_are_not_merged() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let record = NewFileRecord {
        original_name: "Game/game.nsp".to_string(),
        size: 42,
        content_hash: None,
        category: "Base".to_string(),
    };
    let first = db.commit_entity(&record, &parts("a", 1)).await.unwrap();
    let second = db.commit_entity(&record, &parts("b", 1)).await.unwrap();

    // Files carry no identity hash, so both commits insert
    assert!(matches!(second, CommitOutcome::Inserted(_)));
    assert_ne!(first.id(), second.id());
    let found = db.find_by_name_size("Game/game.nsp", 42).await.unwrap().unwrap();
    assert_eq!(found.id, first.id());

    db.close().await;
}

#[tokio::test]
async fn test_failed_part_insert_leaves_no_record() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    // Make storage inserts fail after the record insert has run inside the transaction
    sqlx::query(
        r#"
        CREATE TRIGGER reject_parts BEFORE INSERT ON storage_locations
        BEGIN SELECT RAISE(ABORT, 'rejected'); END
        "#,
    )
    .execute(db.pool())
    .await
    .unwrap();

    let result = db.commit_entity(&folder_record("atomic"), &parts("p", 2)).await;
    assert!(result.is_err());

    assert!(db.find_by_hash("atomic").await.unwrap().is_none());
    assert_eq!(db.count_records().await.unwrap(), 0);

    db.close().await;
}

#[tokio::test]
async fn test_store_trait_delegates_to_database() {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();

    let store: &dyn RegistryStore = &db;
    let record = NewFileRecord {
        original_name: "x.nsp".to_string(),
        size: 7,
        content_hash: None,
        category: "Unknown".to_string(),
    };
    let outcome = store.commit_entity(record, parts("t", 1)).await.unwrap();
    assert!(matches!(outcome, CommitOutcome::Inserted(_)));
    let id = outcome.id();

    let found = store.find_by_name_size("x.nsp", 7).await.unwrap().unwrap();
    assert_eq!(found.id, id);
    assert_eq!(store.storage_locations(id).await.unwrap().len(), 1);

    db.close().await;
}
