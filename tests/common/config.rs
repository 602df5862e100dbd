//! Test configuration helpers for building pipelines over temporary storage

use release_archivist::{Config, Pipeline};
use std::path::Path;
use tempfile::TempDir;

/// Password used by every test pipeline
pub const TEST_PASSWORD: &str = "integration-secret";

/// Config rooted in `root` with its registry inside the same directory
///
/// Uploads are mirrored into `{root}/uploads` unless an endpoint is set.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.archive.encryption_password = TEST_PASSWORD.to_string();
    config.storage.storage_root = root.to_path_buf();
    config.persistence.database_path = root.join("registry.db");
    config
}

/// Create a pipeline over a fresh temporary storage root
///
/// The returned `TempDir` must outlive the pipeline.
pub async fn create_test_pipeline() -> Result<(Pipeline, TempDir), Box<dyn std::error::Error>> {
    let temp_dir = TempDir::new()?;
    let pipeline = Pipeline::from_config(test_config(temp_dir.path())).await?;
    Ok((pipeline, temp_dir))
}
