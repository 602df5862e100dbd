//! Release fixtures and staged file content

use release_archivist::{Release, ReleaseFile};
use std::path::Path;

/// Deterministic filler bytes for a staged file
pub fn file_content(size: u64, seed: u8) -> Vec<u8> {
    (0..size)
        .map(|i| (i as u8).wrapping_mul(17).wrapping_add(seed))
        .collect()
}

/// One DLC directory of six files plus a loose base game file
pub fn game_release(handle: &str) -> Release {
    let mut files: Vec<ReleaseFile> = (0..6u64)
        .map(|i| {
            ReleaseFile::new(
                format!("Game/DLC/Pack {i} [0100ABCD1234100{}].nsp", i + 1),
                1000 + i * 10,
            )
        })
        .collect();
    files.push(ReleaseFile::new("Game/Game [0100ABCD12340000].nsp", 5000));

    Release {
        handle: handle.to_string(),
        name: "Game Complete Edition".to_string(),
        files,
    }
}

/// Write every file of `release` where the bundled fetcher expects it
///
/// Files land under `{storage_root}/downloads/{handle}/{relative_path}`.
pub fn stage_release(storage_root: &Path, release: &Release) -> std::io::Result<()> {
    for (i, file) in release.files.iter().enumerate() {
        let path = storage_root
            .join("downloads")
            .join(&release.handle)
            .join(&file.relative_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, file_content(file.size, i as u8))?;
    }
    Ok(())
}
