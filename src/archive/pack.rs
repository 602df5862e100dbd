//! Blocking 7z writer.

use super::ProgressFn;
use crate::error::ArchiveError;
use sevenz_rust::{AesEncoderOptions, Password, SevenZArchiveEntry, SevenZMethod, SevenZWriter};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One archive entry: source path on disk and its name inside the archive
struct Entry {
    path: PathBuf,
    name: String,
    size: Option<u64>,
}

/// Expand sources into archive entries, recursing into directories
fn collect_entries(sources: &[PathBuf]) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for source in sources {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::other(format!("source has no file name: {}", source.display()))
            })?;
        push_entries(source, name, &mut entries)?;
    }
    Ok(entries)
}

fn push_entries(path: &Path, name: String, entries: &mut Vec<Entry>) -> std::io::Result<()> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        entries.push(Entry {
            path: path.to_path_buf(),
            name,
            size: Some(metadata.len()),
        });
        return Ok(());
    }

    entries.push(Entry {
        path: path.to_path_buf(),
        name: name.clone(),
        size: None,
    });

    let mut children: Vec<PathBuf> = std::fs::read_dir(path)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    children.sort();

    for child in children {
        let child_name = child
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        push_entries(&child, format!("{name}/{child_name}"), entries)?;
    }
    Ok(())
}

/// Write `sources` into an encrypted 7z at `archive_path`, returning its size
///
/// Progress covers 0–50, advanced after each file by cumulative input bytes.
pub(super) fn pack_encrypted(
    sources: &[PathBuf],
    archive_path: &Path,
    password: &str,
    progress: Option<&ProgressFn>,
) -> Result<u64, ArchiveError> {
    let fail = |reason: String| ArchiveError::PackFailed {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let entries =
        collect_entries(sources).map_err(|e| fail(format!("failed to read sources: {}", e)))?;
    let total_bytes: u64 = entries.iter().filter_map(|e| e.size).sum();

    let mut writer = SevenZWriter::create(archive_path)
        .map_err(|e| fail(format!("failed to create archive: {}", e)))?;
    writer.set_content_methods(vec![
        AesEncoderOptions::new(Password::from(password)).into(),
        SevenZMethod::LZMA2.into(),
    ]);

    let mut packed_bytes = 0u64;
    for entry in entries {
        let archive_entry = SevenZArchiveEntry::from_path(&entry.path, entry.name.clone());
        match entry.size {
            None => {
                writer
                    .push_archive_entry::<File>(archive_entry, None)
                    .map_err(|e| fail(format!("failed to add {}: {}", entry.name, e)))?;
            }
            Some(size) => {
                let file = File::open(&entry.path)
                    .map_err(|e| fail(format!("failed to open {}: {}", entry.path.display(), e)))?;
                writer
                    .push_archive_entry(archive_entry, Some(file))
                    .map_err(|e| fail(format!("failed to add {}: {}", entry.name, e)))?;

                packed_bytes += size;
                debug!(entry = %entry.name, size, "packed entry");
                if let Some(report) = progress
                    && total_bytes > 0
                {
                    report((packed_bytes as f64 / total_bytes as f64 * 50.0) as f32);
                }
            }
        }
    }

    writer
        .finish()
        .map_err(|e| fail(format!("failed to finalize archive: {}", e)))?;

    if let Some(report) = progress {
        report(50.0);
    }

    let size = std::fs::metadata(archive_path)
        .map_err(|e| fail(format!("failed to stat archive: {}", e)))?
        .len();
    Ok(size)
}
