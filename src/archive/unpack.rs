//! Reassembly and decryption of stored parts.

use crate::Result;
use crate::error::ArchiveError;
use sevenz_rust::Password;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Concatenate `parts` and extract the archive into `dest`
///
/// A single part is extracted in place. Returns the extracted files.
pub(super) fn unpack_parts(parts: &[PathBuf], dest: &Path, password: &str) -> Result<Vec<PathBuf>> {
    let first = parts.first().ok_or_else(|| ArchiveError::UnpackFailed {
        archive: dest.to_path_buf(),
        reason: "no parts given".to_string(),
    })?;

    std::fs::create_dir_all(dest)?;

    let (archive, reassembled) = if parts.len() == 1 {
        (first.clone(), false)
    } else {
        let stem = first
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.7z".to_string());
        let target = dest.join(format!(".{stem}.reassembled"));
        concatenate(parts, &target).map_err(|e| ArchiveError::UnpackFailed {
            archive: target.clone(),
            reason: format!("failed to reassemble parts: {}", e),
        })?;
        (target, true)
    };

    let result = File::open(&archive)
        .map_err(|e| e.to_string())
        .and_then(|reader| extract(reader, dest, password).map_err(|e| e.to_string()));

    if reassembled {
        let _ = std::fs::remove_file(&archive);
    }

    let mut files = result.map_err(|e| ArchiveError::UnpackFailed {
        archive: archive.clone(),
        reason: e,
    })?;
    files.sort();

    info!(archive = ?first, files = files.len(), "archive unpacked");
    Ok(files)
}

/// Decrypt an archive into `dest`, returning the paths of the extracted files
fn extract(
    reader: File,
    dest: &Path,
    password: &str,
) -> std::result::Result<Vec<PathBuf>, sevenz_rust::Error> {
    let mut extracted = Vec::new();
    sevenz_rust::decompress_with_extract_fn_and_password(
        reader,
        dest,
        Password::from(password),
        |entry, stream, path| {
            let written = sevenz_rust::default_entry_extract_fn(entry, stream, path)?;
            if !entry.is_directory() {
                extracted.push(path.clone());
            }
            Ok(written)
        },
    )?;
    Ok(extracted)
}

fn concatenate(parts: &[PathBuf], target: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(target)?);
    for part in parts {
        let mut reader = File::open(part)?;
        std::io::copy(&mut reader, &mut writer)?;
    }
    writer.flush()
}
