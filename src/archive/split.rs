//! Byte-exact splitting of an archive into numbered parts.

use super::ProgressFn;
use crate::error::ArchiveError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Path of part `number` (1-based) of `total` for `archive_path`
///
/// Part suffixes are zero-padded to three digits, or wider when `total`
/// needs more.
pub fn part_path(archive_path: &Path, number: u64, total: u64) -> PathBuf {
    let width = total.to_string().len().max(3);
    let mut name = archive_path.as_os_str().to_os_string();
    name.push(format!(".{:0width$}", number, width = width));
    PathBuf::from(name)
}

/// Split `archive_path` into `split_size` chunks and delete it afterwards
///
/// Progress covers 50–100, advanced after each part. On failure the partial
/// parts are removed and the archive itself is left untouched.
pub(super) fn split_archive(
    archive_path: &Path,
    split_size: u64,
    progress: Option<&ProgressFn>,
) -> Result<Vec<PathBuf>, ArchiveError> {
    let fail = |reason: String| ArchiveError::SplitIncomplete {
        archive: archive_path.to_path_buf(),
        reason,
    };

    let archive_size = std::fs::metadata(archive_path)
        .map_err(|e| fail(format!("failed to stat archive: {}", e)))?
        .len();
    let total = archive_size.div_ceil(split_size).max(1);

    let mut parts = Vec::with_capacity(total as usize);
    let result = write_parts(archive_path, split_size, total, progress, &mut parts);

    if let Err(e) = result {
        for part in &parts {
            let _ = std::fs::remove_file(part);
        }
        return Err(fail(e.to_string()));
    }

    std::fs::remove_file(archive_path)
        .map_err(|e| fail(format!("failed to remove unsplit archive: {}", e)))?;

    Ok(parts)
}

fn write_parts(
    archive_path: &Path,
    split_size: u64,
    total: u64,
    progress: Option<&ProgressFn>,
    parts: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(File::open(archive_path)?);

    for number in 1..=total {
        let path = part_path(archive_path, number, total);
        parts.push(path.clone());

        let mut writer = BufWriter::new(File::create(&path)?);
        let copied = std::io::copy(&mut (&mut reader).take(split_size), &mut writer)?;
        writer.flush()?;

        if copied == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("archive ended before part {}", number),
            ));
        }

        tracing::debug!(part = number, total, bytes = copied, "wrote archive part");
        if let Some(report) = progress {
            report(50.0 + number as f32 / total as f32 * 50.0);
        }
    }
    Ok(())
}
