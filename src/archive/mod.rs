//! Encrypted archive packing and splitting
//!
//! Every stored entity becomes one LZMA2-compressed, AES-256 encrypted 7z
//! archive. Archives larger than the configured part size are cut into
//! numbered parts (`name.7z.001`, `name.7z.002`, …) whose ordered
//! concatenation is the original archive byte for byte.
//!
//! Progress is reported as a single 0–100 scale: packing covers 0–50 and
//! splitting 50–100.

mod pack;
mod split;
mod unpack;


pub use split::part_path;

use crate::error::ArchiveError;
use crate::{Error, Result};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Progress callback invoked with a percentage in `0.0..=100.0`
pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Length of generated archive names
pub const OBFUSCATED_NAME_LEN: usize = 40;

/// Random alphanumeric name drawn from the thread-local CSPRNG
pub fn generate_obfuscated_name(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Packs sources into encrypted archives and splits them into parts
#[derive(Clone)]
pub struct Archivist {
    password: String,
    split_size: u64,
}

impl fmt::Debug for Archivist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archivist")
            .field("password", &"<redacted>")
            .field("split_size", &self.split_size)
            .finish()
    }
}

impl Archivist {
    /// Create an archivist with the process secret and part size
    ///
    /// A zero `split_size` is treated as one byte.
    pub fn new(password: impl Into<String>, split_size: u64) -> Self {
        Self {
            password: password.into(),
            split_size: split_size.max(1),
        }
    }

    /// Build an archivist from the archive settings of `config`
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.archive.encryption_password.clone(),
            config.split_size(),
        )
    }

    /// Maximum part size in bytes
    pub fn split_size(&self) -> u64 {
        self.split_size
    }

    /// Pack `sources` into `{output_dir}/{archive_name}.7z` and split it
    ///
    /// Directories are stored recursively under their own name, plain files
    /// under their file name. When `archive_name` is `None` a random
    /// 40-character name is used. Returns the part paths in ascending order
    /// (just the archive itself when it fits in one part).
    pub async fn pack_and_split(
        &self,
        sources: &[PathBuf],
        output_dir: &Path,
        archive_name: Option<&str>,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<PathBuf>> {
        let archive_name = archive_name
            .map(str::to_string)
            .unwrap_or_else(|| generate_obfuscated_name(OBFUSCATED_NAME_LEN));
        let archive_path = output_dir.join(format!("{archive_name}.7z"));

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| ArchiveError::PackFailed {
                archive: archive_path.clone(),
                reason: format!("failed to create output directory: {}", e),
            })?;

        info!(
            archive = %archive_name,
            sources = sources.len(),
            "packing archive"
        );

        let pack_job = {
            let sources = sources.to_vec();
            let archive_path = archive_path.clone();
            let password = self.password.clone();
            let progress = progress.clone();
            tokio::task::spawn_blocking(move || {
                pack::pack_encrypted(&sources, &archive_path, &password, progress.as_ref())
            })
        };
        let archive_size = pack_job.await.map_err(|e| ArchiveError::PackFailed {
            archive: archive_path.clone(),
            reason: format!("packing task panicked: {}", e),
        })??;

        if archive_size <= self.split_size {
            if let Some(report) = &progress {
                report(100.0);
            }
            info!(archive = %archive_name, size = archive_size, "archive fits in one part");
            return Ok(vec![archive_path]);
        }

        let split_job = {
            let archive_path = archive_path.clone();
            let split_size = self.split_size;
            tokio::task::spawn_blocking(move || {
                split::split_archive(&archive_path, split_size, progress.as_ref())
            })
        };
        let parts = split_job.await.map_err(|e| ArchiveError::SplitIncomplete {
            archive: archive_path.clone(),
            reason: format!("splitting task panicked: {}", e),
        })??;

        info!(
            archive = %archive_name,
            size = archive_size,
            parts = parts.len(),
            "archive split into parts"
        );
        Ok(parts)
    }

    /// Reassemble `parts` (ascending order) and decrypt them into `dest`
    pub async fn unpack(&self, parts: &[PathBuf], dest: &Path) -> Result<Vec<PathBuf>> {
        let parts = parts.to_vec();
        let dest = dest.to_path_buf();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || unpack::unpack_parts(&parts, &dest, &password))
            .await
            .map_err(|e| Error::Other(format!("unpacking task panicked: {}", e)))?
    }
}
