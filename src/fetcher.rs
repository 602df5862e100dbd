//! Release file fetching
//!
//! The pipeline only needs two things from a fetch backend: materialize a
//! subset of a release's files on local disk, and say where a given file
//! ends up. [`LocalDirFetcher`] covers the common deployment where an external
//! client (torrent daemon, sync tool, operator) stages files under a shared
//! directory and this process waits for them to appear.

use crate::types::Release;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Progress report sent while a fetch is running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    /// Bytes of the requested files present so far
    pub bytes_done: u64,
    /// Total bytes of the requested files
    pub bytes_total: u64,
    /// Current transfer rate in bytes per second
    pub rate_bps: u64,
    /// Connected peers (0 for backends without peers)
    pub peers: u32,
}

/// Backend that materializes release files on local disk
#[async_trait]
pub trait FileFetcher: Send + Sync {
    /// Fetch the files at `indices` of `release`, reporting on `progress`
    ///
    /// Returns once every requested file is complete on disk.
    async fn fetch(
        &self,
        release: &Release,
        indices: &[usize],
        progress: mpsc::UnboundedSender<FetchProgress>,
    ) -> Result<()>;

    /// Local path of manifest entry `index` (deterministic)
    fn path_for(&self, handle: &str, index: usize, relative_path: &str) -> PathBuf;
}

/// Fetcher for files staged under `{root}/{handle}/{relative_path}`
#[derive(Debug, Clone)]
pub struct LocalDirFetcher {
    root: PathBuf,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl LocalDirFetcher {
    /// Fetcher that expects files to already be in place
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            wait_timeout: Duration::ZERO,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Wait up to `timeout` for files to appear, re-checking every `poll_interval`
    pub fn with_wait(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.wait_timeout = timeout;
        self.poll_interval = poll_interval.max(Duration::from_millis(10));
        self
    }

    /// Root directory files are staged under
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Bytes present for each requested file, capped at its expected size
    async fn present_bytes(&self, release: &Release, indices: &[usize]) -> (u64, Vec<usize>) {
        let mut done = 0u64;
        let mut incomplete = Vec::new();
        for &index in indices {
            let file = &release.files[index];
            let path = self.path_for(&release.handle, index, &file.relative_path);
            let len = tokio::fs::metadata(&path)
                .await
                .map(|m| if m.is_file() { m.len() } else { 0 })
                .unwrap_or(0);
            done += len.min(file.size);
            if len != file.size {
                incomplete.push(index);
            }
        }
        (done, incomplete)
    }
}

/// Reject absolute paths and parent-directory components
fn validate_relative_path(relative_path: &str) -> Result<()> {
    let path = Path::new(relative_path);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || relative_path.is_empty() {
        return Err(Error::FetchFailed(format!(
            "unsafe relative path in manifest: {}",
            relative_path
        )));
    }
    Ok(())
}

#[async_trait]
impl FileFetcher for LocalDirFetcher {
    async fn fetch(
        &self,
        release: &Release,
        indices: &[usize],
        progress: mpsc::UnboundedSender<FetchProgress>,
    ) -> Result<()> {
        for &index in indices {
            let file = release.files.get(index).ok_or_else(|| {
                Error::FetchFailed(format!(
                    "index {} out of range for {} ({} files)",
                    index,
                    release.name,
                    release.files.len()
                ))
            })?;
            validate_relative_path(&file.relative_path)?;
        }

        let bytes_total: u64 = indices.iter().map(|&i| release.files[i].size).sum();
        let started = Instant::now();
        let mut last = (started, 0u64);

        loop {
            let (bytes_done, incomplete) = self.present_bytes(release, indices).await;

            let now = Instant::now();
            let elapsed = now.duration_since(last.0).as_secs_f64();
            let rate_bps = if elapsed > 0.0 {
                (bytes_done.saturating_sub(last.1) as f64 / elapsed) as u64
            } else {
                0
            };
            last = (now, bytes_done);

            progress
                .send(FetchProgress {
                    bytes_done,
                    bytes_total,
                    rate_bps,
                    peers: 0,
                })
                .ok();

            if incomplete.is_empty() {
                tracing::debug!(handle = %release.handle, files = indices.len(), "all files present");
                return Ok(());
            }

            if started.elapsed() >= self.wait_timeout {
                let missing: Vec<&str> = incomplete
                    .iter()
                    .take(5)
                    .map(|&i| release.files[i].relative_path.as_str())
                    .collect();
                return Err(Error::FetchFailed(format!(
                    "{} of {} files missing or incomplete for {} (e.g. {})",
                    incomplete.len(),
                    indices.len(),
                    release.name,
                    missing.join(", ")
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn path_for(&self, handle: &str, _index: usize, relative_path: &str) -> PathBuf {
        self.root.join(handle).join(relative_path)
    }
}
