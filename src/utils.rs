//! Storage helpers: free space, usage accounting and storage root selection

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Name of the data directory created under the chosen mount
pub const DATA_SUBDIR: &str = "release_archivist_data";

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Unix: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Arguments
///
/// * `path` - The path to check (typically the storage root)
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        // Convert path to C string for statvfs call
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: This is safe because:
        // 1. c_path is a valid, null-terminated C string created from the input path
        // 2. stat is properly initialized with zeroed memory before the call
        // 3. We check the return value and propagate any OS errors
        // 4. The statvfs struct is only read after a successful call
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // Available space = available blocks * block size
            // f_bavail is available blocks for unprivileged users
            // f_frsize is the fragment size (preferred over f_bsize)
            let available_bytes = stat.f_bavail.saturating_mul(stat.f_frsize);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        // Convert path to wide string for Windows API
        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0)) // null terminator
            .collect();

        // SAFETY: This is safe because:
        // 1. wide_path is a valid, null-terminated wide string
        // 2. All output pointers point to valid, properly aligned u64 variables
        // 3. We check the return value and propagate any OS errors
        // 4. The output variables are only read after a successful call
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        // Unsupported platform - return an error
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}

/// Total size in bytes of every regular file under `path`
///
/// A missing path counts as empty. Symlinks are not followed.
pub fn directory_size(path: &Path) -> std::io::Result<u64> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    if metadata.is_file() {
        return Ok(metadata.len());
    }
    if !metadata.is_dir() {
        return Ok(0);
    }

    let mut total = 0u64;
    for entry in std::fs::read_dir(path)? {
        total = total.saturating_add(directory_size(&entry?.path())?);
    }
    Ok(total)
}

/// Fail with [`Error::InsufficientSpace`] when usage under `path` is at or over `limit_bytes`
pub async fn check_storage_limit(path: &Path, limit_bytes: u64) -> Result<()> {
    let path = path.to_path_buf();
    let used = tokio::task::spawn_blocking(move || directory_size(&path))
        .await
        .map_err(|e| Error::Other(format!("storage usage task panicked: {}", e)))??;

    if used >= limit_bytes {
        tracing::warn!(used, limit = limit_bytes, "storage limit reached");
        return Err(Error::InsufficientSpace {
            used,
            limit: limit_bytes,
        });
    }
    Ok(())
}

/// Default mount points checked by [`best_storage_path`] on this platform
pub fn default_mount_candidates() -> Vec<PathBuf> {
    #[cfg(windows)]
    {
        (b'A'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .collect()
    }

    #[cfg(not(windows))]
    {
        let mut mounts: Vec<PathBuf> = ["/mnt", "/media", "/var/lib"]
            .iter()
            .map(PathBuf::from)
            .collect();
        if let Some(home) = std::env::var_os("HOME") {
            mounts.push(PathBuf::from(home));
        }
        mounts.push(PathBuf::from("."));
        mounts
    }
}

/// Pick the candidate with the most free space and create `subdir` under it
///
/// Candidates that do not exist, are read-only or cannot be queried are
/// skipped. Falls back to `./data` when nothing qualifies or the directory
/// cannot be created.
pub fn best_storage_path(candidates: &[PathBuf], subdir: &str) -> PathBuf {
    let best = candidates
        .iter()
        .filter(|mount| mount.is_dir())
        .filter(|mount| {
            std::fs::metadata(mount)
                .map(|m| !m.permissions().readonly())
                .unwrap_or(false)
        })
        .filter_map(|mount| {
            get_available_space(mount)
                .ok()
                .map(|free| (free, mount.join(subdir)))
        })
        .max_by_key(|(free, _)| *free)
        .map(|(_, path)| path);

    if let Some(path) = best {
        match std::fs::create_dir_all(&path) {
            Ok(()) => return path,
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "cannot use storage path, falling back")
            }
        }
    }

    let fallback = std::env::current_dir()
        .map(|cwd| cwd.join("data"))
        .unwrap_or_else(|_| PathBuf::from("data"));
    if let Err(e) = std::fs::create_dir_all(&fallback) {
        tracing::warn!(path = ?fallback, error = %e, "failed to create fallback storage path");
    }
    fallback
}

/// Remove a file or directory tree, ignoring paths that are already gone
pub async fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_get_available_space_of_temp_dir() {
        let dir = TempDir::new().unwrap();
        let free = get_available_space(dir.path()).unwrap();
        assert!(free > 0);
    }

    #[test]
    fn test_get_available_space_missing_path_errors() {
        assert!(get_available_space(Path::new("/definitely/not/here/12345")).is_err());
    }

    #[test]
    fn test_directory_size_sums_nested_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("one.bin"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("a/two.bin"), vec![0u8; 50]).unwrap();
        fs::write(dir.path().join("a/b/three.bin"), vec![0u8; 25]).unwrap();

        assert_eq!(directory_size(dir.path()).unwrap(), 175);
        assert_eq!(directory_size(&dir.path().join("one.bin")).unwrap(), 100);
        assert_eq!(directory_size(&dir.path().join("missing")).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_check_storage_limit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("f.bin"), vec![0u8; 1000]).unwrap();

        assert!(check_storage_limit(dir.path(), 1001).await.is_ok());

        let err = check_storage_limit(dir.path(), 1000).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientSpace {
                used: 1000,
                limit: 1000
            }
        ));
    }

    #[test]
    fn test_best_storage_path_creates_subdir_under_candidate() {
        let dir = TempDir::new().unwrap();
        let path = best_storage_path(&[dir.path().to_path_buf()], "store");
        assert_eq!(path, dir.path().join("store"));
        assert!(path.is_dir());
    }

    #[test]
    fn test_best_storage_path_skips_missing_candidates() {
        let dir = TempDir::new().unwrap();
        let path = best_storage_path(
            &[PathBuf::from("/no/such/mount"), dir.path().to_path_buf()],
            "store",
        );
        assert_eq!(path, dir.path().join("store"));
    }

    #[tokio::test]
    async fn test_remove_path_handles_files_dirs_and_missing() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        let sub = dir.path().join("d");
        fs::write(&file, b"x").unwrap();
        fs::create_dir_all(sub.join("inner")).unwrap();

        remove_path(&file).await.unwrap();
        remove_path(&sub).await.unwrap();
        remove_path(&dir.path().join("never")).await.unwrap();

        assert!(!file.exists());
        assert!(!sub.exists());
    }
}
