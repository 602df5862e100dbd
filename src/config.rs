//! Configuration types for release-archivist

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Split size for premium storage accounts (3.9 GiB)
pub const PREMIUM_SPLIT_SIZE: u64 = 4_187_593_113;

/// Split size for regular storage accounts (1.9 GiB)
pub const STANDARD_SPLIT_SIZE: u64 = 2_040_109_465;

/// Default number of sibling files a directory may hold before it is aggregated
pub const DEFAULT_FOLDER_THRESHOLD: usize = 4;

/// Archive encryption and split settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Password used to encrypt every archive (process-wide secret)
    #[serde(default)]
    pub encryption_password: String,

    /// Whether the storage account has the premium upload ceiling (default: false)
    #[serde(default)]
    pub premium: bool,

    /// Explicit split size in bytes, overriding the premium/standard selection
    #[serde(default)]
    pub split_size_override: Option<u64>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            encryption_password: String::new(),
            premium: false,
            split_size_override: None,
        }
    }
}

impl std::fmt::Debug for ArchiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveConfig")
            .field("encryption_password", &"<redacted>")
            .field("premium", &self.premium)
            .field("split_size_override", &self.split_size_override)
            .finish()
    }
}

/// Storage directories and limits
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for fetched files and archive work space (default: "./data")
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Refuse to fetch when usage under `storage_root` reaches this many GiB (None = unlimited)
    #[serde(default)]
    pub max_storage_gb: Option<u64>,

    /// Remove fetched source files once their entity is committed (default: false)
    #[serde(default)]
    pub delete_sources_after_upload: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            max_storage_gb: None,
            delete_sources_after_upload: false,
        }
    }
}

/// Dedup and task-tracking behaviour
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Directories with more than this many files become one Folder entity (default: 4)
    #[serde(default = "default_folder_threshold")]
    pub folder_threshold: usize,

    /// How long finished tasks stay visible before pruning (default: 1 hour)
    #[serde(default = "default_task_ttl", with = "duration_serde")]
    pub task_ttl: Duration,

    /// Interval between prune passes (default: 5 minutes)
    #[serde(default = "default_prune_interval", with = "duration_serde")]
    pub prune_interval: Duration,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            folder_threshold: default_folder_threshold(),
            task_ttl: default_task_ttl(),
            prune_interval: default_prune_interval(),
        }
    }
}

/// Remote artifact upload settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Endpoint accepting multipart part uploads (None = no HTTP uploader)
    #[serde(default)]
    pub upload_url: Option<String>,

    /// Bearer token identifying the uploader
    #[serde(default)]
    pub upload_token: Option<String>,

    /// Per-part upload timeout (default: 30 minutes)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    pub upload_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_url: None,
            upload_token: None,
            upload_timeout: default_upload_timeout(),
        }
    }
}

impl std::fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadConfig")
            .field("upload_url", &self.upload_url)
            .field("upload_token", &self.upload_token.as_ref().map(|_| "<redacted>"))
            .field("upload_timeout", &self.upload_timeout)
            .finish()
    }
}

/// Registry persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./archivist.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration
///
/// Fields are organized into logical sub-configs:
/// - [`archive`](ArchiveConfig) - encryption secret and split ceiling
/// - [`storage`](StorageConfig) - storage root and limits
/// - [`processing`](ProcessingConfig) - folder threshold, task retention
/// - [`upload`](UploadConfig) - remote upload endpoint and credentials
/// - [`persistence`](PersistenceConfig) - registry database
///
/// Sub-configs except `persistence` are flattened, so the JSON/TOML format
/// stays a single level.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Archive encryption and split settings
    #[serde(flatten)]
    pub archive: ArchiveConfig,

    /// Storage directories and limits
    #[serde(flatten)]
    pub storage: StorageConfig,

    /// Dedup and task-tracking behaviour
    #[serde(flatten)]
    pub processing: ProcessingConfig,

    /// Remote upload endpoint and credentials
    #[serde(flatten)]
    pub upload: UploadConfig,

    /// Registry persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Load configuration from the environment, reading a `.env` file first if present
    ///
    /// Recognised variables:
    /// - `ENCRYPTION_PASSWORD` (required)
    /// - `IS_PREMIUM` (`true`/`false`, `1`/`0`)
    /// - `SPLIT_SIZE_BYTES`
    /// - `STORAGE_ROOT` (otherwise the writable mount with the most free space)
    /// - `MAX_STORAGE_GB`
    /// - `DELETE_SOURCES_AFTER_UPLOAD`
    /// - `FOLDER_THRESHOLD`
    /// - `DATABASE_PATH`
    /// - `UPLOAD_URL`, `UPLOAD_TOKEN`
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv()
            && !e.not_found()
        {
            tracing::warn!(error = %e, "failed to read .env file");
        }

        let mut config = Config::default();

        config.archive.encryption_password = std::env::var("ENCRYPTION_PASSWORD").map_err(|_| {
            Error::Config {
                message: "ENCRYPTION_PASSWORD is not set".to_string(),
                key: Some("encryption_password".to_string()),
            }
        })?;

        if let Some(value) = env_var("IS_PREMIUM") {
            config.archive.premium = parse_bool("IS_PREMIUM", &value)?;
        }
        if let Some(value) = env_var("SPLIT_SIZE_BYTES") {
            config.archive.split_size_override = Some(parse_num("SPLIT_SIZE_BYTES", &value)?);
        }
        config.storage.storage_root = match env_var("STORAGE_ROOT") {
            Some(value) => PathBuf::from(value),
            None => crate::utils::best_storage_path(
                &crate::utils::default_mount_candidates(),
                crate::utils::DATA_SUBDIR,
            ),
        };
        if let Some(value) = env_var("MAX_STORAGE_GB") {
            config.storage.max_storage_gb = Some(parse_num("MAX_STORAGE_GB", &value)?);
        }
        if let Some(value) = env_var("DELETE_SOURCES_AFTER_UPLOAD") {
            config.storage.delete_sources_after_upload =
                parse_bool("DELETE_SOURCES_AFTER_UPLOAD", &value)?;
        }
        if let Some(value) = env_var("FOLDER_THRESHOLD") {
            config.processing.folder_threshold = parse_num("FOLDER_THRESHOLD", &value)? as usize;
        }
        if let Some(value) = env_var("DATABASE_PATH") {
            config.persistence.database_path = PathBuf::from(value);
        }
        config.upload.upload_url = env_var("UPLOAD_URL");
        config.upload.upload_token = env_var("UPLOAD_TOKEN");

        config.validate()?;
        Ok(config)
    }

    /// Check settings that would otherwise fail deep inside the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.archive.encryption_password.is_empty() {
            return Err(Error::Config {
                message: "encryption password must not be empty".to_string(),
                key: Some("encryption_password".to_string()),
            });
        }
        if self.archive.split_size_override == Some(0) {
            return Err(Error::Config {
                message: "split size must be greater than zero".to_string(),
                key: Some("split_size_override".to_string()),
            });
        }
        if self.processing.folder_threshold == 0 {
            return Err(Error::Config {
                message: "folder threshold must be at least 1".to_string(),
                key: Some("folder_threshold".to_string()),
            });
        }
        Ok(())
    }

    /// Maximum size of one archive part, selected from the account tier
    pub fn split_size(&self) -> u64 {
        match self.archive.split_size_override {
            Some(size) => size,
            None if self.archive.premium => PREMIUM_SPLIT_SIZE,
            None => STANDARD_SPLIT_SIZE,
        }
    }

    /// Directory where fetched release files are materialized
    pub fn download_dir(&self) -> PathBuf {
        self.storage.storage_root.join("downloads")
    }

    /// Directory where archives are built before upload
    pub fn work_dir(&self) -> PathBuf {
        self.storage.storage_root.join("work")
    }

    /// Storage usage limit in bytes, if configured
    pub fn storage_limit_bytes(&self) -> Option<u64> {
        self.storage
            .max_storage_gb
            .map(|gb| gb.saturating_mul(1024 * 1024 * 1024))
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config {
            message: format!("{} must be a boolean, got '{}'", key, other),
            key: Some(key.to_ascii_lowercase()),
        }),
    }
}

fn parse_num(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|e| Error::Config {
        message: format!("{} must be a non-negative integer: {}", key, e),
        key: Some(key.to_ascii_lowercase()),
    })
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./archivist.db")
}

fn default_folder_threshold() -> usize {
    DEFAULT_FOLDER_THRESHOLD
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_task_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_prune_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
