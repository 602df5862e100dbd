//! Core types for release-archivist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an in-memory pipeline task (short, random, unique per process)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Length of generated task ids
    pub const LEN: usize = 8;

    /// Generate a fresh random id (8 lowercase hex characters)
    pub fn generate() -> Self {
        Self(format!("{:08x}", rand::random::<u32>()))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a pipeline task
///
/// Transitions are strictly forward:
/// `Pending → Downloading → Packing → Uploading → {Completed | Failed}`.
/// `Failed` is reachable from any non-terminal state and terminal states
/// have no exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, resolving which entities need work
    Pending,
    /// Fetching missing files
    Downloading,
    /// Building encrypted archive parts
    Packing,
    /// Uploading parts and committing registry rows
    Uploading,
    /// Every entity committed (or already present)
    Completed,
    /// Processing halted with an error
    Failed,
}

impl TaskStatus {
    /// Whether this status is terminal (Completed or Failed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Position in the forward ordering of the lifecycle
    fn rank(&self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Downloading => 1,
            TaskStatus::Packing => 2,
            TaskStatus::Uploading => 3,
            TaskStatus::Completed | TaskStatus::Failed => 4,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition
    ///
    /// Phases may be skipped (a release with nothing to fetch goes straight to
    /// `Packing`), but never revisited.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Failed => true,
            _ => next.rank() > self.rank(),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Packing => "packing",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of one release's processing lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Display name (usually the release name)
    pub name: String,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Phase-local progress percentage (0.0 to 100.0)
    pub progress: f32,
    /// Current transfer speed in bytes per second
    pub speed_bps: u64,
    /// Estimated seconds remaining in the current phase (0 when unknown)
    pub eta_secs: u64,
    /// Total bytes this task has to move
    pub total_size: u64,
    /// Connected peers reported by the fetcher
    pub peers: u32,
    /// Error message once the task has failed
    pub error: Option<String>,
    /// When the task was created
    pub start_time: DateTime<Utc>,
    /// Last time any field changed
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            status: TaskStatus::Pending,
            progress: 0.0,
            speed_bps: 0,
            eta_secs: 0,
            total_size: 0,
            peers: 0,
            error: None,
            start_time: now,
            updated_at: now,
        }
    }
}

/// Partial update merged into a [`Task`] by the registry
///
/// Every `None` field leaves the current value untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskUpdate {
    /// New status (must be a forward transition)
    pub status: Option<TaskStatus>,
    /// Phase-local progress (0.0 to 100.0)
    pub progress: Option<f32>,
    /// Transfer speed in bytes per second
    pub speed_bps: Option<u64>,
    /// Seconds remaining
    pub eta_secs: Option<u64>,
    /// Total bytes to move
    pub total_size: Option<u64>,
    /// Connected peers
    pub peers: Option<u32>,
    /// Error message
    pub error: Option<String>,
}

impl TaskUpdate {
    /// Update that moves the task into `status`
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Update that only reports progress
    pub fn progress(progress: f32) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }

    /// Update that marks the task failed with `error`
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Set the progress field
    pub fn with_progress(mut self, progress: f32) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Set speed and eta fields
    pub fn with_rate(mut self, speed_bps: u64, eta_secs: u64) -> Self {
        self.speed_bps = Some(speed_bps);
        self.eta_secs = Some(eta_secs);
        self
    }

    /// Set the total size field
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }

    /// Set the peers field
    pub fn with_peers(mut self, peers: u32) -> Self {
        self.peers = Some(peers);
        self
    }
}

/// Semantic category of a release file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Base game
    Base,
    /// Update/patch
    Update,
    /// Downloadable content
    #[serde(rename = "DLC")]
    Dlc,
    /// Could not be classified
    Unknown,
}

impl Category {
    /// Label persisted in the registry and used in upload captions
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Base => "Base",
            Category::Update => "Update",
            Category::Dlc => "DLC",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry label for aggregated folder entities (they bypass categorization)
pub const FOLDER_CATEGORY: &str = "Folder";

/// One entry of a release manifest
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    /// Path relative to the release root, `/`-separated
    pub relative_path: String,
    /// Size in bytes
    pub size: u64,
}

impl ReleaseFile {
    /// Create a manifest entry
    pub fn new(relative_path: impl Into<String>, size: u64) -> Self {
        Self {
            relative_path: relative_path.into(),
            size,
        }
    }
}

/// Full file manifest of one logical download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Opaque handle understood by the fetcher (e.g. an info-hash or topic id)
    pub handle: String,
    /// Display name
    pub name: String,
    /// Manifest entries; an entry's position is its fetch index
    pub files: Vec<ReleaseFile>,
}

/// Whether an entity is a single file or an aggregated directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Single manifest file, identified by (name, size)
    File,
    /// Directory with more than `threshold` members, identified by content hash
    Folder,
}

/// Unit of packing and uploading produced by the dedup resolver
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntity {
    /// File or Folder
    pub kind: EntityKind,
    /// Relative path of the file, or of the directory for folders
    pub name: String,
    /// Size in bytes (sum of members for folders)
    pub size: u64,
    /// Manifest indices of the members (sorted by relative path for folders)
    pub member_indices: Vec<usize>,
    /// Hex digest identifying a folder's members (Folder only)
    pub identity_hash: Option<String>,
    /// Whether the registry already holds this entity
    pub exists: bool,
    /// Link of the first stored part when `exists` is true
    pub storage_link: Option<String>,
}

impl ReleaseEntity {
    /// Last path component of the entity name
    pub fn base_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Event emitted during the pipeline lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A release was accepted and a task created
    TaskCreated {
        /// Task ID
        id: TaskId,
        /// Release name
        name: String,
    },

    /// Task status or progress changed
    TaskUpdated {
        /// Task ID
        id: TaskId,
        /// Current status
        status: TaskStatus,
        /// Phase-local progress percentage
        progress: f32,
        /// Speed in bytes per second
        speed_bps: u64,
        /// Seconds remaining
        eta_secs: u64,
    },

    /// An entity's registry rows were committed
    EntityCommitted {
        /// Task ID
        id: TaskId,
        /// Entity name
        entity: String,
        /// Category label stored in the registry
        category: String,
        /// Link of the first uploaded part
        link: String,
        /// Number of parts uploaded
        parts: u32,
    },

    /// All entities of the release are stored
    TaskCompleted {
        /// Task ID
        id: TaskId,
        /// Links of every entity in the release (existing and new)
        links: Vec<EntityLink>,
    },

    /// Processing halted
    TaskFailed {
        /// Task ID
        id: TaskId,
        /// Error message
        error: String,
        /// Machine-readable error code
        code: String,
    },
}

/// Storage link of one entity, reported on completion
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    /// Entity name
    pub name: String,
    /// Link of the first stored part
    pub link: String,
    /// Whether the entity was stored before this run
    pub existed: bool,
}
