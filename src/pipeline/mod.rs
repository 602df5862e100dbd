//! Release ingestion pipeline
//!
//! The [`Pipeline`] ties the collaborators together. Each submitted release
//! runs as its own tokio task through the phases
//! `Pending → Downloading → Packing → Uploading → Completed`:
//!
//! - [`orchestration`] - Per-release lifecycle and failure handling
//! - [`packing`] - Category selection and archive building per entity
//! - [`commit`] - Part upload, registry commit, cleanup
//!
//! Progress is tracked in the shared [`TaskRegistry`] and mirrored as
//! [`Event`]s on a broadcast channel.

mod commit;
mod orchestration;
mod packing;


use crate::archive::Archivist;
use crate::config::Config;
use crate::db::{Database, RegistryStore};
use crate::fetcher::{FileFetcher, LocalDirFetcher};
use crate::tasks::TaskRegistry;
use crate::types::{Event, Release, Task, TaskId, TaskUpdate};
use crate::uploader::{DirectoryUploader, HttpUploader, RemoteUploader};
use crate::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// How long [`Pipeline::shutdown`] waits for running releases
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Release ingestion pipeline (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Pipeline {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Task lifecycle store
    pub(crate) registry: TaskRegistry,
    /// File registry used for dedup lookups and commits
    pub(crate) store: Arc<dyn RegistryStore>,
    /// Backend that materializes release files
    pub(crate) fetcher: Arc<dyn FileFetcher>,
    /// Destination for archive parts
    pub(crate) uploader: Arc<dyn RemoteUploader>,
    /// Archive packer/splitter
    pub(crate) archivist: Archivist,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Whether new releases are accepted (cleared during shutdown)
    accepting_new: Arc<AtomicBool>,
    /// Stops background services
    cancel_token: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline from explicit collaborators
    ///
    /// Validates `config` and starts the task pruner; must be called from
    /// within a tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn RegistryStore>,
        fetcher: Arc<dyn FileFetcher>,
        uploader: Arc<dyn RemoteUploader>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = TaskRegistry::new();
        let cancel_token = CancellationToken::new();

        registry.spawn_pruner(
            config.processing.prune_interval,
            config.processing.task_ttl,
            cancel_token.clone(),
        );

        tracing::info!(
            split_size = config.split_size(),
            folder_threshold = config.processing.folder_threshold,
            storage_root = ?config.storage.storage_root,
            "pipeline started"
        );

        Ok(Self {
            archivist: Archivist::from_config(&config),
            config: Arc::new(config),
            registry,
            store,
            fetcher,
            uploader,
            event_tx,
            accepting_new: Arc::new(AtomicBool::new(true)),
            cancel_token,
        })
    }

    /// Create a pipeline with the bundled collaborators
    ///
    /// Opens the SQLite registry, fetches from `{storage_root}/downloads` and
    /// uploads over HTTP when an endpoint is configured, otherwise mirrors
    /// parts into `{storage_root}/uploads`.
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(config.download_dir())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download_dir().display(),
                        e
                    ),
                ))
            })?;

        let db = Database::new(&config.persistence.database_path).await?;
        let fetcher = LocalDirFetcher::new(config.download_dir());
        let uploader: Arc<dyn RemoteUploader> = match HttpUploader::from_config(&config) {
            Some(http) => Arc::new(http),
            None => Arc::new(DirectoryUploader::new(
                config.storage.storage_root.join("uploads"),
            )),
        };

        Self::new(config, Arc::new(db), Arc::new(fetcher), uploader)
    }

    /// Accept a release and process it in the background
    ///
    /// Returns the id of the task tracking it.
    pub async fn submit(&self, release: Release) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let id = self.registry.create(release.name.clone()).await;
        self.event_tx
            .send(Event::TaskCreated {
                id: id.clone(),
                name: release.name.clone(),
            })
            .ok();
        tracing::info!(task_id = %id, release = %release.name, files = release.files.len(), "release submitted");

        let pipeline = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.process(&task_id, &release).await {
                tracing::debug!(task_id = %task_id, error = %e, "release processing ended with error");
            }
        });

        Ok(id)
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Shared task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Snapshot of one task
    pub async fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.registry.get(id).await
    }

    /// Snapshot of every running task
    pub async fn active_tasks(&self) -> Vec<Task> {
        self.registry.list_active().await
    }

    /// Stop accepting releases, stop background services and wait for running releases
    ///
    /// Releases still running after the timeout keep going in the background;
    /// their committed entities survive a restart either way.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating pipeline shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.cancel_token.cancel();

        let wait = async {
            loop {
                let active = self.registry.list_active().await.len();
                if active == 0 {
                    return;
                }
                tracing::debug!(active, "Waiting for running releases");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };

        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            tracing::warn!("Timeout waiting for running releases, proceeding with shutdown");
        }
        tracing::info!("Pipeline shutdown complete");
    }

    /// Apply `update` to a task and broadcast the resulting snapshot
    pub(crate) async fn update_task(&self, id: &TaskId, update: TaskUpdate) -> Result<()> {
        self.registry.update(id, update).await?;
        if let Some(task) = self.registry.get(id).await {
            self.event_tx
                .send(Event::TaskUpdated {
                    id: id.clone(),
                    status: task.status,
                    progress: task.progress,
                    speed_bps: task.speed_bps,
                    eta_secs: task.eta_secs,
                })
                .ok();
        }
        Ok(())
    }
}
