//! # release-archivist
//!
//! Deduplicating ingestion pipeline for multi-file releases.
//!
//! Given a release manifest, the pipeline works out which files or folders
//! are already stored, fetches only the missing ones, packs each of them into
//! an encrypted, size-bounded 7z archive and uploads the parts. Every stored
//! entity is recorded in a SQLite registry so that later releases sharing
//! content skip it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use release_archivist::{Config, Pipeline, Release, ReleaseFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // ENCRYPTION_PASSWORD, STORAGE_ROOT, ... from the environment or `.env`
//!     let config = Config::from_env()?;
//!     let pipeline = Pipeline::from_config(config).await?;
//!
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let release = Release {
//!         handle: "a1b2c3".to_string(),
//!         name: "Some Game".to_string(),
//!         files: vec![ReleaseFile::new("Some Game [0100ABCD12340000].nsp", 1024)],
//!     };
//!     let task_id = pipeline.submit(release).await?;
//!     println!("tracking {}", task_id);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Encrypted packing, splitting and reassembly
pub mod archive;
/// File name classification
pub mod categorizer;
/// Configuration types
pub mod config;
/// Registry persistence layer
pub mod db;
/// Release to entity resolution
pub mod dedup;
/// Error types
pub mod error;
/// File fetching collaborator
pub mod fetcher;
/// Release ingestion pipeline
pub mod pipeline;
/// Task lifecycle registry
pub mod tasks;
/// Core types and events
pub mod types;
/// Remote upload collaborator
pub mod uploader;
/// Storage utilities
pub mod utils;

// Re-export commonly used types
pub use archive::Archivist;
pub use categorizer::categorize;
pub use config::Config;
pub use db::{CommitOutcome, Database, RegistryStore};
pub use error::{ArchiveError, DatabaseError, Error, Result, UploadError};
pub use fetcher::{FetchProgress, FileFetcher, LocalDirFetcher};
pub use pipeline::Pipeline;
pub use tasks::TaskRegistry;
pub use types::{
    Category, EntityKind, EntityLink, Event, Release, ReleaseEntity, ReleaseFile, Task, TaskId,
    TaskStatus, TaskUpdate,
};
pub use uploader::{DirectoryUploader, HttpUploader, RemoteUploader};

/// Run the pipeline until a termination signal arrives, then shut it down.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to whichever can be registered.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use release_archivist::{Config, Pipeline, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pipeline = Pipeline::from_config(Config::from_env()?).await?;
///     run_with_shutdown(pipeline).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(pipeline: Pipeline) {
    wait_for_signal().await;
    pipeline.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
