//! Per-release lifecycle.

use crate::dedup;
use crate::fetcher::FetchProgress;
use crate::tasks::ProgressSampler;
use crate::types::{EntityLink, Event, Release, ReleaseEntity, TaskId, TaskStatus, TaskUpdate};
use crate::{Error, Result};
use tokio::sync::mpsc;

use super::Pipeline;

impl Pipeline {
    /// Run one release through every phase
    ///
    /// Phases:
    /// 1. Resolve entities against the registry (`Pending`)
    /// 2. Check the storage limit
    /// 3. Fetch the files of missing entities (`Downloading`)
    /// 4. Pack every missing entity (`Packing`)
    /// 5. Upload parts and commit each entity (`Uploading`)
    /// 6. Report completion (`Completed`)
    ///
    /// Any error marks the task `Failed`; entities committed before the
    /// error stay committed.
    pub async fn process(&self, id: &TaskId, release: &Release) -> Result<()> {
        match self.run_phases(id, release).await {
            Ok(links) => {
                self.update_task(
                    id,
                    TaskUpdate::status(TaskStatus::Completed).with_progress(100.0),
                )
                .await?;
                tracing::info!(task_id = %id, release = %release.name, entities = links.len(), "release completed");
                self.event_tx
                    .send(Event::TaskCompleted {
                        id: id.clone(),
                        links,
                    })
                    .ok();
                Ok(())
            }
            Err(e) => {
                tracing::error!(task_id = %id, release = %release.name, error = %e, "release failed");
                if let Err(update_err) = self.update_task(id, TaskUpdate::failed(e.to_string())).await
                {
                    tracing::warn!(task_id = %id, error = %update_err, "could not mark task failed");
                }
                self.event_tx
                    .send(Event::TaskFailed {
                        id: id.clone(),
                        error: e.to_string(),
                        code: e.error_code().to_string(),
                    })
                    .ok();
                Err(e)
            }
        }
    }

    async fn run_phases(&self, id: &TaskId, release: &Release) -> Result<Vec<EntityLink>> {
        // Phase 1: resolve
        let entities = dedup::resolve(
            &release.files,
            self.config.processing.folder_threshold,
            self.store.as_ref(),
        )
        .await?;

        let missing: Vec<ReleaseEntity> = entities.iter().filter(|e| !e.exists).cloned().collect();
        if missing.is_empty() {
            tracing::info!(task_id = %id, "every entity already stored");
            return Ok(existing_links(&entities));
        }

        // Phase 2: storage guard
        if let Some(limit) = self.config.storage_limit_bytes() {
            crate::utils::check_storage_limit(&self.config.storage.storage_root, limit).await?;
        }

        // Phase 3: fetch
        let indices = dedup::fetch_indices(&entities);
        let total_size: u64 = missing.iter().map(|e| e.size).sum();
        self.update_task(
            id,
            TaskUpdate::status(TaskStatus::Downloading).with_total_size(total_size),
        )
        .await?;
        tracing::info!(task_id = %id, files = indices.len(), bytes = total_size, "fetching missing files");
        self.fetch_with_progress(id, release, &indices).await?;

        // Phase 4: pack
        self.update_task(id, TaskUpdate::status(TaskStatus::Packing))
            .await?;
        let packed = self.pack_entities(id, release, &missing).await?;

        // Phase 5: upload and commit
        self.update_task(id, TaskUpdate::status(TaskStatus::Uploading))
            .await?;
        let committed = self.upload_and_commit(id, release, packed).await?;

        let task_work_dir = self.config.work_dir().join(id.as_str());
        if let Err(e) = crate::utils::remove_path(&task_work_dir).await {
            tracing::warn!(task_id = %id, path = ?task_work_dir, error = %e, "failed to remove task work directory");
        }

        let mut links = existing_links(&entities);
        links.extend(committed);
        Ok(links)
    }

    /// Run the fetcher while mirroring its progress into the task
    async fn fetch_with_progress(
        &self,
        id: &TaskId,
        release: &Release,
        indices: &[usize],
    ) -> Result<()> {
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<FetchProgress>();

        let fetch = self.fetcher.fetch(release, indices, progress_tx);
        let forward = async {
            let mut sampler = ProgressSampler::new();
            while let Some(report) = progress_rx.recv().await {
                let Some(sample) = sampler.sample(report.bytes_done, report.bytes_total) else {
                    continue;
                };
                let speed = if report.rate_bps > 0 {
                    report.rate_bps
                } else {
                    sample.speed_bps
                };
                let eta = if speed > 0 {
                    report.bytes_total.saturating_sub(report.bytes_done) / speed
                } else {
                    0
                };
                let update = TaskUpdate::progress(sample.progress)
                    .with_rate(speed, eta)
                    .with_peers(report.peers);
                if let Err(e) = self.update_task(id, update).await {
                    tracing::warn!(task_id = %id, error = %e, "failed to record fetch progress");
                }
            }
        };

        let (result, ()) = tokio::join!(fetch, forward);
        result.map_err(|e| match e {
            Error::FetchFailed(_) => e,
            other => Error::FetchFailed(other.to_string()),
        })
    }
}

/// Links of entities that were already stored before this run
fn existing_links(entities: &[ReleaseEntity]) -> Vec<EntityLink> {
    entities
        .iter()
        .filter(|e| e.exists)
        .map(|e| EntityLink {
            name: e.name.clone(),
            link: e.storage_link.clone().unwrap_or_default(),
            existed: true,
        })
        .collect()
}
