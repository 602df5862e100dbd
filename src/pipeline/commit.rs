//! Part upload, registry commit and cleanup.

use crate::db::{CommitOutcome, NewFileRecord, NewStorageLocation};
use crate::tasks::ProgressSampler;
use crate::types::{EntityLink, Event, Release, TaskId, TaskUpdate};
use crate::utils::remove_path;
use crate::{Error, Result};

use super::Pipeline;
use super::packing::PackedEntity;

/// Caption attached to each uploaded part
pub(crate) fn part_caption(category: &str, number: usize, total: usize) -> String {
    format!("{} - Part {}/{}", category, number, total)
}

impl Pipeline {
    /// Upload every entity's parts and commit each entity once its parts are up
    ///
    /// Parts are uploaded sequentially. Task progress follows uploaded bytes
    /// across all parts of the release, sampled at most once a second; the
    /// last part always reports.
    pub(super) async fn upload_and_commit(
        &self,
        id: &TaskId,
        release: &Release,
        packed: Vec<PackedEntity>,
    ) -> Result<Vec<EntityLink>> {
        let mut part_sizes = Vec::with_capacity(packed.len());
        for entity in &packed {
            let mut sizes = Vec::with_capacity(entity.parts.len());
            for part in &entity.parts {
                sizes.push(tokio::fs::metadata(part).await?.len());
            }
            part_sizes.push(sizes);
        }
        let total_bytes: u64 = part_sizes.iter().flatten().sum();
        let total_part_count: usize = part_sizes.iter().map(Vec::len).sum();

        let mut sampler = ProgressSampler::new();
        let mut uploaded_bytes = 0u64;
        let mut uploaded_parts = 0usize;
        let mut links = Vec::with_capacity(packed.len());

        for (entity, sizes) in packed.into_iter().zip(part_sizes) {
            let total_parts = entity.parts.len();
            let mut locations = Vec::with_capacity(total_parts);

            for (n, (part, size)) in entity.parts.iter().zip(sizes).enumerate() {
                let number = n + 1;
                let caption = part_caption(&entity.category, number, total_parts);
                tracing::debug!(task_id = %id, entity = %entity.entity.name, part = number, total_parts, "uploading part");

                let link = self.uploader.upload(part, &caption).await?;
                locations.push(NewStorageLocation {
                    remote_link: link,
                    archive_name: entity.archive_name.clone(),
                    is_parted: total_parts > 1,
                    part_number: number as i32,
                    total_parts: total_parts as i32,
                });

                uploaded_bytes += size;
                uploaded_parts += 1;
                let sample = if uploaded_parts == total_part_count {
                    Some(sampler.finish(uploaded_bytes, total_bytes))
                } else {
                    sampler.sample(uploaded_bytes, total_bytes)
                };
                if let Some(sample) = sample {
                    let update = TaskUpdate::progress(sample.progress)
                        .with_rate(sample.speed_bps, sample.eta_secs);
                    self.update_task(id, update).await?;
                }
            }

            let (link, existed) = self.commit_entity(id, &entity, locations).await?;
            self.cleanup_entity(id, release, &entity).await;

            links.push(EntityLink {
                name: entity.entity.name.clone(),
                link,
                existed,
            });
        }

        Ok(links)
    }

    /// Persist the entity record and all of its parts in one transaction
    ///
    /// Returns the link of the first stored part, and whether another release
    /// committed the same entity first (its parts then win and ours are
    /// left unreferenced).
    async fn commit_entity(
        &self,
        id: &TaskId,
        packed: &PackedEntity,
        locations: Vec<NewStorageLocation>,
    ) -> Result<(String, bool)> {
        let first_link = locations
            .first()
            .map(|l| l.remote_link.clone())
            .ok_or_else(|| Error::Other(format!("entity {} has no parts", packed.entity.name)))?;
        let parts = locations.len() as u32;

        let record = NewFileRecord {
            original_name: packed.entity.name.clone(),
            size: i64::try_from(packed.entity.size).unwrap_or(i64::MAX),
            content_hash: packed.entity.identity_hash.clone(),
            category: packed.category.clone(),
        };

        let file_id = match self.store.commit_entity(record, locations).await? {
            CommitOutcome::Inserted(file_id) => file_id,
            CommitOutcome::AlreadyCommitted(file_id) => {
                let stored = self.store.storage_locations(file_id).await?;
                let link = stored
                    .into_iter()
                    .next()
                    .map(|l| l.remote_link)
                    .unwrap_or_default();
                tracing::warn!(
                    task_id = %id,
                    entity = %packed.entity.name,
                    file_id,
                    redundant_parts = parts,
                    "entity was committed concurrently, keeping the earlier upload"
                );
                return Ok((link, true));
            }
        };

        tracing::info!(
            task_id = %id,
            entity = %packed.entity.name,
            file_id,
            parts,
            "entity committed"
        );
        self.event_tx
            .send(Event::EntityCommitted {
                id: id.clone(),
                entity: packed.entity.name.clone(),
                category: packed.category.clone(),
                link: first_link.clone(),
                parts,
            })
            .ok();

        Ok((first_link, false))
    }

    /// Remove the entity's work directory and, if configured, its fetched sources
    async fn cleanup_entity(&self, id: &TaskId, release: &Release, packed: &PackedEntity) {
        if let Err(e) = remove_path(&packed.work_dir).await {
            tracing::warn!(task_id = %id, path = ?packed.work_dir, error = %e, "failed to remove work directory");
        }

        if !self.config.storage.delete_sources_after_upload {
            return;
        }
        for source in &packed.sources {
            if let Err(e) = remove_path(source).await {
                tracing::warn!(task_id = %id, path = ?source, error = %e, "failed to remove source file");
            }
        }
        tracing::debug!(task_id = %id, release = %release.name, entity = %packed.entity.name, "sources removed");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_format() {
        assert_eq!(part_caption("DLC", 2, 3), "DLC - Part 2/3");
        assert_eq!(part_caption("Folder", 1, 1), "Folder - Part 1/1");
    }
}
