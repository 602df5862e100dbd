//! Per-entity packing.

use crate::Result;
use crate::archive::{OBFUSCATED_NAME_LEN, ProgressFn, generate_obfuscated_name};
use crate::categorizer;
use crate::types::{EntityKind, FOLDER_CATEGORY, Release, ReleaseEntity, TaskId, TaskUpdate};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::Pipeline;

/// An entity whose archive parts are ready for upload
#[derive(Debug, Clone)]
pub(super) struct PackedEntity {
    /// The entity being stored
    pub(super) entity: ReleaseEntity,
    /// Registry category label
    pub(super) category: String,
    /// Name shared by every part
    pub(super) archive_name: String,
    /// Parts in ascending order
    pub(super) parts: Vec<PathBuf>,
    /// Local source files of the entity
    pub(super) sources: Vec<PathBuf>,
    /// Directory holding the parts (removed after commit)
    pub(super) work_dir: PathBuf,
}

/// Registry label of an entity: categorizer result for files, `Folder` otherwise
pub(crate) fn category_label(entity: &ReleaseEntity) -> String {
    match entity.kind {
        EntityKind::File => categorizer::categorize(entity.base_name()).to_string(),
        EntityKind::Folder => FOLDER_CATEGORY.to_string(),
    }
}

impl Pipeline {
    /// Local source paths of an entity's members
    pub(super) fn entity_sources(&self, release: &Release, entity: &ReleaseEntity) -> Vec<PathBuf> {
        entity
            .member_indices
            .iter()
            .map(|&index| {
                self.fetcher.path_for(
                    &release.handle,
                    index,
                    &release.files[index].relative_path,
                )
            })
            .collect()
    }

    /// Pack every missing entity, in resolver order
    ///
    /// Task progress advances by entity count, refined by each archive's own
    /// packing/splitting progress.
    pub(super) async fn pack_entities(
        &self,
        id: &TaskId,
        release: &Release,
        missing: &[ReleaseEntity],
    ) -> Result<Vec<PackedEntity>> {
        let total = missing.len() as f32;
        let mut packed = Vec::with_capacity(missing.len());

        for (position, entity) in missing.iter().enumerate() {
            let category = category_label(entity);
            let sources = self.entity_sources(release, entity);
            let archive_name = generate_obfuscated_name(OBFUSCATED_NAME_LEN);
            let work_dir = self
                .config
                .work_dir()
                .join(id.as_str())
                .join(&archive_name);

            tracing::info!(
                task_id = %id,
                entity = %entity.name,
                category = %category,
                files = sources.len(),
                "packing entity"
            );

            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<f32>();
            let progress: ProgressFn = Arc::new(move |pct| {
                progress_tx.send(pct).ok();
            });

            let pack = self.archivist.pack_and_split(
                &sources,
                &work_dir,
                Some(&archive_name),
                Some(progress),
            );
            let forward = async {
                while let Some(pct) = progress_rx.recv().await {
                    let overall = (position as f32 + pct / 100.0) / total * 100.0;
                    if let Err(e) = self.update_task(id, TaskUpdate::progress(overall)).await {
                        tracing::warn!(task_id = %id, error = %e, "failed to record packing progress");
                    }
                }
            };

            let (parts, ()) = tokio::join!(pack, forward);
            let parts = parts?;

            tracing::debug!(task_id = %id, entity = %entity.name, parts = parts.len(), "entity packed");
            packed.push(PackedEntity {
                entity: entity.clone(),
                category,
                archive_name,
                parts,
                sources,
                work_dir,
            });
        }

        Ok(packed)
    }
}
