use std::sync::Arc;

use anyhow::Context;
use log::debug;
use uuid::Uuid;

use resforge_files::skeleton::{MAX_JOINTS, NO_PARENT, Skeleton, SkeletonJoint};

use crate::async_core::reschedule_to;
use crate::database::ResourcePathHint;
use crate::importer::commit::commit_file;
use crate::importer::external::{ExternalScene, ExternalSkeleton};
use crate::importer::{ImportContext, ImportError};

pub(crate) fn build_skeleton(external: &ExternalSkeleton) -> Result<Skeleton, ImportError> {
    if external.joints.is_empty() {
        return Err(ImportError::AssetContent(format!(
            "skeleton '{}' has no joints",
            external.name
        )));
    }

    if external.joints.len() > MAX_JOINTS {
        return Err(ImportError::AssetContent(format!(
            "skeleton '{}' has {} joints, at most {} are supported",
            external.name,
            external.joints.len(),
            MAX_JOINTS
        )));
    }

    let joints = external
        .joints
        .iter()
        .enumerate()
        .map(|(idx, joint)| match joint.parent {
            Some(parent) if parent >= idx => Err(ImportError::AssetContent(format!(
                "joint '{}' of skeleton '{}' is stored before its parent",
                joint.name, external.name
            ))),
            parent => Ok(SkeletonJoint {
                name: joint.name.clone(),
                inv_bind: joint.inv_bind.to_cols_array(),
                parent: parent.map_or(NO_PARENT, |parent| parent as u32),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Skeleton { joints })
}

async fn commit_skeleton(context: &ImportContext, external: &ExternalSkeleton) -> anyhow::Result<Uuid> {
    let skeleton = build_skeleton(external)?;
    let hint = ResourcePathHint::new("skeletons", external.name.as_str(), "jskel");
    commit_file(context, &skeleton, &hint).await
}

pub(crate) async fn import_skeleton(
    context: Arc<ImportContext>,
    scene: Arc<ExternalScene>,
    skeleton_id: usize,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let external = scene
        .skeletons
        .get(skeleton_id)
        .ok_or(ImportError::UnknownSkeleton(skeleton_id))?;

    let uuid = commit_skeleton(&context, external)
        .await
        .with_context(|| format!("Importing skeleton '{}'", external.name))?;

    debug!("Imported skeleton '{}' as {}", external.name, uuid);
    Ok(uuid)
}
