use std::sync::Arc;

use anyhow::Context;
use log::debug;
use uuid::Uuid;

use resforge_files::animation::{Animation, JointTrack, QuatKey, Vec3Key};

use crate::async_core::reschedule_to;
use crate::database::ResourcePathHint;
use crate::importer::commit::commit_file;
use crate::importer::external::{ExternalAnimation, ExternalScene};
use crate::importer::meshes::SkeletonRef;
use crate::importer::{ImportContext, ImportError};

/// Used when the source doesn't specify a tick rate.
const DEFAULT_TICKS_PER_SECOND: f64 = 30.0;

/// Converts tick based keys to seconds and orders the tracks by joint.
pub(crate) fn build_animation(external: &ExternalAnimation, skeleton: SkeletonRef) -> Result<Animation, ImportError> {
    let tps = if external.ticks_per_second > 0.0 {
        external.ticks_per_second
    } else {
        DEFAULT_TICKS_PER_SECOND
    };

    let mut tracks: Vec<Option<JointTrack>> = vec![None; skeleton.num_joints];
    for track in &external.tracks {
        let slot = tracks.get_mut(track.joint).ok_or_else(|| {
            ImportError::AssetContent(format!(
                "animation '{}' animates joint {} of a skeleton with {} joints",
                external.name, track.joint, skeleton.num_joints
            ))
        })?;

        if slot.is_some() {
            return Err(ImportError::AssetContent(format!(
                "animation '{}' has more than one track for joint {}",
                external.name, track.joint
            )));
        }

        let seconds = |ticks: f32| (ticks as f64 / tps) as f32;
        *slot = Some(JointTrack {
            positions: track
                .positions
                .iter()
                .map(|&(time, value)| Vec3Key {
                    time: seconds(time),
                    value: value.to_array(),
                })
                .collect(),
            rotations: track
                .rotations
                .iter()
                .map(|&(time, value)| QuatKey {
                    time: seconds(time),
                    value: value.to_array(),
                })
                .collect(),
            scalings: track
                .scalings
                .iter()
                .map(|&(time, value)| Vec3Key {
                    time: seconds(time),
                    value: value.to_array(),
                })
                .collect(),
        });
    }

    Ok(Animation {
        skeleton_uuid: skeleton.uuid,
        duration: external.duration / tps,
        ticks_per_second: tps,
        tracks: tracks.into_iter().map(Option::unwrap_or_default).collect(),
    })
}

async fn commit_animation(
    context: &ImportContext,
    external: &ExternalAnimation,
    skeleton: SkeletonRef,
) -> anyhow::Result<Uuid> {
    let animation = build_animation(external, skeleton)?;
    let hint = ResourcePathHint::new("animations", external.name.as_str(), "janim");
    commit_file(context, &animation, &hint).await
}

pub(crate) async fn import_animation(
    context: Arc<ImportContext>,
    scene: Arc<ExternalScene>,
    animation_id: usize,
    skeleton: SkeletonRef,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let external = &scene.animations[animation_id];
    let uuid = commit_animation(&context, external, skeleton)
        .await
        .with_context(|| format!("Importing animation '{}'", external.name))?;

    debug!("Imported animation '{}' as {}", external.name, uuid);
    Ok(uuid)
}
