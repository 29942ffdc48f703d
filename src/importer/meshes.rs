use std::sync::Arc;

use anyhow::Context;
use glam::{Vec2, Vec3};
use itertools::Itertools;
use log::debug;
use uuid::Uuid;

use resforge_files::mesh::{Aabb, Mesh, MeshLod, MeshVertices, VertexSkinned, VertexStatic};

use crate::async_core::reschedule_to;
use crate::database::ResourcePathHint;
use crate::importer::commit::commit_file;
use crate::importer::external::{ExternalMesh, ExternalScene, ExternalSkin};
use crate::importer::{ImportContext, ImportError};

/// A committed skeleton as seen by the meshes skinned to it.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SkeletonRef {
    pub uuid: Uuid,
    pub num_joints: usize,
}

const MAX_INFLUENCES: usize = 4;

fn content_error(mesh: &ExternalMesh, what: impl std::fmt::Display) -> ImportError {
    ImportError::AssetContent(format!("mesh '{}' {}", mesh.name, what))
}

/// Per vertex tangents from the uv layout, orthogonalized against the normals.
pub(crate) fn generate_tangents(positions: &[Vec3], normals: &[Vec3], uvs: &[Vec2], indices: &[u32]) -> Vec<Vec3> {
    let mut accumulated = vec![Vec3::ZERO; positions.len()];

    for (a, b, c) in indices.iter().map(|&idx| idx as usize).tuples() {
        let edge1 = positions[b] - positions[a];
        let edge2 = positions[c] - positions[a];
        let duv1 = uvs[b] - uvs[a];
        let duv2 = uvs[c] - uvs[a];

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }

        let tangent = (edge1 * duv2.y - edge2 * duv1.y) / det;
        for idx in [a, b, c] {
            accumulated[idx] += tangent;
        }
    }

    accumulated
        .into_iter()
        .zip(normals)
        .map(|(tangent, &normal)| {
            let orthogonal = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
            if orthogonal == Vec3::ZERO {
                normal.any_orthonormal_vector()
            } else {
                orthogonal
            }
        })
        .collect()
}

/// Quantizes up to four weights into unorm8 values summing up to exactly 255. `influences` has to be
/// sorted by descending weight.
pub(crate) fn quantize_weights(influences: &[(u8, f32)]) -> ([u8; 4], [u8; 4]) {
    let total: f32 = influences.iter().map(|(_, weight)| weight).sum();
    let mut ids = [0u8; 4];
    let mut weights = [0u8; 4];

    for (slot, (joint, weight)) in influences.iter().take(MAX_INFLUENCES).enumerate() {
        ids[slot] = *joint;
        weights[slot] = (weight / total * 255.0).round().clamp(0.0, 255.0) as u8;
    }

    let sum: i32 = weights.iter().map(|&w| w as i32).sum();
    weights[0] = (weights[0] as i32 + 255 - sum).clamp(0, 255) as u8;
    (ids, weights)
}

fn skin_vertices(
    mesh: &ExternalMesh,
    skin: &ExternalSkin,
    num_joints: usize,
    base: Vec<VertexStatic>,
) -> Result<Vec<VertexSkinned>, ImportError> {
    let mut influences: Vec<Vec<(u8, f32)>> = vec![Vec::new(); base.len()];

    for bone in &skin.bones {
        if bone.joint >= num_joints {
            return Err(content_error(
                mesh,
                format!("references joint {} of a skeleton with {} joints", bone.joint, num_joints),
            ));
        }

        for &(vertex, weight) in &bone.weights {
            let slot = influences
                .get_mut(vertex as usize)
                .ok_or_else(|| content_error(mesh, format!("weights vertex {} which doesn't exist", vertex)))?;
            if weight > 0.0 {
                slot.push((bone.joint as u8, weight));
            }
        }
    }

    base.into_iter()
        .zip(influences)
        .enumerate()
        .map(|(idx, (base, mut influences))| {
            if influences.is_empty() {
                return Err(content_error(mesh, format!("has no joint weights for vertex {}", idx)));
            }

            influences.sort_by(|lhs, rhs| rhs.1.total_cmp(&lhs.1));
            influences.truncate(MAX_INFLUENCES);
            let (joint_ids, joint_weights) = quantize_weights(&influences);

            Ok(VertexSkinned {
                base,
                joint_ids,
                joint_weights,
            })
        })
        .collect()
}

pub(crate) fn build_mesh(mesh: &ExternalMesh, skeleton: Option<SkeletonRef>) -> Result<Mesh, ImportError> {
    let num_verts = mesh.positions.len();
    if num_verts == 0 {
        return Err(content_error(mesh, "has no vertices"));
    }

    let normals = mesh
        .normals
        .as_ref()
        .filter(|normals| normals.len() == num_verts)
        .ok_or_else(|| content_error(mesh, "has no normals"))?;

    let uvs = mesh
        .uvs
        .as_ref()
        .filter(|uvs| uvs.len() == num_verts)
        .ok_or_else(|| content_error(mesh, "has no uvs"))?;

    if mesh.indices.is_empty() || mesh.indices.len() % 3 != 0 {
        return Err(content_error(mesh, "is not a triangle list"));
    }

    if mesh.indices.iter().any(|&idx| idx as usize >= num_verts) {
        return Err(content_error(mesh, "has indices past its vertices"));
    }

    let tangents = match &mesh.tangents {
        Some(tangents) if tangents.len() == num_verts => tangents.clone(),
        _ => generate_tangents(&mesh.positions, normals, uvs, &mesh.indices),
    };

    let base = mesh
        .positions
        .iter()
        .zip(uvs)
        .zip(normals)
        .zip(&tangents)
        .map(|(((position, uv), normal), tangent)| VertexStatic {
            position: position.to_array(),
            uv: uv.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
        })
        .collect_vec();

    let aabb = Aabb::from_positions(base.iter().map(|vertex| &vertex.position));

    let (vertices, skeleton_uuid) = match (&mesh.skin, skeleton) {
        (None, _) => (MeshVertices::Static(base), Uuid::nil()),
        (Some(skin), Some(skeleton)) => (
            MeshVertices::Skinned(skin_vertices(mesh, skin, skeleton.num_joints, base)?),
            skeleton.uuid,
        ),
        (Some(skin), None) => return Err(ImportError::UnknownSkeleton(skin.skeleton)),
    };

    Ok(Mesh {
        skeleton_uuid,
        aabb,
        lods: vec![MeshLod {
            vertices,
            elements: mesh.indices.clone(),
        }],
    })
}

async fn commit_mesh(
    context: &ImportContext,
    external: &ExternalMesh,
    skeleton: Option<SkeletonRef>,
) -> anyhow::Result<Uuid> {
    let mesh = build_mesh(external, skeleton)?;

    if let Some(skeleton) = skeleton {
        if context.database.locate(&skeleton.uuid)?.is_none() {
            return Err(ImportError::MissingDependency { uuid: skeleton.uuid }.into());
        }
    }

    let hint = ResourcePathHint::new("meshes", external.name.as_str(), "jmesh");
    commit_file(context, &mesh, &hint).await
}

pub(crate) async fn import_mesh(
    context: Arc<ImportContext>,
    scene: Arc<ExternalScene>,
    mesh_id: usize,
    skeleton: Option<SkeletonRef>,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let external = &scene.meshes[mesh_id];
    let uuid = commit_mesh(&context, external, skeleton)
        .await
        .with_context(|| format!("Importing mesh '{}'", external.name))?;

    debug!("Imported mesh '{}' as {}", external.name, uuid);
    Ok(uuid)
}
