use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use itertools::Itertools;
use log::{debug, info, warn};
use serde::Serialize;
use uuid::Uuid;

use resforge_files::ResourceType;

use crate::async_core::{Job, reschedule_to, until_all_ready};
use crate::database::ResourcePathHint;
use crate::importer::commit::commit_json;
use crate::importer::external::{ExternalScene, Transform};
use crate::importer::materials::{ImageIntent, MaterialTextures, import_material, import_mesh_desc};
use crate::importer::meshes::{SkeletonRef, import_mesh};
use crate::importer::{
    ImportContext, ImportError, ImportModelParams, ImportTextureParams, animations, skeletons, textures,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SceneTransform {
    pub position: [f32; 3],
    /// w, x, y, z
    pub rotation: [f32; 4],
    pub scaling: [f32; 3],
}

impl From<&Transform> for SceneTransform {
    fn from(transform: &Transform) -> Self {
        let rotation = transform.rotation;
        SceneTransform {
            position: transform.translation.to_array(),
            rotation: [rotation.w, rotation.x, rotation.y, rotation.z],
            scaling: transform.scale.to_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SceneEntity {
    pub name: String,
    /// Index of the parent entity, which always precedes this one.
    pub parent: Option<usize>,
    pub transform: SceneTransform,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

#[derive(Serialize)]
struct SceneFile {
    entities: Vec<SceneEntity>,
}

fn content_error(what: String) -> ImportError {
    ImportError::AssetContent(what)
}

/// Rejects dangling indices before any job gets submitted.
pub(crate) fn validate_scene(scene: &ExternalScene) -> Result<(), ImportError> {
    for (idx, node) in scene.nodes.iter().enumerate() {
        if node.parent.is_some_and(|parent| parent >= scene.nodes.len() || parent == idx) {
            return Err(content_error(format!("node '{}' has an invalid parent", node.name)));
        }

        if node.meshes.iter().any(|&mesh| mesh >= scene.meshes.len()) {
            return Err(content_error(format!("node '{}' references a missing mesh", node.name)));
        }
    }

    for mesh in &scene.meshes {
        if mesh.material.is_some_and(|material| material >= scene.materials.len()) {
            return Err(content_error(format!("mesh '{}' references a missing material", mesh.name)));
        }

        if let Some(skin) = &mesh.skin {
            if skin.skeleton >= scene.skeletons.len() {
                return Err(ImportError::UnknownSkeleton(skin.skeleton));
            }
        }
    }

    if let Some(animation) = scene
        .animations
        .iter()
        .find(|animation| animation.skeleton >= scene.skeletons.len())
    {
        return Err(ImportError::UnknownSkeleton(animation.skeleton));
    }

    Ok(())
}

/// Flattens the node hierarchy in preorder. Nodes with more than one mesh become the parent of one leaf
/// per mesh.
pub(crate) fn scene_entities(scene: &ExternalScene, mdesc_uuids: &[Uuid]) -> Vec<SceneEntity> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); scene.nodes.len()];
    let mut roots = Vec::new();
    for (idx, node) in scene.nodes.iter().enumerate() {
        match node.parent {
            Some(parent) => children[parent].push(idx),
            None => roots.push(idx),
        }
    }

    let mesh_component = |mesh: usize| (Some("Mesh"), mdesc_uuids.get(mesh).copied());

    let mut entities = Vec::new();
    let mut visited = 0;
    let mut stack = roots.into_iter().rev().map(|node| (node, None)).collect_vec();

    while let Some((node_id, parent)) = stack.pop() {
        let node = &scene.nodes[node_id];
        let entity_id = entities.len();
        visited += 1;

        let (kind, uuid) = match node.meshes.as_slice() {
            [mesh] => mesh_component(*mesh),
            _ => (None, None),
        };

        entities.push(SceneEntity {
            name: node.name.clone(),
            parent,
            transform: SceneTransform::from(&node.transform),
            kind,
            uuid,
        });

        if node.meshes.len() > 1 {
            for &mesh in &node.meshes {
                let (kind, uuid) = mesh_component(mesh);
                entities.push(SceneEntity {
                    name: scene.meshes[mesh].name.clone(),
                    parent: Some(entity_id),
                    transform: SceneTransform::from(&Transform::default()),
                    kind,
                    uuid,
                });
            }
        }

        stack.extend(children[node_id].iter().rev().map(|&child| (child, Some(entity_id))));
    }

    if visited < scene.nodes.len() {
        warn!(
            "{} nodes are not reachable from a root node and were left out of the scene",
            scene.nodes.len() - visited
        );
    }

    entities
}

fn collect_results(jobs: Vec<Job<Uuid>>) -> anyhow::Result<Vec<Uuid>> {
    Ok(jobs
        .into_iter()
        .map(Job::get_result)
        .collect::<Result<Vec<_>, _>>()?)
}

async fn build_model(context: Arc<ImportContext>, path: PathBuf, params: ImportModelParams) -> anyhow::Result<Uuid> {
    reschedule_to(&context.thread_pool).await;
    debug!("Importing model \"{}\"", path.display());

    let scene = Arc::new(
        context
            .decoders
            .scene
            .decode_scene(&path, params.decode_flags())?,
    );
    validate_scene(&scene)?;

    // Textures depend on nothing, start them right away. Materials sharing an image share the job.
    let mut texture_ids: HashMap<PathBuf, usize> = HashMap::new();
    let mut texture_jobs = Vec::new();
    let mut material_texture_ids = Vec::with_capacity(scene.materials.len());
    for material in &scene.materials {
        let mut ids = [None; 3];
        let slots = [
            (ImageIntent::Albedo, &material.diffuse),
            (ImageIntent::Specular, &material.specular),
            (ImageIntent::Normal, &material.normal),
        ];

        for (slot, (intent, image_path)) in slots.into_iter().enumerate() {
            let Some(image_path) = image_path else {
                continue;
            };

            let id = *texture_ids.entry(image_path.clone()).or_insert_with(|| {
                let texture_params = ImportTextureParams {
                    generate_mips: params.generate_mips,
                    encoding: params.encoding,
                    colorspace: intent.colorspace(),
                };
                texture_jobs.push(Job::spawn(textures::import_texture(
                    context.clone(),
                    image_path.clone(),
                    texture_params,
                )));
                texture_jobs.len() - 1
            });
            ids[slot] = Some(id);
        }

        material_texture_ids.push(ids);
    }

    // Meshes and animations embed the skeleton UUID, so skeletons are committed first.
    let skeleton_ids = scene
        .meshes
        .iter()
        .filter_map(|mesh| mesh.skin.as_ref().map(|skin| skin.skeleton))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect_vec();

    let skeleton_jobs = skeleton_ids
        .iter()
        .map(|&skeleton_id| Job::spawn(skeletons::import_skeleton(context.clone(), scene.clone(), skeleton_id)))
        .collect_vec();

    until_all_ready(&skeleton_jobs).await;

    let skeletons: HashMap<usize, SkeletonRef> = skeleton_ids
        .iter()
        .zip(collect_results(skeleton_jobs)?)
        .map(|(&skeleton_id, uuid)| {
            let num_joints = scene.skeletons[skeleton_id].joints.len();
            (skeleton_id, SkeletonRef { uuid, num_joints })
        })
        .collect();

    let mesh_jobs = scene
        .meshes
        .iter()
        .enumerate()
        .map(|(mesh_id, mesh)| {
            let skeleton = mesh
                .skin
                .as_ref()
                .and_then(|skin| skeletons.get(&skin.skeleton).copied());
            Job::spawn(import_mesh(context.clone(), scene.clone(), mesh_id, skeleton))
        })
        .collect_vec();

    let mut anim_jobs = Vec::new();
    for (animation_id, animation) in scene.animations.iter().enumerate() {
        match skeletons.get(&animation.skeleton) {
            Some(&skeleton) => anim_jobs.push(Job::spawn(animations::import_animation(
                context.clone(),
                scene.clone(),
                animation_id,
                skeleton,
            ))),
            None => warn!(
                "Skipping animation '{}', no mesh is skinned to its skeleton",
                animation.name
            ),
        }
    }

    until_all_ready(&texture_jobs).await;
    let texture_uuids = collect_results(texture_jobs)?;

    let material_textures = material_texture_ids
        .iter()
        .map(|[diffuse, specular, normal]| MaterialTextures {
            diffuse: diffuse.map(|id| texture_uuids[id]),
            specular: specular.map(|id| texture_uuids[id]),
            normal: normal.map(|id| texture_uuids[id]),
        })
        .collect_vec();

    let material_jobs = scene
        .materials
        .iter()
        .zip(&material_textures)
        .map(|(material, &textures)| Job::spawn(import_material(context.clone(), material.name.clone(), textures)))
        .collect_vec();

    until_all_ready(&mesh_jobs).await;
    until_all_ready(&material_jobs).await;
    let mesh_uuids = collect_results(mesh_jobs)?;
    let material_uuids = collect_results(material_jobs)?;

    let mdesc_jobs = scene
        .meshes
        .iter()
        .zip(&mesh_uuids)
        .map(|(mesh, &mesh_uuid)| {
            let material = mesh
                .material
                .map(|material| (material_uuids[material], material_textures[material]));
            Job::spawn(import_mesh_desc(context.clone(), mesh.name.clone(), mesh_uuid, material))
        })
        .collect_vec();

    until_all_ready(&anim_jobs).await;
    until_all_ready(&mdesc_jobs).await;
    let animation_uuids = collect_results(anim_jobs)?;
    let mdesc_uuids = collect_results(mdesc_jobs)?;

    let file = SceneFile {
        entities: scene_entities(&scene, &mdesc_uuids),
    };

    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let hint = ResourcePathHint::new("scenes", name, "jscene");
    let uuid = commit_json(&context, ResourceType::Scene, &file, &hint)
        .await
        .context("Committing the scene")?;

    info!(
        "Imported \"{}\" as scene {}: {} meshes, {} materials, {} textures, {} skeletons, {} animations",
        path.display(),
        uuid,
        mesh_uuids.len(),
        material_uuids.len(),
        texture_uuids.len(),
        skeletons.len(),
        animation_uuids.len()
    );
    Ok(uuid)
}

pub(crate) async fn import_model(
    context: Arc<ImportContext>,
    path: PathBuf,
    params: ImportModelParams,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    let description = format!("Importing model \"{}\"", path.display());
    build_model(context, path, params).await.context(description)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::external::{ExternalMesh, ExternalNode, ExternalSkin};
    use glam::{Quat, Vec3};

    fn node(name: &str, parent: Option<usize>, meshes: Vec<usize>) -> ExternalNode {
        ExternalNode {
            name: name.to_string(),
            parent,
            transform: Transform::default(),
            meshes,
        }
    }

    fn mesh(name: &str) -> ExternalMesh {
        ExternalMesh {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    pub fn entities_are_stored_in_preorder() {
        // Children are listed before their parents on purpose.
        let scene = ExternalScene {
            nodes: vec![
                node("leaf", Some(2), vec![0]),
                node("sibling", Some(3), vec![]),
                node("branch", Some(3), vec![]),
                node("root", None, vec![]),
            ],
            meshes: vec![mesh("m0")],
            ..Default::default()
        };
        let mdesc = Uuid::new_v4();

        let entities = scene_entities(&scene, &[mdesc]);
        let names = entities.iter().map(|entity| entity.name.as_str()).collect_vec();
        assert_eq!(names, vec!["root", "sibling", "branch", "leaf"]);

        for (idx, entity) in entities.iter().enumerate() {
            assert!(entity.parent.is_none_or(|parent| parent < idx));
        }
        assert_eq!(entities[3].parent, Some(2));
        assert_eq!(entities[3].kind, Some("Mesh"));
        assert_eq!(entities[3].uuid, Some(mdesc));
    }

    #[test]
    pub fn multi_mesh_nodes_get_leaves() {
        let mut root = node("root", None, vec![0, 1]);
        root.transform.translation = Vec3::new(1.0, 2.0, 3.0);
        root.transform.rotation = Quat::from_rotation_y(1.0);
        let scene = ExternalScene {
            nodes: vec![root],
            meshes: vec![mesh("a"), mesh("b")],
            ..Default::default()
        };
        let mdescs = [Uuid::new_v4(), Uuid::new_v4()];

        let entities = scene_entities(&scene, &mdescs);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].kind, None);
        assert_eq!(entities[0].transform.position, [1.0, 2.0, 3.0]);
        assert_eq!(entities[0].transform.rotation[0], Quat::from_rotation_y(1.0).w);
        assert_eq!(entities[1].parent, Some(0));
        assert_eq!(entities[2].uuid, Some(mdescs[1]));
        assert_eq!(entities[2].transform.rotation, [1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    pub fn dangling_references_are_rejected() {
        let scene = ExternalScene {
            nodes: vec![node("root", None, vec![1])],
            meshes: vec![mesh("only")],
            ..Default::default()
        };
        assert!(matches!(validate_scene(&scene), Err(ImportError::AssetContent(_))));

        let mut skinned = mesh("skinned");
        skinned.skin = Some(ExternalSkin {
            skeleton: 0,
            bones: vec![],
        });
        let scene = ExternalScene {
            meshes: vec![skinned],
            ..Default::default()
        };
        assert!(matches!(validate_scene(&scene), Err(ImportError::UnknownSkeleton(0))));
    }
}
