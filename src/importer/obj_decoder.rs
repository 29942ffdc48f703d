use std::collections::BTreeMap;
use std::path::Path;

use glam::{Vec2, Vec3};
use itertools::Itertools;
use log::{debug, warn};

use crate::importer::ImportError;
use crate::importer::external::{
    DecodeFlags, ExternalMaterial, ExternalMesh, ExternalNode, ExternalScene, SceneDecoder, Transform,
};

/// Decodes Wavefront OBJ files (with their MTL libraries) into static meshes. OBJ has no notion of a
/// hierarchy, every model becomes a root node.
#[derive(Debug, Default)]
pub struct ObjSceneDecoder;

impl ObjSceneDecoder {
    fn convert_mesh(name: String, mesh: tobj::Mesh) -> ExternalMesh {
        let positions = mesh
            .positions
            .chunks_exact(3)
            .map(|p| Vec3::new(p[0], p[1], p[2]))
            .collect_vec();

        let normals = (!mesh.normals.is_empty()).then(|| {
            mesh.normals
                .chunks_exact(3)
                .map(|n| Vec3::new(n[0], n[1], n[2]))
                .collect_vec()
        });

        let uvs = (!mesh.texcoords.is_empty()).then(|| {
            mesh.texcoords
                .chunks_exact(2)
                .map(|uv| Vec2::new(uv[0], uv[1]))
                .collect_vec()
        });

        ExternalMesh {
            name,
            positions,
            normals,
            uvs,
            tangents: None,
            indices: mesh.indices,
            material: mesh.material_id,
            skin: None,
        }
    }

    /// Concatenates meshes sharing a material. Meshes disagreeing on which attributes they carry stay
    /// separate.
    fn merge_meshes(meshes: Vec<ExternalMesh>) -> Vec<ExternalMesh> {
        let mut groups: BTreeMap<(Option<usize>, bool, bool), Vec<ExternalMesh>> = BTreeMap::new();
        for mesh in meshes {
            let key = (mesh.material, mesh.normals.is_some(), mesh.uvs.is_some());
            groups.entry(key).or_default().push(mesh);
        }

        groups
            .into_values()
            .map(|group| {
                group
                    .into_iter()
                    .reduce(|mut merged, mesh| {
                        let base = merged.positions.len() as u32;
                        merged.positions.extend(mesh.positions);
                        if let (Some(dst), Some(src)) = (merged.normals.as_mut(), mesh.normals) {
                            dst.extend(src);
                        }
                        if let (Some(dst), Some(src)) = (merged.uvs.as_mut(), mesh.uvs) {
                            dst.extend(src);
                        }
                        merged.indices.extend(mesh.indices.iter().map(|idx| idx + base));
                        merged
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

impl SceneDecoder for ObjSceneDecoder {
    fn decode_scene(&self, path: &Path, flags: DecodeFlags) -> Result<ExternalScene, ImportError> {
        let (models, materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ignore_lines: true,
                ignore_points: true,
                ..Default::default()
            },
        )
        .map_err(|err| ImportError::AssetFileImport {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let materials = materials.unwrap_or_else(|err| {
            warn!("Ignoring the materials of \"{}\": {}", path.display(), err);
            Vec::new()
        });

        let base_dir = path.parent().unwrap_or(Path::new(""));
        let materials = materials
            .into_iter()
            .map(|material| ExternalMaterial {
                name: material.name,
                diffuse: material.diffuse_texture.map(|tex| base_dir.join(tex)),
                specular: material.specular_texture.map(|tex| base_dir.join(tex)),
                normal: material.normal_texture.map(|tex| base_dir.join(tex)),
            })
            .collect_vec();

        let mut meshes = models
            .into_iter()
            .map(|model| Self::convert_mesh(model.name, model.mesh))
            .collect_vec();

        if flags.contains(DecodeFlags::MERGE_MESHES) {
            meshes = Self::merge_meshes(meshes);
        }

        let nodes = if flags.contains(DecodeFlags::COLLAPSE_GRAPH) {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();

            vec![ExternalNode {
                name,
                parent: None,
                transform: Transform::default(),
                meshes: (0..meshes.len()).collect(),
            }]
        } else {
            meshes
                .iter()
                .enumerate()
                .map(|(idx, mesh)| ExternalNode {
                    name: mesh.name.clone(),
                    parent: None,
                    transform: Transform::default(),
                    meshes: vec![idx],
                })
                .collect()
        };

        debug!(
            "Decoded \"{}\": {} meshes, {} materials",
            path.display(),
            meshes.len(),
            materials.len()
        );

        Ok(ExternalScene {
            nodes,
            meshes,
            materials,
            skeletons: Vec::new(),
            animations: Vec::new(),
        })
    }
}
