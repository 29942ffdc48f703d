use std::sync::Arc;

use anyhow::Context;
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use resforge_files::ResourceType;
use resforge_files::texture::Colorspace;

use crate::async_core::reschedule_to;
use crate::database::ResourcePathHint;
use crate::importer::ImportContext;
use crate::importer::commit::commit_json;

const DEFAULT_SPECPOWER: f32 = 128.0;

/// What a material wants to use an image for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ImageIntent {
    Albedo,
    Specular,
    Normal,
}

impl ImageIntent {
    pub fn colorspace(self) -> Colorspace {
        match self {
            ImageIntent::Albedo => Colorspace::Srgb,
            ImageIntent::Specular | ImageIntent::Normal => Colorspace::Linear,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub(crate) struct MaterialTextures {
    pub diffuse: Option<Uuid>,
    pub specular: Option<Uuid>,
    pub normal: Option<Uuid>,
}

#[derive(Serialize)]
struct MaterialFile {
    #[serde(flatten)]
    textures: MaterialTextures,
    specpower: f32,
}

#[derive(Serialize)]
struct MeshDescFile {
    mesh: Uuid,
    material: Option<Uuid>,
    #[serde(flatten)]
    textures: MaterialTextures,
}

pub(crate) async fn import_material(
    context: Arc<ImportContext>,
    name: String,
    textures: MaterialTextures,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let file = MaterialFile {
        textures,
        specpower: DEFAULT_SPECPOWER,
    };
    let hint = ResourcePathHint::new("materials", name.as_str(), "jmatl");
    let uuid = commit_json(&context, ResourceType::Material, &file, &hint)
        .await
        .with_context(|| format!("Importing material '{}'", name))?;

    debug!("Imported material '{}' as {}", name, uuid);
    Ok(uuid)
}

/// A mesh description pairs a mesh with the material it is drawn with. The material's textures are
/// repeated so a renderer doesn't have to open the material first.
pub(crate) async fn import_mesh_desc(
    context: Arc<ImportContext>,
    name: String,
    mesh: Uuid,
    material: Option<(Uuid, MaterialTextures)>,
) -> anyhow::Result<Uuid> {
    let _guard = context.task_counter.obtain_task_guard();
    reschedule_to(&context.thread_pool).await;

    let file = MeshDescFile {
        mesh,
        material: material.map(|(uuid, _)| uuid),
        textures: material.map(|(_, textures)| textures).unwrap_or_default(),
    };
    let hint = ResourcePathHint::new("meshes", name.as_str(), "jmdesc");
    let uuid = commit_json(&context, ResourceType::MeshDesc, &file, &hint)
        .await
        .with_context(|| format!("Describing mesh '{}'", name))?;

    debug!("Imported mesh description '{}' as {}", name, uuid);
    Ok(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn only_albedo_is_srgb() {
        assert_eq!(ImageIntent::Albedo.colorspace(), Colorspace::Srgb);
        assert_eq!(ImageIntent::Specular.colorspace(), Colorspace::Linear);
        assert_eq!(ImageIntent::Normal.colorspace(), Colorspace::Linear);
    }

    #[test]
    pub fn mesh_descs_flatten_the_texture_references() -> Result<(), anyhow::Error> {
        let diffuse = Uuid::new_v4();
        let file = MeshDescFile {
            mesh: Uuid::new_v4(),
            material: None,
            textures: MaterialTextures {
                diffuse: Some(diffuse),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&file)?;
        assert_eq!(json["diffuse"], serde_json::json!(diffuse.to_string()));
        assert!(json["material"].is_null());
        assert!(json["normal"].is_null());
        Ok(())
    }
}
