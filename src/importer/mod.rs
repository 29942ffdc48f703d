//! Turns external assets into resources of the [`ResourceDatabase`]. Every resource is produced by
//! its own [`Job`], the jobs of one model form a graph whose edges are resource references.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use resforge_files::texture::Colorspace;

use crate::async_core::{ExecutorHandle, Job, TaskCounterHandle};
use crate::database::ResourceDatabase;
use crate::runtime::RuntimeHandles;

mod animations;
mod commit;
pub mod external;
pub mod image_decoder;
mod materials;
mod meshes;
pub mod obj_decoder;
mod scene;
mod skeletons;
mod textures;

pub use external::{DecodeFlags, DecodedImage, ExternalScene, ImageDecoder, SceneDecoder};
pub use image_decoder::ImageFileDecoder;
pub use obj_decoder::ObjSceneDecoder;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to import \"{path}\": {reason}")]
    AssetFileImport { path: PathBuf, reason: String },
    #[error("Unsupported asset content: {0}")]
    AssetContent(String),
    #[error("Skeleton #{0} is referenced but not part of the asset")]
    UnknownSkeleton(usize),
    #[error("Resource {uuid} is referenced but not present in the database")]
    MissingDependency { uuid: Uuid },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum TextureEncoding {
    Raw,
    #[default]
    Png,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImportTextureParams {
    pub generate_mips: bool,
    pub encoding: TextureEncoding,
    pub colorspace: Colorspace,
}

impl Default for ImportTextureParams {
    fn default() -> Self {
        ImportTextureParams {
            generate_mips: true,
            encoding: TextureEncoding::default(),
            colorspace: Colorspace::Srgb,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImportModelParams {
    pub generate_mips: bool,
    pub encoding: TextureEncoding,
    pub collapse_graph: bool,
    pub merge_meshes: bool,
}

impl Default for ImportModelParams {
    fn default() -> Self {
        ImportModelParams {
            generate_mips: true,
            encoding: TextureEncoding::default(),
            collapse_graph: false,
            merge_meshes: false,
        }
    }
}

impl ImportModelParams {
    pub fn decode_flags(&self) -> DecodeFlags {
        let mut flags = DecodeFlags::empty();
        flags.set(DecodeFlags::COLLAPSE_GRAPH, self.collapse_graph);
        flags.set(DecodeFlags::MERGE_MESHES, self.merge_meshes);
        flags
    }
}

#[derive(Clone)]
pub struct Decoders {
    pub scene: Arc<dyn SceneDecoder>,
    pub image: Arc<dyn ImageDecoder>,
}

impl Default for Decoders {
    fn default() -> Self {
        Decoders {
            scene: Arc::new(ObjSceneDecoder),
            image: Arc::new(ImageFileDecoder),
        }
    }
}

/// Everything an import job needs, shared by all jobs of all imports.
pub(crate) struct ImportContext {
    pub database: Arc<ResourceDatabase>,
    pub thread_pool: ExecutorHandle,
    pub local_context: ExecutorHandle,
    pub offscreen_context: ExecutorHandle,
    pub task_counter: TaskCounterHandle,
    pub decoders: Decoders,
}

pub struct AssetImporter {
    context: Arc<ImportContext>,
}

impl AssetImporter {
    pub fn new(database: Arc<ResourceDatabase>, handles: RuntimeHandles, decoders: Decoders) -> Self {
        AssetImporter {
            context: Arc::new(ImportContext {
                database,
                thread_pool: handles.thread_pool,
                local_context: handles.local_context,
                offscreen_context: handles.offscreen_context,
                task_counter: handles.task_counter,
                decoders,
            }),
        }
    }

    /// Imports every mesh, skeleton, animation, material and texture of the model at `path`, and a
    /// scene resource tying them together. Resolves to the UUID of the scene.
    ///
    /// Resources committed before a failure stay in the database.
    pub fn import_model(&self, path: impl Into<PathBuf>, params: ImportModelParams) -> Job<Uuid> {
        Job::spawn(scene::import_model(self.context.clone(), path.into(), params))
    }

    pub fn import_texture(&self, path: impl Into<PathBuf>, params: ImportTextureParams) -> Job<Uuid> {
        Job::spawn(textures::import_texture(self.context.clone(), path.into(), params))
    }
}
