use std::path::{Path, PathBuf};

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec2, Vec3};

use crate::importer::ImportError;

bitflags! {
    /// Post-processing requested from a [`SceneDecoder`].
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct DecodeFlags: u32 {
        /// Flatten the node hierarchy where it carries no information.
        const COLLAPSE_GRAPH = 0x1;
        /// Merge meshes that share a material.
        const MERGE_MESHES = 0x2;
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Transform {
            translation,
            rotation,
            scale,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExternalNode {
    pub name: String,
    /// Index into [`ExternalScene::nodes`].
    pub parent: Option<usize>,
    /// Relative to the parent.
    pub transform: Transform,
    /// Indices into [`ExternalScene::meshes`].
    pub meshes: Vec<usize>,
}

/// All joint influences of one joint on a mesh, like most interchange formats store them.
#[derive(Debug, Clone, Default)]
pub struct ExternalBone {
    /// Index into the joints of the skin's skeleton.
    pub joint: usize,
    /// `(vertex index, weight)` pairs.
    pub weights: Vec<(u32, f32)>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalSkin {
    /// Index into [`ExternalScene::skeletons`].
    pub skeleton: usize,
    pub bones: Vec<ExternalBone>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalMesh {
    pub name: String,
    pub positions: Vec<Vec3>,
    pub normals: Option<Vec<Vec3>>,
    pub uvs: Option<Vec<Vec2>>,
    /// Generated from the uvs when absent.
    pub tangents: Option<Vec<Vec3>>,
    /// Triangle list.
    pub indices: Vec<u32>,
    /// Index into [`ExternalScene::materials`].
    pub material: Option<usize>,
    pub skin: Option<ExternalSkin>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalMaterial {
    pub name: String,
    pub diffuse: Option<PathBuf>,
    pub specular: Option<PathBuf>,
    pub normal: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ExternalJoint {
    pub name: String,
    pub parent: Option<usize>,
    pub inv_bind: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalSkeleton {
    pub name: String,
    /// Parents are stored before their children.
    pub joints: Vec<ExternalJoint>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalTrack {
    /// Index into the joints of the animated skeleton.
    pub joint: usize,
    /// Keys are `(time in ticks, value)`.
    pub positions: Vec<(f32, Vec3)>,
    pub rotations: Vec<(f32, Quat)>,
    pub scalings: Vec<(f32, Vec3)>,
}

#[derive(Debug, Clone, Default)]
pub struct ExternalAnimation {
    pub name: String,
    /// Index into [`ExternalScene::skeletons`].
    pub skeleton: usize,
    /// In ticks.
    pub duration: f64,
    pub ticks_per_second: f64,
    pub tracks: Vec<ExternalTrack>,
}

/// A decoded external asset, before anything has been committed to the resource database.
#[derive(Debug, Clone, Default)]
pub struct ExternalScene {
    pub nodes: Vec<ExternalNode>,
    pub meshes: Vec<ExternalMesh>,
    pub materials: Vec<ExternalMaterial>,
    pub skeletons: Vec<ExternalSkeleton>,
    pub animations: Vec<ExternalAnimation>,
}

impl ExternalScene {
    pub fn children_of(&self, node: Option<usize>) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, candidate)| candidate.parent == node)
            .map(|(idx, _)| idx)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// 3 (RGB) or 4 (RGBA), 8 bits each.
    pub num_channels: u16,
    pub pixels: Vec<u8>,
}

/// Turns an external model file into an [`ExternalScene`].
pub trait SceneDecoder: Send + Sync {
    fn decode_scene(&self, path: &Path, flags: DecodeFlags) -> Result<ExternalScene, ImportError>;
}

/// Turns an external image file into tightly packed 8 bit pixels.
pub trait ImageDecoder: Send + Sync {
    fn decode_image(&self, path: &Path) -> Result<DecodedImage, ImportError>;
}
