use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use uuid::Uuid;

use crate::FileError;
use crate::common::reader::{Parseable, Writeable, read_span};
use crate::common::types::{PREAMBLE_SIZE, ResourceFile, ResourceType};

// preamble | layout, num_lods, pad | skeleton uuid | aabb + pad
const HEADER_SIZE: usize = PREAMBLE_SIZE + 8 + 16 + 32;
const LOD_SPAN_SIZE: usize = 24;

pub const STATIC_VERTEX_SIZE: usize = 11 * 4;
pub const SKINNED_VERTEX_SIZE: usize = STATIC_VERTEX_SIZE + 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum VertexLayout {
    Static = 0,
    Skinned = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct VertexStatic {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct VertexSkinned {
    pub base: VertexStatic,
    pub joint_ids: [u8; 4],
    /// Unorm8 weights, summing up to 255.
    pub joint_weights: [u8; 4],
}

impl Parseable<VertexStatic> for VertexStatic {
    fn parse<R: Read>(rdr: &mut R) -> Result<VertexStatic, FileError> {
        Ok(VertexStatic {
            position: <[f32; 3]>::parse(rdr)?,
            uv: <[f32; 2]>::parse(rdr)?,
            normal: <[f32; 3]>::parse(rdr)?,
            tangent: <[f32; 3]>::parse(rdr)?,
        })
    }
}

impl Writeable for VertexStatic {
    fn write<W: std::io::Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        self.position.write(wtr)?;
        self.uv.write(wtr)?;
        self.normal.write(wtr)?;
        self.tangent.write(wtr)
    }
}

impl Parseable<VertexSkinned> for VertexSkinned {
    fn parse<R: Read>(rdr: &mut R) -> Result<VertexSkinned, FileError> {
        let base = VertexStatic::parse(rdr)?;
        let mut joint_ids = [0u8; 4];
        let mut joint_weights = [0u8; 4];
        rdr.read_exact(&mut joint_ids)?;
        rdr.read_exact(&mut joint_weights)?;
        Ok(VertexSkinned {
            base,
            joint_ids,
            joint_weights,
        })
    }
}

impl Writeable for VertexSkinned {
    fn write<W: std::io::Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        self.base.write(wtr)?;
        wtr.write_all(&self.joint_ids)?;
        wtr.write_all(&self.joint_weights)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshVertices {
    Static(Vec<VertexStatic>),
    Skinned(Vec<VertexSkinned>),
}

impl MeshVertices {
    pub fn layout(&self) -> VertexLayout {
        match self {
            MeshVertices::Static(_) => VertexLayout::Static,
            MeshVertices::Skinned(_) => VertexLayout::Skinned,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MeshVertices::Static(verts) => verts.len(),
            MeshVertices::Skinned(verts) => verts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn size_bytes(&self) -> usize {
        match self {
            MeshVertices::Static(verts) => verts.len() * STATIC_VERTEX_SIZE,
            MeshVertices::Skinned(verts) => verts.len() * SKINNED_VERTEX_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshLod {
    pub vertices: MeshVertices,
    pub elements: Vec<u32>,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn from_positions<'a>(positions: impl IntoIterator<Item = &'a [f32; 3]>) -> Aabb {
        let mut iter = positions.into_iter();
        let Some(first) = iter.next() else {
            return Aabb::default();
        };

        iter.fold(
            Aabb {
                min: *first,
                max: *first,
            },
            |mut aabb, pos| {
                for axis in 0..3 {
                    aabb.min[axis] = aabb.min[axis].min(pos[axis]);
                    aabb.max[axis] = aabb.max[axis].max(pos[axis]);
                }
                aabb
            },
        )
    }
}

/// LOD 0 is the finest level. Payloads are laid out coarsest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Nil for static meshes.
    pub skeleton_uuid: Uuid,
    pub aabb: Aabb,
    pub lods: Vec<MeshLod>,
}

impl Mesh {
    pub fn layout(&self) -> Option<VertexLayout> {
        self.lods.first().map(|lod| lod.vertices.layout())
    }

    fn validate(&self) -> Result<VertexLayout, FileError> {
        let layout = self.layout().ok_or(FileError::FormatError {
            reason: "a mesh needs at least one LOD",
        })?;

        if self.lods.len() > u16::MAX as usize {
            return Err(FileError::FormatError {
                reason: "too many LODs",
            });
        }

        if self.lods.iter().any(|lod| lod.vertices.layout() != layout) {
            return Err(FileError::FormatError {
                reason: "all LODs of a mesh have to share one vertex layout",
            });
        }

        if layout == VertexLayout::Skinned && self.skeleton_uuid.is_nil() {
            return Err(FileError::FormatError {
                reason: "skinned meshes have to reference a skeleton",
            });
        }

        Ok(layout)
    }

    fn data_offset(&self) -> usize {
        HEADER_SIZE + self.lods.len() * LOD_SPAN_SIZE
    }
}

impl ResourceFile for Mesh {
    const RESOURCE_TYPE: ResourceType = ResourceType::Mesh;

    fn required_size(&self) -> usize {
        self.data_offset()
            + self
                .lods
                .iter()
                .map(|lod| lod.vertices.size_bytes() + lod.elements.len() * 4)
                .sum::<usize>()
    }

    fn write_body(&self, wtr: &mut Cursor<&mut [u8]>) -> Result<(), FileError> {
        let layout = self.validate()?;

        wtr.write_u16::<LittleEndian>(layout.into())?;
        wtr.write_u16::<LittleEndian>(self.lods.len() as u16)?;
        wtr.write_u32::<LittleEndian>(0)?;
        self.skeleton_uuid.write(wtr)?;
        self.aabb.min.write(wtr)?;
        self.aabb.max.write(wtr)?;
        wtr.write_u64::<LittleEndian>(0)?;

        // Offsets are assigned from the coarsest LOD to the finest.
        let mut offsets = vec![0u64; self.lods.len()];
        let mut cursor = self.data_offset() as u64;
        for (idx, lod) in self.lods.iter().enumerate().rev() {
            offsets[idx] = cursor;
            cursor += (lod.vertices.size_bytes() + lod.elements.len() * 4) as u64;
        }

        for (lod, offset) in self.lods.iter().zip(&offsets) {
            wtr.write_u64::<LittleEndian>(*offset)?;
            wtr.write_u32::<LittleEndian>(lod.vertices.size_bytes() as u32)?;
            wtr.write_u32::<LittleEndian>((lod.elements.len() * 4) as u32)?;
            wtr.write_u32::<LittleEndian>(lod.vertices.len() as u32)?;
            wtr.write_u32::<LittleEndian>(lod.elements.len() as u32)?;
        }

        for lod in self.lods.iter().rev() {
            match &lod.vertices {
                MeshVertices::Static(verts) => verts.iter().try_for_each(|v| v.write(wtr))?,
                MeshVertices::Skinned(verts) => verts.iter().try_for_each(|v| v.write(wtr))?,
            }

            for element in &lod.elements {
                wtr.write_u32::<LittleEndian>(*element)?;
            }
        }

        Ok(())
    }

    fn parse_body(rdr: &mut Cursor<&[u8]>) -> Result<Self, FileError> {
        let layout = VertexLayout::try_from(rdr.read_u16::<LittleEndian>()?).map_err(|_| FileError::FormatError {
            reason: "unknown vertex layout",
        })?;
        let num_lods = rdr.read_u16::<LittleEndian>()? as usize;
        let _pad = rdr.read_u32::<LittleEndian>()?;
        let skeleton_uuid = Uuid::parse(rdr)?;
        let aabb = Aabb {
            min: <[f32; 3]>::parse(rdr)?,
            max: <[f32; 3]>::parse(rdr)?,
        };
        let _pad = rdr.read_u64::<LittleEndian>()?;

        let src: &[u8] = *rdr.get_ref();
        let mut lods = Vec::with_capacity(num_lods);
        for _ in 0..num_lods {
            let offset = rdr.read_u64::<LittleEndian>()?;
            let verts_bytes = rdr.read_u32::<LittleEndian>()? as u64;
            let elems_bytes = rdr.read_u32::<LittleEndian>()? as u64;
            let num_verts = rdr.read_u32::<LittleEndian>()? as usize;
            let num_elems = rdr.read_u32::<LittleEndian>()? as usize;

            let vertex_size = match layout {
                VertexLayout::Static => STATIC_VERTEX_SIZE,
                VertexLayout::Skinned => SKINNED_VERTEX_SIZE,
            };

            if (num_verts * vertex_size) as u64 != verts_bytes || (num_elems * 4) as u64 != elems_bytes {
                return Err(FileError::FormatError {
                    reason: "LOD span sizes disagree with the element counts",
                });
            }

            let mut data = Cursor::new(read_span(src, offset, verts_bytes + elems_bytes)?);
            let vertices = match layout {
                VertexLayout::Static => MeshVertices::Static(
                    (0..num_verts)
                        .map(|_| VertexStatic::parse(&mut data))
                        .collect::<Result<_, _>>()?,
                ),
                VertexLayout::Skinned => MeshVertices::Skinned(
                    (0..num_verts)
                        .map(|_| VertexSkinned::parse(&mut data))
                        .collect::<Result<_, _>>()?,
                ),
            };

            let mut elements = vec![0u32; num_elems];
            data.read_u32_into::<LittleEndian>(&mut elements)?;
            lods.push(MeshLod { vertices, elements });
        }

        let mesh = Mesh {
            skeleton_uuid,
            aabb,
            lods,
        };
        mesh.validate()?;
        Ok(mesh)
    }
}
