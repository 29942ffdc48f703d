use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{FromPrimitive, IntoPrimitive};
use uuid::Uuid;

use crate::FileError;
use crate::common::reader::{Parseable, Writeable};

pub const PREAMBLE_MAGIC: [u8; 4] = *b"rfrg";
pub const PREAMBLE_SIZE: usize = 24;

/// Tag stored in every table row and every file preamble. Tags this build doesn't know about survive
/// in `Unknown` so rows written by newer tooling are not rejected by the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ResourceType {
    Scene = 1,
    Mesh = 2,
    Texture = 3,
    Animation = 4,
    Skeleton = 5,
    Material = 6,
    MeshDesc = 7,
    #[num_enum(catch_all)]
    Unknown(u32),
}

impl ResourceType {
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Scene => "scene",
            ResourceType::Mesh => "mesh",
            ResourceType::Texture => "texture",
            ResourceType::Animation => "animation",
            ResourceType::Skeleton => "skeleton",
            ResourceType::Material => "material",
            ResourceType::MeshDesc => "meshdesc",
            ResourceType::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Preamble {
    pub resource_type: ResourceType,
    pub self_uuid: Uuid,
}

impl Preamble {
    pub fn new(resource_type: ResourceType, self_uuid: Uuid) -> Self {
        Self {
            resource_type,
            self_uuid,
        }
    }

    pub fn expect_type(&self, expected: ResourceType) -> Result<(), FileError> {
        if self.resource_type != expected {
            return Err(FileError::WrongResourceType {
                expected: expected.into(),
                found: self.resource_type.into(),
            });
        }

        Ok(())
    }

    /// Reads just the preamble of a mapped file, without validating the body.
    pub fn peek(src: &[u8]) -> Result<Preamble, FileError> {
        Preamble::parse(&mut Cursor::new(src))
    }
}

impl Parseable<Preamble> for Preamble {
    fn parse<R: std::io::Read>(rdr: &mut R) -> Result<Preamble, FileError> {
        let mut magic = [0u8; 4];
        rdr.read_exact(&mut magic)?;
        if magic != PREAMBLE_MAGIC {
            return Err(FileError::InvalidMagicValue { magic });
        }

        let resource_type = ResourceType::from(rdr.read_u32::<LittleEndian>()?);
        let self_uuid = Uuid::parse(rdr)?;
        Ok(Preamble {
            resource_type,
            self_uuid,
        })
    }
}

impl Writeable for Preamble {
    fn write<W: std::io::Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        wtr.write_all(&PREAMBLE_MAGIC)?;
        wtr.write_u32::<LittleEndian>(self.resource_type.into())?;
        self.self_uuid.write(wtr)
    }
}

/// A binary resource layout that can be written into an exactly sized, mapped region and parsed back
/// from one.
pub trait ResourceFile: Sized {
    const RESOURCE_TYPE: ResourceType;

    /// Size of the whole file, preamble included.
    fn required_size(&self) -> usize;

    fn write_body(&self, wtr: &mut Cursor<&mut [u8]>) -> Result<(), FileError>;

    fn parse_body(rdr: &mut Cursor<&[u8]>) -> Result<Self, FileError>;

    fn write_into(&self, self_uuid: Uuid, dst: &mut [u8]) -> Result<(), FileError> {
        let expected = self.required_size();
        if dst.len() != expected {
            return Err(FileError::SizeMismatch {
                expected,
                actual: dst.len(),
            });
        }

        let mut wtr = Cursor::new(dst);
        Preamble::new(Self::RESOURCE_TYPE, self_uuid).write(&mut wtr)?;
        self.write_body(&mut wtr)?;
        Ok(())
    }

    fn parse(src: &[u8]) -> Result<(Preamble, Self), FileError> {
        let mut rdr = Cursor::new(src);
        let preamble = Preamble::parse(&mut rdr)?;
        preamble.expect_type(Self::RESOURCE_TYPE)?;
        let body = Self::parse_body(&mut rdr)?;
        Ok((preamble, body))
    }
}
