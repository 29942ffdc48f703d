use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::FileError;
use crate::common::reader::{Parseable, Writeable, read_fixed_string, write_fixed_string};
use crate::common::types::{PREAMBLE_SIZE, ResourceFile, ResourceType};

/// Joint ids are stored as u8 in skinned vertices.
pub const MAX_JOINTS: usize = 255;
pub const NO_PARENT: u32 = u32::MAX;

const HEADER_SIZE: usize = PREAMBLE_SIZE + 8;
const JOINT_SIZE: usize = 16 * 4 + 4;
const NAME_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonJoint {
    pub name: String,
    /// Column-major inverse bind matrix.
    pub inv_bind: [f32; 16],
    /// Index of the parent joint, always smaller than the joint's own index, or [`NO_PARENT`].
    pub parent: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skeleton {
    pub joints: Vec<SkeletonJoint>,
}

impl Skeleton {
    fn validate(&self) -> Result<(), FileError> {
        if self.joints.is_empty() {
            return Err(FileError::FormatError {
                reason: "a skeleton needs at least one joint",
            });
        }

        if self.joints.len() > MAX_JOINTS {
            return Err(FileError::FormatError {
                reason: "a skeleton can have at most 255 joints",
            });
        }

        let parents_precede = self
            .joints
            .iter()
            .enumerate()
            .all(|(idx, joint)| joint.parent == NO_PARENT || (joint.parent as usize) < idx);

        if !parents_precede {
            return Err(FileError::FormatError {
                reason: "joints have to be stored in preorder (parents before children)",
            });
        }

        Ok(())
    }
}

impl ResourceFile for Skeleton {
    const RESOURCE_TYPE: ResourceType = ResourceType::Skeleton;

    fn required_size(&self) -> usize {
        HEADER_SIZE + self.joints.len() * (JOINT_SIZE + NAME_SIZE)
    }

    fn write_body(&self, wtr: &mut Cursor<&mut [u8]>) -> Result<(), FileError> {
        self.validate()?;

        wtr.write_u16::<LittleEndian>(0)?; // reserved
        wtr.write_u16::<LittleEndian>(self.joints.len() as u16)?;
        wtr.write_u32::<LittleEndian>(0)?;

        for joint in &self.joints {
            joint.inv_bind.write(wtr)?;
            wtr.write_u32::<LittleEndian>(joint.parent)?;
        }

        for joint in &self.joints {
            write_fixed_string(wtr, &joint.name, NAME_SIZE)?;
        }

        Ok(())
    }

    fn parse_body(rdr: &mut Cursor<&[u8]>) -> Result<Self, FileError> {
        let _reserved = rdr.read_u16::<LittleEndian>()?;
        let num_joints = rdr.read_u16::<LittleEndian>()? as usize;
        let _pad = rdr.read_u32::<LittleEndian>()?;

        let mut joints = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            let inv_bind = <[f32; 16]>::parse(rdr)?;
            let parent = rdr.read_u32::<LittleEndian>()?;
            joints.push(SkeletonJoint {
                name: String::new(),
                inv_bind,
                parent,
            });
        }

        for joint in joints.iter_mut() {
            joint.name = read_fixed_string(rdr, NAME_SIZE)?;
        }

        let skeleton = Skeleton { joints };
        skeleton.validate()?;
        Ok(skeleton)
    }
}
