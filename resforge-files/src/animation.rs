use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::FileError;
use crate::common::reader::{Parseable, Writeable, read_span};
use crate::common::types::{PREAMBLE_SIZE, ResourceFile, ResourceType};

// preamble | num_joints, reserved, pad | duration | tps | skeleton uuid
const HEADER_SIZE: usize = PREAMBLE_SIZE + 8 + 8 + 8 + 16;
const JOINT_SPAN_SIZE: usize = 24;
const VEC3_KEY_SIZE: usize = 16;
const QUAT_KEY_SIZE: usize = 20;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Vec3Key {
    pub time: f32,
    pub value: [f32; 3],
}

/// Rotation stored as `[x, y, z, w]`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QuatKey {
    pub time: f32,
    pub value: [f32; 4],
}

impl Parseable<Vec3Key> for Vec3Key {
    fn parse<R: Read>(rdr: &mut R) -> Result<Vec3Key, FileError> {
        Ok(Vec3Key {
            time: rdr.read_f32::<LittleEndian>()?,
            value: <[f32; 3]>::parse(rdr)?,
        })
    }
}

impl Writeable for Vec3Key {
    fn write<W: std::io::Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        wtr.write_f32::<LittleEndian>(self.time)?;
        self.value.write(wtr)
    }
}

impl Parseable<QuatKey> for QuatKey {
    fn parse<R: Read>(rdr: &mut R) -> Result<QuatKey, FileError> {
        Ok(QuatKey {
            time: rdr.read_f32::<LittleEndian>()?,
            value: <[f32; 4]>::parse(rdr)?,
        })
    }
}

impl Writeable for QuatKey {
    fn write<W: std::io::Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        wtr.write_f32::<LittleEndian>(self.time)?;
        self.value.write(wtr)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct JointTrack {
    pub positions: Vec<Vec3Key>,
    pub rotations: Vec<QuatKey>,
    pub scalings: Vec<Vec3Key>,
}

impl JointTrack {
    fn size_bytes(&self) -> usize {
        (self.positions.len() + self.scalings.len()) * VEC3_KEY_SIZE + self.rotations.len() * QUAT_KEY_SIZE
    }
}

/// One track per joint of the referenced skeleton, in joint order.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub skeleton_uuid: Uuid,
    /// In seconds.
    pub duration: f64,
    pub ticks_per_second: f64,
    pub tracks: Vec<JointTrack>,
}

impl Animation {
    fn data_offset(&self) -> usize {
        HEADER_SIZE + self.tracks.len() * JOINT_SPAN_SIZE
    }
}

impl ResourceFile for Animation {
    const RESOURCE_TYPE: ResourceType = ResourceType::Animation;

    fn required_size(&self) -> usize {
        self.data_offset() + self.tracks.iter().map(JointTrack::size_bytes).sum::<usize>()
    }

    fn write_body(&self, wtr: &mut Cursor<&mut [u8]>) -> Result<(), FileError> {
        if self.skeleton_uuid.is_nil() {
            return Err(FileError::FormatError {
                reason: "animations have to reference a skeleton",
            });
        }

        if self.tracks.len() > crate::skeleton::MAX_JOINTS {
            return Err(FileError::FormatError {
                reason: "an animation can have at most 255 joint tracks",
            });
        }

        wtr.write_u16::<LittleEndian>(self.tracks.len() as u16)?;
        wtr.write_u16::<LittleEndian>(0)?; // reserved
        wtr.write_u32::<LittleEndian>(0)?;
        wtr.write_f64::<LittleEndian>(self.duration)?;
        wtr.write_f64::<LittleEndian>(self.ticks_per_second)?;
        self.skeleton_uuid.write(wtr)?;

        let mut offset = self.data_offset() as u64;
        for track in &self.tracks {
            wtr.write_u64::<LittleEndian>(offset)?;
            wtr.write_u32::<LittleEndian>(track.positions.len() as u32)?;
            wtr.write_u32::<LittleEndian>(track.rotations.len() as u32)?;
            wtr.write_u32::<LittleEndian>(track.scalings.len() as u32)?;
            wtr.write_u32::<LittleEndian>(0)?;
            offset += track.size_bytes() as u64;
        }

        for track in &self.tracks {
            track.positions.iter().try_for_each(|key| key.write(wtr))?;
            track.rotations.iter().try_for_each(|key| key.write(wtr))?;
            track.scalings.iter().try_for_each(|key| key.write(wtr))?;
        }

        Ok(())
    }

    fn parse_body(rdr: &mut Cursor<&[u8]>) -> Result<Self, FileError> {
        let num_joints = rdr.read_u16::<LittleEndian>()? as usize;
        let _reserved = rdr.read_u16::<LittleEndian>()?;
        let _pad = rdr.read_u32::<LittleEndian>()?;
        let duration = rdr.read_f64::<LittleEndian>()?;
        let ticks_per_second = rdr.read_f64::<LittleEndian>()?;
        let skeleton_uuid = Uuid::parse(rdr)?;

        let src: &[u8] = *rdr.get_ref();
        let mut tracks = Vec::with_capacity(num_joints);
        for _ in 0..num_joints {
            let offset = rdr.read_u64::<LittleEndian>()?;
            let num_pos = rdr.read_u32::<LittleEndian>()? as usize;
            let num_rot = rdr.read_u32::<LittleEndian>()? as usize;
            let num_sca = rdr.read_u32::<LittleEndian>()? as usize;
            let _pad = rdr.read_u32::<LittleEndian>()?;

            let size = (num_pos + num_sca) * VEC3_KEY_SIZE + num_rot * QUAT_KEY_SIZE;
            let mut data = Cursor::new(read_span(src, offset, size as u64)?);
            tracks.push(JointTrack {
                positions: (0..num_pos)
                    .map(|_| Vec3Key::parse(&mut data))
                    .collect::<Result<_, _>>()?,
                rotations: (0..num_rot)
                    .map(|_| QuatKey::parse(&mut data))
                    .collect::<Result<_, _>>()?,
                scalings: (0..num_sca)
                    .map(|_| Vec3Key::parse(&mut data))
                    .collect::<Result<_, _>>()?,
            });
        }

        Ok(Animation {
            skeleton_uuid,
            duration,
            ticks_per_second,
            tracks,
        })
    }
}
