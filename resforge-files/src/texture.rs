use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::FileError;
use crate::common::reader::read_span;
use crate::common::types::{PREAMBLE_SIZE, ResourceFile, ResourceType};

// preamble | num_mips, num_channels, colorspace, pad
const HEADER_SIZE: usize = PREAMBLE_SIZE + 8;
const MIP_SPEC_SIZE: usize = 24;

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum MipFormat {
    Raw = 0,
    Png = 1,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Colorspace {
    Linear = 0,
    Srgb = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureMip {
    pub width: u16,
    pub height: u16,
    pub format: MipFormat,
    pub bytes: Vec<u8>,
}

/// Mip 0 is the full resolution image. Payloads are laid out smallest mip first, so a reader streaming
/// the file front to back gets a usable low resolution image early.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub num_channels: u16,
    pub colorspace: Colorspace,
    pub mips: Vec<TextureMip>,
}

impl Texture {
    fn data_offset(&self) -> usize {
        HEADER_SIZE + self.mips.len() * MIP_SPEC_SIZE
    }

    /// Byte offset of every mip payload, indexed like `mips`.
    pub fn payload_offsets(&self) -> Vec<u64> {
        let mut offsets = vec![0u64; self.mips.len()];
        let mut cursor = self.data_offset() as u64;
        for (idx, mip) in self.mips.iter().enumerate().rev() {
            offsets[idx] = cursor;
            cursor += mip.bytes.len() as u64;
        }
        offsets
    }
}

impl ResourceFile for Texture {
    const RESOURCE_TYPE: ResourceType = ResourceType::Texture;

    fn required_size(&self) -> usize {
        self.data_offset() + self.mips.iter().map(|mip| mip.bytes.len()).sum::<usize>()
    }

    fn write_body(&self, wtr: &mut Cursor<&mut [u8]>) -> Result<(), FileError> {
        if self.mips.is_empty() || self.mips.len() > u16::MAX as usize {
            return Err(FileError::FormatError {
                reason: "a texture needs between 1 and 65535 mips",
            });
        }

        if self.mips.iter().any(|mip| mip.bytes.len() > u32::MAX as usize) {
            return Err(FileError::FormatError {
                reason: "mip payloads are limited to 4 GiB",
            });
        }

        wtr.write_u16::<LittleEndian>(self.mips.len() as u16)?;
        wtr.write_u16::<LittleEndian>(self.num_channels)?;
        wtr.write_u8(self.colorspace.into())?;
        wtr.write_all(&[0u8; 3])?;

        for (mip, offset) in self.mips.iter().zip(self.payload_offsets()) {
            wtr.write_u64::<LittleEndian>(offset)?;
            wtr.write_u32::<LittleEndian>(mip.bytes.len() as u32)?;
            wtr.write_u16::<LittleEndian>(mip.width)?;
            wtr.write_u16::<LittleEndian>(mip.height)?;
            wtr.write_u32::<LittleEndian>(mip.format.into())?;
            wtr.write_u32::<LittleEndian>(0)?;
        }

        for mip in self.mips.iter().rev() {
            wtr.write_all(&mip.bytes)?;
        }

        Ok(())
    }

    fn parse_body(rdr: &mut Cursor<&[u8]>) -> Result<Self, FileError> {
        let num_mips = rdr.read_u16::<LittleEndian>()? as usize;
        let num_channels = rdr.read_u16::<LittleEndian>()?;
        let colorspace = Colorspace::try_from(rdr.read_u8()?).map_err(|_| FileError::FormatError {
            reason: "unknown colorspace",
        })?;
        let mut pad = [0u8; 3];
        rdr.read_exact(&mut pad)?;

        let src: &[u8] = *rdr.get_ref();
        let mut mips = Vec::with_capacity(num_mips);
        for _ in 0..num_mips {
            let offset = rdr.read_u64::<LittleEndian>()?;
            let size = rdr.read_u32::<LittleEndian>()? as u64;
            let width = rdr.read_u16::<LittleEndian>()?;
            let height = rdr.read_u16::<LittleEndian>()?;
            let format = MipFormat::try_from(rdr.read_u32::<LittleEndian>()?).map_err(|_| FileError::FormatError {
                reason: "unknown mip format",
            })?;
            let _pad = rdr.read_u32::<LittleEndian>()?;

            mips.push(TextureMip {
                width,
                height,
                format,
                bytes: read_span(src, offset, size)?.to_vec(),
            });
        }

        Ok(Texture {
            num_channels,
            colorspace,
            mips,
        })
    }
}
