use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use resforge_files::ResourceType;
use uuid::Uuid;

use crate::database::DatabaseError;
use crate::database::path::{RESOURCE_PATH_CAPACITY, ResourcePath};

/// `uuid[16] | type u32 | flags u8 | reserved[3] | path_len u8 | path[95] | offset u64 | size u64`
pub const ROW_SIZE: usize = 136;

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct Row {
    pub uuid: Uuid,
    pub resource_type: ResourceType,
    pub flags: u8,
    pub path: ResourcePath,
    pub offset: u64,
    pub size: u64,
}

impl Row {
    pub fn byte_range(row_id: usize) -> std::ops::Range<usize> {
        row_id * ROW_SIZE..(row_id + 1) * ROW_SIZE
    }

    /// `None` for free (nil UUID) rows.
    pub fn decode(bytes: &[u8]) -> Result<Option<Row>, DatabaseError> {
        let mut rdr = Cursor::new(bytes);

        let mut uuid = [0u8; 16];
        rdr.read_exact(&mut uuid)?;
        let uuid = Uuid::from_bytes(uuid);
        if uuid.is_nil() {
            return Ok(None);
        }

        let resource_type = ResourceType::from(rdr.read_u32::<LittleEndian>()?);
        let flags = rdr.read_u8()?;
        let mut reserved = [0u8; 3];
        rdr.read_exact(&mut reserved)?;

        let path_len = rdr.read_u8()?;
        let mut path = [0u8; RESOURCE_PATH_CAPACITY];
        rdr.read_exact(&mut path)?;
        let path = ResourcePath::from_raw(path, path_len).ok_or_else(|| DatabaseError::CorruptTable {
            reason: format!("row of {} holds an invalid path", uuid),
        })?;

        let offset = rdr.read_u64::<LittleEndian>()?;
        let size = rdr.read_u64::<LittleEndian>()?;

        Ok(Some(Row {
            uuid,
            resource_type,
            flags,
            path,
            offset,
            size,
        }))
    }

    pub fn encode(&self, dst: &mut [u8]) -> Result<(), DatabaseError> {
        let mut wtr = Cursor::new(dst);
        let (path, path_len) = self.path.raw();

        wtr.write_all(self.uuid.as_bytes())?;
        wtr.write_u32::<LittleEndian>(self.resource_type.into())?;
        wtr.write_u8(self.flags)?;
        wtr.write_all(&[0u8; 3])?;
        wtr.write_u8(path_len)?;
        wtr.write_all(path)?;
        wtr.write_u64::<LittleEndian>(self.offset)?;
        wtr.write_u64::<LittleEndian>(self.size)?;
        Ok(())
    }
}
