use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::FileError;

pub(crate) trait Parseable<T> {
    fn parse<R: Read>(rdr: &mut R) -> Result<T, FileError>;
}

pub(crate) trait Writeable {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), FileError>;
}

impl Parseable<Uuid> for Uuid {
    fn parse<R: Read>(rdr: &mut R) -> Result<Uuid, FileError> {
        let mut bytes = [0u8; 16];
        rdr.read_exact(&mut bytes)?;
        Ok(Uuid::from_bytes(bytes))
    }
}

impl Writeable for Uuid {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        wtr.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl<const N: usize> Parseable<[f32; N]> for [f32; N] {
    fn parse<R: Read>(rdr: &mut R) -> Result<[f32; N], FileError> {
        let mut out = [0.0f32; N];
        rdr.read_f32_into::<LittleEndian>(&mut out)?;
        Ok(out)
    }
}

impl<const N: usize> Writeable for [f32; N] {
    fn write<W: Write>(&self, wtr: &mut W) -> Result<(), FileError> {
        for value in self {
            wtr.write_f32::<LittleEndian>(*value)?;
        }
        Ok(())
    }
}

/// Length-prefixed string padded to `capacity` bytes (1 length byte + payload). Overlong strings are
/// cut at the last char boundary that fits.
pub(crate) fn write_fixed_string<W: Write>(wtr: &mut W, value: &str, capacity: usize) -> Result<(), FileError> {
    let max_len = (capacity - 1).min(u8::MAX as usize);
    let mut len = value.len().min(max_len);
    while !value.is_char_boundary(len) {
        len -= 1;
    }

    wtr.write_u8(len as u8)?;
    wtr.write_all(&value.as_bytes()[..len])?;
    wtr.write_all(&vec![0u8; capacity - 1 - len])?;
    Ok(())
}

pub(crate) fn read_fixed_string<R: Read>(rdr: &mut R, capacity: usize) -> Result<String, FileError> {
    let len = rdr.read_u8()? as usize;
    let mut buf = vec![0u8; capacity - 1];
    rdr.read_exact(&mut buf)?;

    if len > buf.len() {
        return Err(FileError::FormatError {
            reason: "string length exceeds its fixed capacity",
        });
    }

    buf.truncate(len);
    Ok(String::from_utf8(buf)?)
}

/// Bounds-checked view into a span of the file.
pub fn read_span(src: &[u8], offset: u64, size: u64) -> Result<&[u8], FileError> {
    let out_of_bounds = || FileError::SpanOutOfBounds {
        offset,
        size,
        len: src.len(),
    };

    let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
    let end = start
        .checked_add(usize::try_from(size).map_err(|_| out_of_bounds())?)
        .ok_or_else(out_of_bounds)?;

    src.get(start..end).ok_or_else(out_of_bounds)
}
