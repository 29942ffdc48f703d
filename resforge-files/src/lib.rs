use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("The file's magic value does not match the expectation {magic:?}")]
    InvalidMagicValue { magic: [u8; 4] },

    #[error("Expected a resource of type {expected}, found type tag {found}")]
    WrongResourceType { expected: u32, found: u32 },

    #[error("The file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    #[error("Span at {offset} with {size} bytes exceeds the file length of {len} bytes")]
    SpanOutOfBounds { offset: u64, size: u64, len: usize },

    /// The mapped region handed to a writer does not match `required_size()`.
    #[error("Destination region is {actual} bytes, but {expected} bytes are required")]
    SizeMismatch { expected: usize, actual: usize },

    /// Represents all other cases of `std::io::Error`.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UTF8ConversationError(#[from] std::string::FromUtf8Error),
}

pub mod animation;
pub mod common;
pub mod mesh;
pub mod skeleton;
pub mod texture;

pub use common::types::{PREAMBLE_SIZE, Preamble, ResourceFile, ResourceType};

#[cfg(test)]
mod tests;
