use std::fmt::{Debug, Display, Formatter};

use crate::database::DatabaseError;

pub const RESOURCE_PATH_CAPACITY: usize = 95;
pub const MAX_DIRECTORY_LEN: usize = 64;
pub const MAX_EXTENSION_LEN: usize = 8;
const VERSION_SUFFIX_LEN: usize = 4; // ".001"

/// Store-relative path of a content file, stored inline so it fits into a table row.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    bytes: [u8; RESOURCE_PATH_CAPACITY],
    len: u8,
}

impl ResourcePath {
    pub fn new(path: &str) -> Option<ResourcePath> {
        if path.len() > RESOURCE_PATH_CAPACITY {
            return None;
        }

        let mut bytes = [0u8; RESOURCE_PATH_CAPACITY];
        bytes[..path.len()].copy_from_slice(path.as_bytes());
        Some(ResourcePath {
            bytes,
            len: path.len() as u8,
        })
    }

    pub(crate) fn from_raw(bytes: [u8; RESOURCE_PATH_CAPACITY], len: u8) -> Option<ResourcePath> {
        let len_usize = len as usize;
        if len_usize > RESOURCE_PATH_CAPACITY || std::str::from_utf8(&bytes[..len_usize]).is_err() {
            return None;
        }
        Some(ResourcePath { bytes, len })
    }

    pub(crate) fn raw(&self) -> (&[u8; RESOURCE_PATH_CAPACITY], u8) {
        (&self.bytes, self.len)
    }

    pub fn as_str(&self) -> &str {
        // Only ever constructed from valid UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Debug for ResourcePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourcePath({:?})", self.as_str())
    }
}

/// Where a new resource would like to live: `<directory>/<name>[.NNN].<extension>`.
#[derive(Debug, Clone, Default)]
pub struct ResourcePathHint {
    pub directory: String,
    pub name: String,
    /// Without the leading dot.
    pub extension: String,
}

impl ResourcePathHint {
    pub fn new(directory: impl Into<String>, name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            name: name.into(),
            extension: extension.into(),
        }
    }

    /// Builds the candidate path for `version`; version 0 gets no suffix. Names are truncated (on a
    /// char boundary) so the whole path fits into a row, directory and extension never are.
    pub fn to_path(&self, version: usize) -> Result<ResourcePath, DatabaseError> {
        if self.directory.len() > MAX_DIRECTORY_LEN {
            return Err(DatabaseError::InvalidPathHint {
                reason: "directory is longer than 64 bytes",
            });
        }

        if self.extension.len() > MAX_EXTENSION_LEN {
            return Err(DatabaseError::InvalidPathHint {
                reason: "extension is longer than 8 bytes",
            });
        }

        if self.extension.starts_with('.') {
            return Err(DatabaseError::InvalidPathHint {
                reason: "extension must not start with a dot",
            });
        }

        if version >= 1000 {
            return Err(DatabaseError::InvalidPathHint {
                reason: "version suffix is limited to three digits",
            });
        }

        let name = if self.name.is_empty() {
            "Unnamed"
        } else {
            self.name.as_str()
        };
        let version_len = if version != 0 { VERSION_SUFFIX_LEN } else { 0 };

        // 2 extra bytes for "/" and ".".
        let taken_len = 2 + self.directory.len() + version_len + self.extension.len();
        let mut name_len = name.len().min(RESOURCE_PATH_CAPACITY - taken_len);
        while !name.is_char_boundary(name_len) {
            name_len -= 1;
        }

        let mut path = String::with_capacity(RESOURCE_PATH_CAPACITY);
        path.push_str(&self.directory);
        path.push('/');
        path.push_str(&name[..name_len]);
        if version != 0 {
            path.push_str(&format!(".{:03}", version));
        }
        path.push('.');
        path.push_str(&self.extension);

        ResourcePath::new(&path).ok_or(DatabaseError::InvalidPathHint {
            reason: "resulting path does not fit",
        })
    }
}
