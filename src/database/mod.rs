//! The resource store: a UUID keyed table of `(file, offset, size)` records over a memory mapped
//! file, plus the content files it points at.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

mod path;
mod resource_database;
mod row;

pub use path::{MAX_DIRECTORY_LEN, MAX_EXTENSION_LEN, RESOURCE_PATH_CAPACITY, ResourcePath, ResourcePathHint};
pub use resource_database::{
    GeneratedResource, RemoveResourceOutcome, ResourceDatabase, ResourceEntry, ResourceLocation, TABLE_FILE_NAME,
    VERSION_LIMIT,
};
pub use row::ROW_SIZE;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database root \"{0}\" is not an existing directory")]
    RootNotADirectory(PathBuf),

    #[error("Cannot open the database table \"{path}\"")]
    TableOpen { path: PathBuf, source: std::io::Error },

    /// Unrecoverable for this store instance.
    #[error("The database table is corrupted: {reason}")]
    CorruptTable { reason: String },

    #[error("Too many attempts to create a file in \"{directory}\" with name \"{name}\" and extension \"{extension}\"")]
    TooManyAttempts {
        directory: String,
        name: String,
        extension: String,
    },

    #[error("Resources can't be empty")]
    ZeroSize,

    #[error("Resource {0} is not in the database")]
    UuidNotFound(Uuid),

    #[error("Invalid path hint: {reason}")]
    InvalidPathHint { reason: &'static str },

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}
