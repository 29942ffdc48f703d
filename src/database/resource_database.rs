use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock, RwLockWriteGuard};

use log::{debug, info, trace, warn};
use memmap2::{Mmap, MmapMut, MmapOptions};
use resforge_files::ResourceType;
use uuid::Uuid;

use crate::async_core::ThreadsafeQueue;
use crate::database::DatabaseError;
use crate::database::path::{ResourcePath, ResourcePathHint};
use crate::database::row::{ROW_SIZE, Row};

pub const TABLE_FILE_NAME: &str = "resources.rdb";

/// How many version suffixes `generate_resource` tries before giving up on a path hint.
pub const VERSION_LIMIT: usize = 1000;

const GROWTH_FACTOR: f64 = 1.3;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResourceLocation {
    /// Relative to the database root.
    pub file: ResourcePath,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ResourceEntry {
    pub uuid: Uuid,
    pub resource_type: ResourceType,
    pub location: ResourceLocation,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RemoveResourceOutcome {
    Success,
    /// The record is gone, but other records still point at the file.
    FileKept,
    /// The record is gone, but its file was already missing.
    FileNotFound,
    UuidNotFound,
}

/// A freshly committed resource whose content file is mapped for writing. The creator owns the
/// mapping exclusively until it calls [`GeneratedResource::finish`].
pub struct GeneratedResource {
    pub uuid: Uuid,
    pub path: ResourcePath,
    pub mregion: MmapMut,
}

impl GeneratedResource {
    /// Flushes the written bytes to disk and releases the mapping.
    pub fn finish(self) -> Result<Uuid, DatabaseError> {
        self.mregion.flush()?;
        Ok(self.uuid)
    }
}

struct UnlinkResult {
    real_path: PathBuf,
    remaining_path_uses: usize,
}

struct TableState {
    file: File,
    /// `None` while the table file is empty, zero sized files can't be mapped.
    mapping: Option<MmapMut>,
    num_rows: usize,
    index: HashMap<Uuid, usize>,
    empty_rows: BTreeSet<usize>,
    path_uses: HashMap<ResourcePath, usize>,
}

impl TableState {
    fn row(&self, row_id: usize) -> Result<Option<Row>, DatabaseError> {
        match &self.mapping {
            Some(mapping) => Row::decode(&mapping[Row::byte_range(row_id)]),
            None => Ok(None),
        }
    }

    fn write_row(&mut self, row_id: usize, row: Option<&Row>) -> Result<(), DatabaseError> {
        let mapping = self.mapping.as_mut().ok_or_else(|| DatabaseError::CorruptTable {
            reason: format!("row {} written before the table was mapped", row_id),
        })?;

        let range = Row::byte_range(row_id);
        match row {
            Some(row) => row.encode(&mut mapping[range.clone()])?,
            None => mapping[range.clone()].fill(0),
        }
        mapping.flush_range(range.start, ROW_SIZE)?;
        Ok(())
    }

    fn location_of(&self, uuid: &Uuid) -> Result<Option<Row>, DatabaseError> {
        match self.index.get(uuid) {
            Some(&row_id) => self.row(row_id),
            None => Ok(None),
        }
    }

    fn grow_file(&mut self, desired_num_rows: usize) -> Result<(), DatabaseError> {
        if desired_num_rows <= self.num_rows {
            return Ok(());
        }

        let old_num_rows = self.num_rows;
        if let Some(mapping) = &self.mapping {
            mapping.flush()?;
        }

        // The old mapping keeps serving the committed rows until the new one exists.
        self.file.set_len((desired_num_rows * ROW_SIZE) as u64)?;
        self.file.sync_all()?;

        // SAFETY: the table file is only accessed through this mapping, and the mapping is only
        // replaced or written while the state's write lock is held.
        let mapping = unsafe { MmapMut::map_mut(&self.file)? };
        self.mapping = Some(mapping);
        self.num_rows = desired_num_rows;
        self.empty_rows.extend(old_num_rows..desired_num_rows);

        info!("Grew the resource table from {} to {} rows", old_num_rows, desired_num_rows);
        Ok(())
    }

    fn new_entry(&mut self, row: Row) -> Result<(), DatabaseError> {
        if self.empty_rows.is_empty() {
            // Plus one, so an empty table grows as well.
            let desired_num_rows = 1 + (self.num_rows as f64 * GROWTH_FACTOR) as usize;
            self.grow_file(desired_num_rows)?;
        }

        // Fill gaps from the front to keep the table compact.
        let row_id = self.empty_rows.pop_first().ok_or_else(|| DatabaseError::CorruptTable {
            reason: "no free row after growing the table".to_string(),
        })?;

        if let Err(err) = self.write_row(row_id, Some(&row)) {
            self.empty_rows.insert(row_id);
            return Err(err);
        }

        self.index.insert(row.uuid, row_id);
        *self.path_uses.entry(row.path).or_insert(0) += 1;
        Ok(())
    }

    fn unlink(&mut self, root: &Path, uuid: &Uuid) -> Result<Option<UnlinkResult>, DatabaseError> {
        let Some(&row_id) = self.index.get(uuid) else {
            return Ok(None);
        };

        let row = self.row(row_id)?.ok_or_else(|| DatabaseError::CorruptTable {
            reason: format!("indexed row {} of {} is empty", row_id, uuid),
        })?;

        self.write_row(row_id, None)?;
        self.index.remove(uuid);
        self.empty_rows.insert(row_id);

        let remaining_path_uses = match self.path_uses.get_mut(&row.path) {
            Some(uses) if *uses > 1 => {
                *uses -= 1;
                *uses
            }
            _ => {
                self.path_uses.remove(&row.path);
                0
            }
        };

        Ok(Some(UnlinkResult {
            real_path: root.join(row.path.as_str()),
            remaining_path_uses,
        }))
    }

    fn remove(&mut self, root: &Path, uuid: &Uuid) -> Result<RemoveResourceOutcome, DatabaseError> {
        let Some(unlinked) = self.unlink(root, uuid)? else {
            return Ok(RemoveResourceOutcome::UuidNotFound);
        };

        if unlinked.remaining_path_uses != 0 {
            return Ok(RemoveResourceOutcome::FileKept);
        }

        match std::fs::remove_file(&unlinked.real_path) {
            Ok(()) => Ok(RemoveResourceOutcome::Success),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RemoveResourceOutcome::FileNotFound),
            Err(err) => Err(err.into()),
        }
    }
}

/// Durable UUID -> location store. Lookups may happen from any thread, mutations are meant to be
/// driven from the owner thread (the one that also calls [`ResourceDatabase::update`]).
pub struct ResourceDatabase {
    root: PathBuf,
    table_path: PathBuf,
    state: RwLock<TableState>,
    state_version: AtomicU64,
    remove_queue: ThreadsafeQueue<Uuid>,
    /// Removals taken off the queue that still wait for the write lock.
    remove_list: Mutex<Vec<Uuid>>,
}

impl ResourceDatabase {
    /// Opens (or creates) the table inside `root` and rebuilds the in-memory index from it.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|_| DatabaseError::RootNotADirectory(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(DatabaseError::RootNotADirectory(root));
        }

        let table_path = root.join(TABLE_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&table_path)
            .map_err(|source| DatabaseError::TableOpen {
                path: table_path.clone(),
                source,
            })?;

        let file_size = file.metadata()?.len() as usize;
        if file_size % ROW_SIZE != 0 {
            return Err(DatabaseError::CorruptTable {
                reason: format!("table size {} is not a multiple of the row size {}", file_size, ROW_SIZE),
            });
        }

        let mut state = TableState {
            file,
            mapping: None,
            num_rows: file_size / ROW_SIZE,
            index: HashMap::new(),
            empty_rows: BTreeSet::new(),
            path_uses: HashMap::new(),
        };

        if file_size != 0 {
            // SAFETY: see TableState::grow_file, the mapping is owned by the state.
            state.mapping = Some(unsafe { MmapMut::map_mut(&state.file)? });

            for row_id in 0..state.num_rows {
                let Some(row) = state.row(row_id)? else {
                    state.empty_rows.insert(row_id);
                    continue;
                };

                if state.index.insert(row.uuid, row_id).is_some() {
                    return Err(DatabaseError::CorruptTable {
                        reason: format!("duplicate UUID {} in row {}", row.uuid, row_id),
                    });
                }
                *state.path_uses.entry(row.path).or_insert(0) += 1;
            }
        }

        info!(
            "Opened resource database at {} with {} resources ({} free rows)",
            root.display(),
            state.index.len(),
            state.empty_rows.len()
        );

        Ok(Self {
            root,
            table_path,
            state: RwLock::new(state),
            state_version: AtomicU64::new(0),
            remove_queue: ThreadsafeQueue::new(),
            remove_list: Mutex::new(Vec::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    /// Absolute location of a store-relative resource path.
    pub fn resolve_path(&self, path: &ResourcePath) -> PathBuf {
        self.root.join(path.as_str())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TableState> {
        self.state.write().expect("Resource table write lock")
    }

    fn bump_version(&self) {
        self.state_version.fetch_add(1, Ordering::AcqRel);
    }

    /// Incremented by every table mutation.
    pub fn state_version(&self) -> u64 {
        self.state_version.load(Ordering::Acquire)
    }

    pub fn num_entries(&self) -> usize {
        self.state.read().expect("Resource table read lock").index.len()
    }

    /// Number of rows in the table file, free ones included.
    pub fn table_capacity(&self) -> usize {
        self.state.read().expect("Resource table read lock").num_rows
    }

    pub fn locate(&self, uuid: &Uuid) -> Result<Option<ResourceLocation>, DatabaseError> {
        let state = self.state.read().expect("Resource table read lock");
        Ok(state.location_of(uuid)?.map(|row| ResourceLocation {
            file: row.path,
            offset: row.offset,
            size: row.size,
        }))
    }

    pub fn type_of(&self, uuid: &Uuid) -> Result<Option<ResourceType>, DatabaseError> {
        if uuid.is_nil() {
            return Ok(None);
        }

        let state = self.state.read().expect("Resource table read lock");
        Ok(state.location_of(uuid)?.map(|row| row.resource_type))
    }

    /// Visits the committed rows in table order.
    pub fn for_each_row<F: FnMut(&ResourceEntry)>(&self, mut f: F) -> Result<(), DatabaseError> {
        let state = self.state.read().expect("Resource table read lock");
        for row_id in 0..state.num_rows {
            if let Some(row) = state.row(row_id)? {
                f(&ResourceEntry {
                    uuid: row.uuid,
                    resource_type: row.resource_type,
                    location: ResourceLocation {
                        file: row.path,
                        offset: row.offset,
                        size: row.size,
                    },
                });
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<ResourceEntry>, DatabaseError> {
        let mut entries = Vec::new();
        self.for_each_row(|entry| entries.push(*entry))?;
        Ok(entries)
    }

    /// Creates a new content file of `size` bytes, derived from `hint`, maps it for writing and commits
    /// a row for it under a fresh UUID. Existing files are never overwritten: on collision the next
    /// version suffix is tried, up to [`VERSION_LIMIT`] times.
    pub fn generate_resource(
        &self,
        resource_type: ResourceType,
        hint: &ResourcePathHint,
        size: usize,
    ) -> Result<GeneratedResource, DatabaseError> {
        if size == 0 {
            return Err(DatabaseError::ZeroSize);
        }

        let mut state = self.write_state();

        let uuid = loop {
            let candidate = Uuid::new_v4();
            if !state.index.contains_key(&candidate) {
                break candidate;
            }
        };

        let mut created = None;
        for version in 0..VERSION_LIMIT {
            let path = hint.to_path(version)?;
            if state.path_uses.contains_key(&path) {
                debug!("Path \"{}\" is already in the database table. Retrying.", path);
                continue;
            }

            let full_path = self.root.join(path.as_str());
            if let Some(parent) = full_path.parent() {
                if let Err(err) = std::fs::create_dir_all(parent) {
                    info!("Failed to create directory \"{}\": {}. Retrying.", parent.display(), err);
                    continue;
                }
            }

            match create_mapped_file(&full_path, size) {
                Ok(mregion) => {
                    created = Some((path, mregion));
                    break;
                }
                Err(reason) => info!("{} \"{}\". Retrying.", reason, full_path.display()),
            }
        }

        let Some((path, mregion)) = created else {
            return Err(DatabaseError::TooManyAttempts {
                directory: hint.directory.clone(),
                name: hint.name.clone(),
                extension: hint.extension.clone(),
            });
        };

        let row = Row {
            uuid,
            resource_type,
            flags: 0,
            path,
            offset: 0,
            size: size as u64,
        };

        if let Err(err) = state.new_entry(row) {
            drop(mregion);
            if let Err(remove_err) = std::fs::remove_file(self.root.join(path.as_str())) {
                warn!("Failed to clean up \"{}\": {}", path, remove_err);
            }
            return Err(err);
        }

        self.bump_version();
        trace!("Generated {} resource {} at \"{}\"", resource_type.name(), uuid, path);

        Ok(GeneratedResource { uuid, path, mregion })
    }

    /// Commits a new UUID pointing at the exact bytes of `existing`, sharing its content file.
    pub fn generate_alias(&self, resource_type: ResourceType, existing: &Uuid) -> Result<Uuid, DatabaseError> {
        let mut state = self.write_state();
        let target = state
            .location_of(existing)?
            .ok_or(DatabaseError::UuidNotFound(*existing))?;

        let uuid = loop {
            let candidate = Uuid::new_v4();
            if !state.index.contains_key(&candidate) {
                break candidate;
            }
        };

        state.new_entry(Row {
            uuid,
            resource_type,
            ..target
        })?;
        self.bump_version();
        Ok(uuid)
    }

    /// Read-only mapping of a committed resource's bytes, `None` if the UUID is unknown.
    pub fn try_map_resource(&self, uuid: &Uuid) -> Result<Option<Mmap>, DatabaseError> {
        let Some(location) = self.locate(uuid)? else {
            return Ok(None);
        };

        let file = File::open(self.resolve_path(&location.file))?;
        // SAFETY: committed content files are only written by their creator before commit; they are
        // read-only afterwards.
        let mapping = unsafe {
            MmapOptions::new()
                .offset(location.offset)
                .len(location.size as usize)
                .map(&file)?
        };
        Ok(Some(mapping))
    }

    pub fn map_resource(&self, uuid: &Uuid) -> Result<Mmap, DatabaseError> {
        self.try_map_resource(uuid)?.ok_or(DatabaseError::UuidNotFound(*uuid))
    }

    /// Removes the record only, the content file stays on disk.
    pub fn try_unlink_record(&self, uuid: &Uuid) -> Result<bool, DatabaseError> {
        let unlinked = self.write_state().unlink(&self.root, uuid)?;
        if unlinked.is_some() {
            self.bump_version();
        }
        Ok(unlinked.is_some())
    }

    /// Removes the record and, if no other record uses the same file, the file.
    pub fn try_remove_resource(&self, uuid: &Uuid) -> Result<RemoveResourceOutcome, DatabaseError> {
        let outcome = self.write_state().remove(&self.root, uuid)?;
        if outcome != RemoveResourceOutcome::UuidNotFound {
            self.bump_version();
        }
        Ok(outcome)
    }

    /// Thread safe. The removal happens during a later [`Self::update`].
    pub fn remove_resource_later(&self, uuid: Uuid) {
        self.remove_queue.push(uuid);
    }

    /// Drains the deferred removal queue. Returns how many removals were processed; if the table is
    /// busy they stay queued for the next call.
    pub fn update(&self) -> usize {
        let mut remove_list = self.remove_list.lock().expect("Remove list lock");
        while let Some(uuid) = self.remove_queue.try_lock_and_try_pop() {
            remove_list.push(uuid);
        }

        if remove_list.is_empty() {
            return 0;
        }

        let Ok(mut state) = self.state.try_write() else {
            return 0;
        };

        let processed = remove_list.len();
        for uuid in remove_list.drain(..) {
            match state.remove(&self.root, &uuid) {
                Ok(outcome) => {
                    if outcome != RemoveResourceOutcome::UuidNotFound {
                        self.bump_version();
                    }
                    debug!("Deferred removal of {}: {:?}", uuid, outcome);
                }
                Err(err) => warn!("Deferred removal of {} failed: {}", uuid, err),
            }
        }
        processed
    }
}

/// Exclusively creates `path`, sizes it and maps it. Any failure removes what was created and is
/// reported as a retry reason.
fn create_mapped_file(path: &Path, size: usize) -> Result<MmapMut, &'static str> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|_| "Could not create in exclusive mode")?;

    let cleanup = |reason: &'static str| {
        let _ = std::fs::remove_file(path);
        reason
    };

    file.set_len(size as u64).map_err(|_| cleanup("Could not resize"))?;

    // SAFETY: the file was just created by us with create_new, nobody else holds a mapping of it.
    let mregion = unsafe { MmapMut::map_mut(&file) }.map_err(|_| cleanup("Could not map"))?;
    if mregion.len() != size {
        drop(mregion);
        return Err(cleanup("Mapped file has an unexpected size"));
    }

    Ok(mregion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    fn hint(name: &str) -> ResourcePathHint {
        ResourcePathHint::new("meshes", name, "jmesh")
    }

    #[test]
    pub fn locate_right_after_generate() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;

        let mut generated = db.generate_resource(ResourceType::Mesh, &hint("Cube"), 300)?;
        generated.mregion[..4].copy_from_slice(b"rfrg");
        let uuid = generated.finish()?;

        let location = db.locate(&uuid)?.expect("generated resources can be located");
        assert_eq!(location.size, 300);
        assert_eq!(location.offset, 0);
        assert_eq!(location.file.as_str(), "meshes/Cube.jmesh");
        assert_eq!(db.type_of(&uuid)?, Some(ResourceType::Mesh));
        assert_eq!(&db.map_resource(&uuid)?[..4], b"rfrg");
        Ok(())
    }

    #[test]
    pub fn name_collisions_get_version_suffixes() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;

        // A stray file the table doesn't know about has to be skipped, not overwritten.
        std::fs::create_dir_all(root.path().join("meshes"))?;
        std::fs::write(root.path().join("meshes/Cube.001.jmesh"), b"foreign")?;

        let first = db.generate_resource(ResourceType::Mesh, &hint("Cube"), 8)?;
        let second = db.generate_resource(ResourceType::Mesh, &hint("Cube"), 8)?;

        assert_eq!(first.path.as_str(), "meshes/Cube.jmesh");
        assert_eq!(second.path.as_str(), "meshes/Cube.002.jmesh");
        assert_eq!(std::fs::read(root.path().join("meshes/Cube.001.jmesh"))?, b"foreign");
        Ok(())
    }

    #[test]
    pub fn concurrent_generation_never_shares_uuids_or_paths() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = Arc::new(ResourceDatabase::open(root.path())?);

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                thread::spawn(move || -> Result<Vec<(Uuid, String)>, DatabaseError> {
                    (0..16)
                        .map(|_| {
                            let generated = db.generate_resource(ResourceType::Texture, &hint("Shared"), 16)?;
                            let path = generated.path.to_string();
                            Ok((generated.finish()?, path))
                        })
                        .collect()
                })
            })
            .collect();

        let mut uuids = HashSet::new();
        let mut paths = HashSet::new();
        for worker in workers {
            for (uuid, path) in worker.join().expect("generator thread")? {
                assert!(uuids.insert(uuid));
                assert!(paths.insert(path));
            }
        }

        assert_eq!(uuids.len(), 128);
        assert_eq!(db.num_entries(), 128);
        Ok(())
    }

    #[test]
    pub fn zero_sized_resources_are_rejected() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;
        assert!(matches!(
            db.generate_resource(ResourceType::Mesh, &hint("Empty"), 0),
            Err(DatabaseError::ZeroSize)
        ));
        Ok(())
    }

    #[test]
    pub fn removing_aliases_counts_path_uses() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;

        let original = db.generate_resource(ResourceType::Mesh, &hint("Packed"), 64)?.finish()?;
        let alias = db.generate_alias(ResourceType::MeshDesc, &original)?;
        let file = db.resolve_path(&db.locate(&alias)?.expect("alias is located").file);

        assert_eq!(db.try_remove_resource(&original)?, RemoveResourceOutcome::FileKept);
        assert!(file.exists());
        assert_eq!(db.locate(&original)?, None);

        assert_eq!(db.try_remove_resource(&alias)?, RemoveResourceOutcome::Success);
        assert!(!file.exists());
        assert_eq!(db.try_remove_resource(&alias)?, RemoveResourceOutcome::UuidNotFound);
        Ok(())
    }

    #[test]
    pub fn unlinking_keeps_the_file_and_frees_the_row() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;

        let first = db.generate_resource(ResourceType::Mesh, &hint("A"), 4)?.finish()?;
        let _second = db.generate_resource(ResourceType::Mesh, &hint("B"), 4)?.finish()?;
        let capacity = db.table_capacity();

        let version = db.state_version();
        assert!(db.try_unlink_record(&first)?);
        assert!(db.state_version() > version);
        assert!(!db.try_unlink_record(&first)?);
        assert!(root.path().join("meshes/A.jmesh").exists());

        // The freed (lowest) row is reused instead of growing the table.
        let third = db.generate_resource(ResourceType::Mesh, &hint("C"), 4)?.finish()?;
        assert_eq!(db.table_capacity(), capacity);
        assert_eq!(db.entries()?.first().map(|entry| entry.uuid), Some(third));
        Ok(())
    }

    #[test]
    pub fn growth_keeps_rows_locatable() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;
        assert_eq!(db.table_capacity(), 0);

        let mut generated = Vec::new();
        for idx in 0..40 {
            let size = 10 + idx;
            let uuid = db
                .generate_resource(ResourceType::Animation, &hint(&format!("Anim{}", idx)), size)?
                .finish()?;
            generated.push((uuid, size as u64));
        }

        assert!(db.table_capacity() >= 40);
        for (uuid, size) in &generated {
            assert_eq!(db.locate(uuid)?.map(|location| location.size), Some(*size));
        }
        Ok(())
    }

    #[test]
    pub fn table_survives_reopening() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let (kept, removed) = {
            let db = ResourceDatabase::open(root.path())?;
            let kept = db.generate_resource(ResourceType::Skeleton, &hint("Kept"), 32)?.finish()?;
            let removed = db.generate_resource(ResourceType::Skeleton, &hint("Removed"), 32)?.finish()?;
            db.remove_resource_later(removed);
            assert_eq!(db.update(), 1);
            (kept, removed)
        };

        let db = ResourceDatabase::open(root.path())?;
        assert_eq!(db.num_entries(), 1);
        assert_eq!(db.type_of(&kept)?, Some(ResourceType::Skeleton));
        assert_eq!(db.locate(&removed)?, None);
        assert!(!root.path().join("meshes/Removed.jmesh").exists());
        Ok(())
    }

    #[test]
    pub fn duplicate_uuids_are_fatal() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        {
            let db = ResourceDatabase::open(root.path())?;
            db.generate_resource(ResourceType::Mesh, &hint("One"), 4)?.finish()?;
        }

        // Duplicate the only row.
        let table_path = root.path().join(TABLE_FILE_NAME);
        let row = std::fs::read(&table_path)?;
        std::fs::write(&table_path, [row.clone(), row].concat())?;

        assert!(matches!(
            ResourceDatabase::open(root.path()),
            Err(DatabaseError::CorruptTable { .. })
        ));
        Ok(())
    }

    #[test]
    pub fn failed_growth_keeps_committed_rows() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;
        let committed = db.generate_resource(ResourceType::Mesh, &hint("Committed"), 8)?.finish()?;
        assert_eq!(db.table_capacity(), 1);

        // A read-only handle can't be resized, so the next growth fails.
        db.write_state().file = File::open(db.table_path())?;
        assert!(db.generate_resource(ResourceType::Mesh, &hint("Overflow"), 8).is_err());

        assert_eq!(db.table_capacity(), 1);
        assert_eq!(db.locate(&committed)?.map(|location| location.size), Some(8));
        assert_eq!(db.type_of(&committed)?, Some(ResourceType::Mesh));
        assert_eq!(db.entries()?.len(), 1);
        assert!(!root.path().join("meshes/Overflow.jmesh").exists());
        Ok(())
    }

    #[test]
    pub fn unusable_directories_exhaust_the_attempts() -> Result<(), anyhow::Error> {
        let root = tempfile::tempdir()?;
        let db = ResourceDatabase::open(root.path())?;

        // A plain file where the directory should be.
        std::fs::write(root.path().join("blocked"), b"")?;
        let hint = ResourcePathHint::new("blocked", "Cube", "jmesh");
        assert!(matches!(
            db.generate_resource(ResourceType::Mesh, &hint, 8),
            Err(DatabaseError::TooManyAttempts { .. })
        ));
        assert_eq!(db.num_entries(), 0);
        Ok(())
    }

    #[test]
    pub fn missing_root_is_rejected() {
        assert!(matches!(
            ResourceDatabase::open("/definitely/not/an/existing/root"),
            Err(DatabaseError::RootNotADirectory(_))
        ));
    }
}
