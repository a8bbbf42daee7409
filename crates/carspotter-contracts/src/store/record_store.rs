use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use tempfile::NamedTempFile;

use crate::error::{StoreError, StoreResult};
use crate::records::VehicleRecord;

pub const METADATA_FILE: &str = "metadata.json";

/// Image key to record, oldest insertion first.
pub type RecordMap = IndexMap<String, VehicleRecord>;

/// Whole-document JSON store keyed by image file name.
///
/// Every call re-reads the backing file; nothing is cached between calls.
/// `put` and `prune` are read-modify-write over the full document without any
/// locking: two writers racing on the same file lose the earlier update.
/// Deployments with more than one writer must serialize these calls externally
/// (an advisory file lock or a transactional backend).
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    image_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PruneOutcome {
    pub records: RecordMap,
    pub removed: Vec<String>,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>, image_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            image_dir: image_dir.into(),
        }
    }

    /// Store whose metadata file and images share one collection directory.
    pub fn in_collection(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self::new(dir.join(METADATA_FILE), dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn image_path(&self, key: &str) -> PathBuf {
        self.image_dir.join(key)
    }

    pub fn load(&self) -> StoreResult<RecordMap> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("initializing empty record store at {}", self.path.display());
                let empty = RecordMap::new();
                self.save(&empty)?;
                return Ok(empty);
            }
            Err(err) => return Err(StoreError::io(&self.path, err)),
        };
        serde_json::from_slice::<RecordMap>(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the whole document; readers see either the old or the new file.
    pub fn save(&self, records: &RecordMap) -> StoreResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;

        let encoded = serde_json::to_string_pretty(records)?;
        let mut staged = NamedTempFile::new_in(parent).map_err(|err| StoreError::io(parent, err))?;
        staged
            .write_all(encoded.as_bytes())
            .map_err(|err| StoreError::io(staged.path(), err))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|err| StoreError::io(staged.path(), err))?;
        staged
            .persist(&self.path)
            .map_err(|err| StoreError::io(&self.path, err.error))?;
        Ok(())
    }

    /// Inserts or overwrites `key`; the entry becomes the most recent one.
    pub fn put(&self, key: &str, record: VehicleRecord) -> StoreResult<()> {
        let mut records = self.load()?;
        records.shift_remove(key);
        records.insert(key.to_string(), record);
        self.save(&records)
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<VehicleRecord>> {
        Ok(self.load()?.shift_remove(key))
    }

    /// Drops entries whose image file is gone, rewriting the store only when
    /// something was removed.
    pub fn prune(&self) -> StoreResult<PruneOutcome> {
        let mut records = self.load()?;
        let removed = records
            .keys()
            .filter(|key| !self.image_path(key).exists())
            .cloned()
            .collect::<Vec<String>>();
        if removed.is_empty() {
            return Ok(PruneOutcome { records, removed });
        }

        for key in &removed {
            records.shift_remove(key);
        }
        warn!(
            "pruning {} record(s) with missing images from {}",
            removed.len(),
            self.path.display()
        );
        self.save(&records)?;
        Ok(PruneOutcome { records, removed })
    }
}

/// Presentation order: most recent insertion first.
pub fn newest_first(records: &RecordMap) -> impl Iterator<Item = (&String, &VehicleRecord)> {
    records.iter().rev()
}
