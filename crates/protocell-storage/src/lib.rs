//! Directory-backed snapshot persistence for protocell worlds.
//!
//! Auto-saves land in a single saves directory as
//! `simulation_state_<identity>_<tick>.json`; recovery looks only at files
//! carrying the requesting world's identity.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use protocell_core::{SnapshotError, SnapshotStore, Tick, WorldSnapshot};
use thiserror::Error;
use tracing::{debug, warn};

const SNAPSHOT_PREFIX: &str = "simulation_state_";
const SNAPSHOT_EXTENSION: &str = ".json";

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed snapshot {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<StorageError> for SnapshotError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io { source, .. } => SnapshotError::Io(source),
            StorageError::Malformed { source, .. } | StorageError::Encode(source) => {
                SnapshotError::Serialization(source)
            }
        }
    }
}

/// File name an auto-save of `identity` at `tick` is written under.
#[must_use]
pub fn snapshot_file_name(identity: &str, tick: Tick) -> String {
    format!("{SNAPSHOT_PREFIX}{identity}_{}{SNAPSHOT_EXTENSION}", tick.0)
}

fn parse_snapshot_tick(file_name: &str, identity: &str) -> Option<Tick> {
    let rest = file_name.strip_prefix(SNAPSHOT_PREFIX)?;
    let rest = rest.strip_prefix(identity)?.strip_prefix('_')?;
    let digits = rest.strip_suffix(SNAPSHOT_EXTENSION)?;
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(Tick)
}

/// Writes `snapshot` as pretty-printed JSON, creating parent directories.
/// The file is written beside its destination and renamed into place.
pub fn save_world_file(path: &Path, snapshot: &WorldSnapshot) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
    }
    let encoded = serde_json::to_vec_pretty(snapshot)?;
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    fs::write(&staging, encoded).map_err(|err| StorageError::io(&staging, err))?;
    fs::rename(&staging, path).map_err(|err| StorageError::io(path, err))?;
    Ok(())
}

/// Reads a snapshot previously written by [`save_world_file`] (or any
/// compatible JSON world state).
pub fn load_world_file(path: &Path) -> Result<WorldSnapshot, StorageError> {
    let raw = fs::read(path).map_err(|err| StorageError::io(path, err))?;
    serde_json::from_slice(&raw).map_err(|source| StorageError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// Snapshot store writing one JSON file per auto-save into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Uses `root` as the saves directory, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StorageError::io(&root, err))?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn snapshot_path(&self, identity: &str, tick: Tick) -> PathBuf {
        self.root.join(snapshot_file_name(identity, tick))
    }

    /// Every auto-save recorded for `identity`, ascending by tick. Files whose
    /// names do not parse are ignored.
    pub fn snapshots(&self, identity: &str) -> Result<Vec<(Tick, PathBuf)>, StorageError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io(&self.root, err)),
        };
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io(&self.root, err))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(tick) = parse_snapshot_tick(name, identity) {
                found.push((tick, entry.path()));
            }
        }
        found.sort_by_key(|(tick, _)| *tick);
        Ok(found)
    }
}

impl SnapshotStore for DirectoryStore {
    fn save(
        &mut self,
        identity: &str,
        tick: Tick,
        snapshot: &WorldSnapshot,
    ) -> Result<(), SnapshotError> {
        let path = self.snapshot_path(identity, tick);
        save_world_file(&path, snapshot)?;
        debug!(path = %path.display(), "snapshot file written");
        Ok(())
    }

    fn latest(&self, identity: &str) -> Result<Option<WorldSnapshot>, SnapshotError> {
        for (tick, path) in self.snapshots(identity)?.into_iter().rev() {
            match load_world_file(&path) {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(err) => {
                    warn!(tick = tick.0, error = %err, "skipping unreadable snapshot");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: &str = "7f1c2a9e-0000-4000-8000-000000000001";

    #[test]
    fn file_names_encode_identity_and_tick() {
        let name = snapshot_file_name(IDENTITY, Tick(20_000));
        assert_eq!(
            name,
            "simulation_state_7f1c2a9e-0000-4000-8000-000000000001_20000.json"
        );
        assert_eq!(parse_snapshot_tick(&name, IDENTITY), Some(Tick(20_000)));
    }

    #[test]
    fn foreign_and_malformed_names_are_ignored() {
        assert_eq!(
            parse_snapshot_tick("simulation_state_other_10.json", IDENTITY),
            None
        );
        let bad_tick = format!("simulation_state_{IDENTITY}_ten.json");
        assert_eq!(parse_snapshot_tick(&bad_tick, IDENTITY), None);
        let no_tick = format!("simulation_state_{IDENTITY}_.json");
        assert_eq!(parse_snapshot_tick(&no_tick, IDENTITY), None);
        let wrong_ext = format!("simulation_state_{IDENTITY}_10.json.tmp");
        assert_eq!(parse_snapshot_tick(&wrong_ext, IDENTITY), None);
    }

    #[test]
    fn storage_errors_map_into_snapshot_errors() {
        let err = StorageError::io(
            Path::new("/nowhere"),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(SnapshotError::from(err), SnapshotError::Io(_)));
    }
}
