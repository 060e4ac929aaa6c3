//! File-backed VM inventory snapshots, one JSON document per PVDC.
//!
//! The previous run's inventory is what turns a plain listing into a diff:
//! `inventory:compare` loads the snapshot, diffs, then rewrites it with the
//! current listing. Location resolution mirrors the rest of the tooling:
//! explicit input, then the `VAULTLINE_SNAPSHOT_DIR` environment variable,
//! then a `vaultline/vdcs` directory under the user config dir.

use std::{env, fs, path::PathBuf};

use dirs_next::config_dir;
use thiserror::Error;
use tracing::warn;
use vaultline_types::inventory::VmRef;

/// Environment variable overriding the snapshot directory.
pub const SNAPSHOT_DIR_ENV: &str = "VAULTLINE_SNAPSHOT_DIR";

/// Errors surfaced by snapshot store operations.
#[derive(Debug, Error)]
pub enum SnapshotStoreError {
    /// I/O failure while reading or writing a snapshot file.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure while writing a snapshot file.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// No usable directory could be resolved.
    #[error("no snapshot directory available; set {SNAPSHOT_DIR_ENV}")]
    NoDirectory,
}

/// Outcome of loading a PVDC snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// First run for this PVDC; no snapshot file exists yet.
    Missing,
    /// A file exists but did not parse as a VM list; treated as empty.
    Corrupt,
    /// The previous inventory.
    Loaded(Vec<VmRef>),
}

impl Snapshot {
    /// The previous inventory, empty for `Missing`/`Corrupt`.
    pub fn vms(&self) -> &[VmRef] {
        match self {
            Self::Loaded(vms) => vms,
            _ => &[],
        }
    }
}

/// Directory of per-PVDC snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (creating if needed) the snapshot directory.
    pub fn open(dir_override: Option<&str>) -> Result<Self, SnapshotStoreError> {
        let dir = resolve_dir(dir_override).ok_or(SnapshotStoreError::NoDirectory)?;
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Path of the snapshot file for a PVDC.
    pub fn path_for(&self, pvdc_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_stem(pvdc_name)))
    }

    /// Load the previous inventory for a PVDC.
    pub fn load(&self, pvdc_name: &str) -> Result<Snapshot, SnapshotStoreError> {
        let path = self.path_for(pvdc_name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Snapshot::Missing),
            Err(error) => return Err(error.into()),
        };
        match serde_json::from_str::<Vec<VmRef>>(&content) {
            Ok(vms) => Ok(Snapshot::Loaded(vms)),
            Err(error) => {
                warn!(path = %path.display(), %error, "snapshot did not parse; resetting");
                Ok(Snapshot::Corrupt)
            }
        }
    }

    /// Replace the snapshot with the current inventory.
    pub fn save(&self, pvdc_name: &str, vms: &[VmRef]) -> Result<(), SnapshotStoreError> {
        let path = self.path_for(pvdc_name);
        let content = serde_json::to_string_pretty(vms)?;
        fs::write(&path, content)?;
        Ok(())
    }
}

fn resolve_dir(dir_override: Option<&str>) -> Option<PathBuf> {
    if let Some(dir) = dir_override.filter(|dir| !dir.trim().is_empty()) {
        return Some(PathBuf::from(dir));
    }
    if let Ok(dir) = env::var(SNAPSHOT_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    config_dir().map(|base| base.join("vaultline").join("vdcs"))
}

/// PVDC descriptions are free text; keep the file name inside the directory.
fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

/// Default artifact directory shared with the log and report steps.
pub(crate) fn default_artifact_dir() -> Option<PathBuf> {
    config_dir().map(|base| base.join("vaultline"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SnapshotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(Some(dir.path().to_str().unwrap())).unwrap();
        (dir, store)
    }

    fn vm(name: &str, id: &str) -> VmRef {
        VmRef {
            name: name.into(),
            id: id.into(),
        }
    }

    #[test]
    fn missing_then_round_trip() {
        let (_dir, store) = store();
        assert_eq!(store.load("pvdc-a").unwrap(), Snapshot::Missing);

        let vms = vec![vm("web-01", "urn:vm:1")];
        store.save("pvdc-a", &vms).unwrap();
        assert_eq!(store.load("pvdc-a").unwrap(), Snapshot::Loaded(vms));
    }

    #[test]
    fn corrupt_files_reset_instead_of_erroring() {
        let (_dir, store) = store();
        fs::write(store.path_for("pvdc-a"), "{not json").unwrap();
        let snapshot = store.load("pvdc-a").unwrap();
        assert_eq!(snapshot, Snapshot::Corrupt);
        assert!(snapshot.vms().is_empty());
    }

    #[test]
    fn pvdc_names_with_separators_stay_in_the_directory() {
        let (dir, store) = store();
        let path = store.path_for("tenant/pvdc: a");
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "tenant_pvdc_ a.json");
    }
}
