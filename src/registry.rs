//! Persisted record of locally installed packages.
//!
//! The registry is a cache over the filesystem, not the source of truth: a
//! missing or corrupt registry file is treated as an empty registry, and
//! `rebuild` reconciles the records against the package directories that
//! actually exist under the install root.

use std::collections::BTreeMap;
use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::Runtime;

const REGISTRY_FILE: &str = "registry.json";

/// Suffixes of scratch paths the installer creates next to package
/// directories; never adopted as packages by `rebuild`.
pub const DOWNLOAD_SUFFIX: &str = ".download";
pub const STAGING_SUFFIX: &str = ".staging";

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file could not be persisted. The filesystem may already
    /// hold a newer install than the registry records; `rebuild` on a later
    /// run reconciles this.
    #[error("failed to persist registry: {0}")]
    Write(anyhow::Error),
    #[error("failed to remove {path}: {err}")]
    Remove { path: String, err: anyhow::Error },
}

/// One installed package, keyed uniquely by name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstalledPackageRecord {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct RegistryFile {
    packages: BTreeMap<String, InstalledPackageRecord>,
}

/// Registry of installed packages scoped to one install root.
pub struct LocalRegistry<'a, R: Runtime> {
    runtime: &'a R,
    root: PathBuf,
}

impl<'a, R: Runtime> LocalRegistry<'a, R> {
    pub fn new(runtime: &'a R, root: PathBuf) -> Self {
        Self { runtime, root }
    }

    /// Directory a package installs into: `<root>/<name>`.
    pub fn package_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn registry_path(&self) -> PathBuf {
        self.root.join(REGISTRY_FILE)
    }

    /// Load the on-disk registry, tolerating a missing or corrupt file.
    fn load(&self) -> RegistryFile {
        let path = self.registry_path();
        if !self.runtime.exists(&path) {
            return RegistryFile::default();
        }
        let content = match self.runtime.read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read registry at {:?}: {}", path, e);
                return RegistryFile::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => {
                warn!(
                    "Registry at {:?} is corrupt ({}); treating as empty",
                    path, e
                );
                RegistryFile::default()
            }
        }
    }

    /// Persist durably: write a sibling temp file, then rename over the
    /// registry so a crash mid-write never corrupts the previous contents.
    fn persist(&self, file: &RegistryFile) -> Result<(), RegistryError> {
        let path = self.registry_path();
        let tmp = self.root.join(format!("{}.tmp", REGISTRY_FILE));

        let content = serde_json::to_string_pretty(file)
            .map_err(|e| RegistryError::Write(e.into()))?;
        self.runtime
            .write(&tmp, content.as_bytes())
            .map_err(RegistryError::Write)?;
        if let Err(e) = self.runtime.rename(&tmp, &path) {
            let _ = self.runtime.remove_file(&tmp);
            return Err(RegistryError::Write(e));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<InstalledPackageRecord> {
        self.load().packages.get(name).cloned()
    }

    /// Upsert a record. Must only be called after the package directory is
    /// fully extracted and in place.
    #[tracing::instrument(skip(self, record))]
    pub fn put(&self, record: InstalledPackageRecord) -> Result<(), RegistryError> {
        let mut file = self.load();
        file.packages.insert(record.name.clone(), record);
        self.persist(&file)
    }

    /// Remove the record and recursively delete its install directory.
    ///
    /// Idempotent: removing an absent package is a no-op success. Returns
    /// whether anything (record or directory) was actually removed.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, name: &str) -> Result<bool, RegistryError> {
        let mut file = self.load();
        let record = file.packages.remove(name);

        // The directory named after the package is removed even without a
        // record; the filesystem, not the registry, is the source of truth.
        let dir = record
            .as_ref()
            .map(|r| r.path.clone())
            .unwrap_or_else(|| self.package_dir(name));

        let mut removed = record.is_some();
        if self.runtime.exists(&dir) {
            self.runtime
                .remove_dir_all(&dir)
                .map_err(|e| RegistryError::Remove {
                    path: dir.display().to_string(),
                    err: e,
                })?;
            removed = true;
        }

        if record.is_some() {
            self.persist(&file)?;
        }
        Ok(removed)
    }

    /// Reconcile records against the install root.
    ///
    /// Records whose directory is missing or empty are dropped. Orphan
    /// package directories are adopted with an empty version string, so a
    /// lost registry write still counts as "present" for presence-only
    /// satisfaction while a version check forces a reinstall.
    #[tracing::instrument(skip(self))]
    pub fn rebuild(&self) -> Result<(), RegistryError> {
        let mut file = self.load();
        let mut changed = false;

        file.packages.retain(|name, record| {
            let populated = self.runtime.is_dir(&record.path)
                && self
                    .runtime
                    .read_dir(&record.path)
                    .map(|entries| !entries.is_empty())
                    .unwrap_or(false);
            if !populated {
                warn!(
                    "Dropping registry record for '{}': {:?} is missing or empty",
                    name, record.path
                );
                changed = true;
            }
            populated
        });

        if self.runtime.is_dir(&self.root) {
            for entry in self.runtime.read_dir(&self.root).unwrap_or_default() {
                if !self.runtime.is_dir(&entry) {
                    continue;
                }
                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if name.ends_with(DOWNLOAD_SUFFIX) || name.ends_with(STAGING_SUFFIX) {
                    continue;
                }
                let populated = self
                    .runtime
                    .read_dir(&entry)
                    .map(|entries| !entries.is_empty())
                    .unwrap_or(false);
                if populated && !file.packages.contains_key(name) {
                    warn!("Adopting orphan package directory {:?}", entry);
                    file.packages.insert(
                        name.to_string(),
                        InstalledPackageRecord {
                            name: name.to_string(),
                            version: String::new(),
                            path: entry.clone(),
                        },
                    );
                    changed = true;
                }
            }
        }

        if changed {
            self.persist(&file)?;
        }
        Ok(())
    }
}
