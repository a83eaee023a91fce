//! Per-package install/uninstall orchestration.
//!
//! Each package in a batch runs its own small state machine: check the
//! version requirement, download, extract-and-swap, then record in the
//! registry. One package failing never aborts the rest of the batch; every
//! requested package gets exactly one outcome.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use futures_util::stream;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::archive::{ArchiveInstaller, InstallError};
use crate::catalog::{Catalog, CatalogError};
use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::download::{DownloadError, Downloader, LogProgress};
use crate::platform::PlatformId;
use crate::registry::{
    DOWNLOAD_SUFFIX, InstalledPackageRecord, LocalRegistry, RegistryError,
};
use crate::runtime::Runtime;
use crate::version::{InstallModifiers, VersionResolver};

/// How many packages are fetched and extracted at once within a batch.
/// Packages own disjoint directories, so only the registry writes need
/// serializing (they go through the mutex below).
const MAX_CONCURRENT_INSTALLS: usize = 4;

/// Everything that can go wrong for one package.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Install(#[from] InstallError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug)]
pub enum InstallStatus {
    Installed,
    AlreadyUpToDate,
    Skipped(String),
    Failed(PackageError),
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallStatus::Installed => write!(f, "installed"),
            InstallStatus::AlreadyUpToDate => write!(f, "already up to date"),
            InstallStatus::Skipped(reason) => write!(f, "skipped ({})", reason),
            InstallStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Terminal result for one package in an install batch.
#[derive(Debug)]
pub struct InstallOutcome {
    pub name: String,
    pub status: InstallStatus,
}

impl InstallOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, InstallStatus::Failed(_))
    }
}

#[derive(Debug)]
pub enum UninstallStatus {
    Removed,
    NotInstalled,
    Failed(PackageError),
}

impl fmt::Display for UninstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UninstallStatus::Removed => write!(f, "removed"),
            UninstallStatus::NotInstalled => write!(f, "not installed"),
            UninstallStatus::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Terminal result for one package in an uninstall batch.
#[derive(Debug)]
pub struct UninstallOutcome {
    pub name: String,
    pub status: UninstallStatus,
}

impl UninstallOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, UninstallStatus::Failed(_))
    }
}

/// One row of `list_installed` output.
#[derive(Debug, PartialEq)]
pub struct PackageStatus {
    pub name: String,
    pub description: Option<String>,
    pub installed: Option<String>,
    pub available: String,
    /// Whether the catalog ships an artifact for the resolved platform.
    pub supported: bool,
}

/// Composes catalog, registry, downloader and archive installer into the
/// per-package operations.
pub struct Installer<'a, R: Runtime, D: Downloader> {
    runtime: &'a R,
    catalog: &'a Catalog,
    registry: Mutex<LocalRegistry<'a, R>>,
    downloader: D,
    archive: ArchiveInstaller,
    cleanup_ctx: SharedCleanupContext,
    root: PathBuf,
}

impl<'a, R: Runtime + 'static, D: Downloader> Installer<'a, R, D> {
    /// Create an installer over `root`, creating the directory if needed and
    /// reconciling the registry against whatever is already on disk.
    pub fn new(
        runtime: &'a R,
        catalog: &'a Catalog,
        downloader: D,
        root: PathBuf,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<Self> {
        runtime
            .create_dir_all(&root)
            .with_context(|| format!("Failed to create install root {:?}", root))?;

        let registry = LocalRegistry::new(runtime, root.clone());
        if let Err(e) = registry.rebuild() {
            // The registry is only a cache; a failed reconciliation is not fatal
            warn!("Registry reconciliation failed: {}", e);
        }

        Ok(Self {
            runtime,
            catalog,
            registry: Mutex::new(registry),
            downloader,
            archive: ArchiveInstaller::new(),
            cleanup_ctx,
            root,
        })
    }

    /// Install a batch of packages. Outcomes are returned in request order;
    /// up to [`MAX_CONCURRENT_INSTALLS`] packages are in flight at once.
    #[tracing::instrument(skip(self, names, modifiers))]
    pub async fn install(
        &self,
        names: &[String],
        platform: PlatformId,
        modifiers: InstallModifiers,
    ) -> Vec<InstallOutcome> {
        stream::iter(names)
            .map(|name| self.install_one(name, platform, modifiers))
            .buffered(MAX_CONCURRENT_INSTALLS)
            .collect()
            .await
    }

    async fn install_one(
        &self,
        name: &str,
        platform: PlatformId,
        modifiers: InstallModifiers,
    ) -> InstallOutcome {
        let status = match self.try_install(name, platform, modifiers).await {
            Ok(status) => status,
            Err(e) => {
                if matches!(e, PackageError::Registry(_)) {
                    // The package tree is fully installed; only the record is
                    // missing. Reconciliation on the next run picks it up.
                    warn!(
                        "'{}' is installed on disk but could not be recorded in the registry",
                        name
                    );
                }
                InstallStatus::Failed(e)
            }
        };
        InstallOutcome {
            name: name.to_string(),
            status,
        }
    }

    async fn try_install(
        &self,
        name: &str,
        platform: PlatformId,
        modifiers: InstallModifiers,
    ) -> Result<InstallStatus, PackageError> {
        let spec = self.catalog.lookup(name)?;
        let Some(artifact) = spec.artifact_for(platform) else {
            return Ok(InstallStatus::Skipped(format!(
                "no artifact for platform {}",
                platform
            )));
        };

        let existing = { self.registry.lock().await.get(name) };
        if !VersionResolver::needs_install(spec, existing.as_ref(), modifiers) {
            info!("'{}' {} is already satisfied", name, spec.version);
            return Ok(InstallStatus::AlreadyUpToDate);
        }

        info!("Installing '{}' {} for {}", name, spec.version, platform);
        let final_dir = self.root.join(name);
        let archive_tmp = self.root.join(format!("{}{}", name, DOWNLOAD_SUFFIX));

        // The temp file lives next to the final directory so the eventual
        // rename stays on one filesystem
        let guard = CleanupGuard::new(self.cleanup_ctx.clone(), archive_tmp.clone());
        let progress = LogProgress::new(name);
        let fetched = self
            .downloader
            .fetch(&artifact.url, &archive_tmp, &progress)
            .await;
        if let Err(e) = fetched {
            guard.done();
            return Err(e.into());
        }

        let installed = self.archive.install(
            self.runtime,
            &archive_tmp,
            &artifact.format,
            &final_dir,
            self.cleanup_ctx.clone(),
        );
        if self.runtime.exists(&archive_tmp) {
            let _ = self.runtime.remove_file(&archive_tmp);
        }
        guard.done();
        installed?;

        // Register last: the registry must never point at anything that is
        // not a fully extracted package
        self.registry.lock().await.put(InstalledPackageRecord {
            name: name.to_string(),
            version: spec.version.clone(),
            path: final_dir,
        })?;

        Ok(InstallStatus::Installed)
    }

    /// Uninstall a batch of packages. Removing an absent package is a
    /// success; the registry delete also removes the install directory.
    #[tracing::instrument(skip(self, names))]
    pub async fn uninstall(&self, names: &[String]) -> Vec<UninstallOutcome> {
        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            let removed = { self.registry.lock().await.remove(name) };
            let status = match removed {
                Ok(true) => {
                    info!("Uninstalled '{}'", name);
                    UninstallStatus::Removed
                }
                Ok(false) => UninstallStatus::NotInstalled,
                Err(e) => UninstallStatus::Failed(e.into()),
            };
            outcomes.push(UninstallOutcome {
                name: name.clone(),
                status,
            });
        }
        outcomes
    }

    /// Installed/available versions for every catalog package, in catalog
    /// order.
    pub async fn list_installed(&self, platform: PlatformId) -> Vec<PackageStatus> {
        let registry = self.registry.lock().await;
        self.catalog
            .iter()
            .map(|spec| PackageStatus {
                name: spec.name.clone(),
                description: spec.description.clone(),
                installed: registry.get(&spec.name).map(|r| r.version),
                available: spec.version.clone(),
                supported: spec.artifact_for(platform).is_some(),
            })
            .collect()
    }
}
