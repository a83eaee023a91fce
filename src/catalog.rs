//! Read-only catalog of known packages and their remote artifacts.
//!
//! The catalog is loaded once at process start from a JSON resource file and
//! never mutated during a run. It maps each logical package name to its
//! declared version and the per-platform artifact descriptors.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::platform::PlatformId;
use crate::runtime::Runtime;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Requested package name is not declared in the catalog.
    #[error("unknown package: {0}")]
    UnknownPackage(String),
    #[error("failed to read catalog file {path}: {err}")]
    Read { path: String, err: anyhow::Error },
    #[error("malformed catalog file {path}: {err}")]
    Parse {
        path: String,
        #[source]
        err: serde_json::Error,
    },
}

/// Remote artifact for one package on one platform.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactDescriptor {
    pub url: String,
    /// Declared archive format (e.g. "tar.gz", "zip"). Parsed at install
    /// time so one package with an unrecognized format does not prevent the
    /// rest of the catalog from loading.
    pub format: String,
}

/// Catalog entry for one logical package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PackageSpec {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub artifacts: BTreeMap<PlatformId, ArtifactDescriptor>,
}

impl PackageSpec {
    /// Artifact for the given platform, if the package ships one.
    pub fn artifact_for(&self, platform: PlatformId) -> Option<&ArtifactDescriptor> {
        self.artifacts.get(&platform)
    }
}

#[derive(Serialize, Deserialize, Debug)]
struct CatalogFile {
    packages: Vec<PackageSpec>,
}

/// The set of packages this tool knows how to install.
#[derive(Debug)]
pub struct Catalog {
    packages: Vec<PackageSpec>,
}

impl Catalog {
    #[tracing::instrument(skip(runtime, path))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self, CatalogError> {
        let content = runtime
            .read_to_string(path)
            .map_err(|e| CatalogError::Read {
                path: path.display().to_string(),
                err: e,
            })?;
        Self::from_json(&content).map_err(|e| CatalogError::Parse {
            path: path.display().to_string(),
            err: e,
        })
    }

    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Ok(Self {
            packages: file.packages,
        })
    }

    pub fn lookup(&self, name: &str) -> Result<&PackageSpec, CatalogError> {
        self.packages
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CatalogError::UnknownPackage(name.to_string()))
    }

    /// Package names in the order the catalog declares them.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(|p| p.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackageSpec> {
        self.packages.iter()
    }
}
