mod tar_gz;
mod zip;

use std::path::{Component, Path};

use log::debug;
use thiserror::Error;

use crate::cleanup::{CleanupGuard, SharedCleanupContext};
use crate::registry::STAGING_SUFFIX;
use crate::runtime::Runtime;

pub use tar_gz::TarGzExtractor;
pub use zip::ZipExtractor;

/// Archive formats the installer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
}

impl ArchiveFormat {
    /// Parse a catalog-declared format string. Returns None for formats
    /// this tool does not understand.
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "tar.gz" | "tgz" => Some(Self::TarGz),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Zip => "zip",
        }
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    /// The catalog declared a format this tool cannot unpack. Raised before
    /// any filesystem mutation.
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),
    /// The archive itself could not be decoded.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    /// Decoding succeeded but writing the contents out did not.
    #[error("extraction failed: {0}")]
    Extraction(String),
}

/// Trait for format-specific archive extractors
pub trait Extractor: Send + Sync {
    /// Extract the archive into `extract_to`, which already exists and is
    /// empty. Entries with absolute or parent-traversing paths are skipped.
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<(), InstallError>;
}

/// Unpacks a downloaded artifact and swaps it into place atomically.
///
/// Extraction happens in a sibling staging directory; only a fully
/// extracted tree is renamed over the final directory, so a reader observes
/// either the prior complete install or the new complete install, never a
/// half-extracted one.
#[derive(Default)]
pub struct ArchiveInstaller {
    tar_gz: TarGzExtractor,
    zip: ZipExtractor,
}

impl ArchiveInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(skip(self, runtime, archive_path, final_dir, cleanup_ctx))]
    pub fn install<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        format: &str,
        final_dir: &Path,
        cleanup_ctx: SharedCleanupContext,
    ) -> Result<(), InstallError> {
        // Fail fast on an unknown format, before touching the filesystem
        let format = ArchiveFormat::parse(format)
            .ok_or_else(|| InstallError::UnsupportedFormat(format.to_string()))?;

        let file_name = final_dir
            .file_name()
            .ok_or_else(|| {
                InstallError::Extraction(format!("invalid install directory {:?}", final_dir))
            })?
            .to_string_lossy();
        let staging = final_dir.with_file_name(format!("{}{}", file_name, STAGING_SUFFIX));

        if runtime.exists(&staging) {
            runtime
                .remove_dir_all(&staging)
                .map_err(|e| InstallError::Extraction(e.to_string()))?;
        }
        runtime
            .create_dir_all(&staging)
            .map_err(|e| InstallError::Extraction(e.to_string()))?;
        let guard = CleanupGuard::new(cleanup_ctx, staging.clone());

        debug!("Extracting {:?} into staging dir {:?}", archive_path, staging);
        let result = self.extract_into(runtime, archive_path, format, &staging);
        if let Err(e) = result {
            let _ = runtime.remove_dir_all(&staging);
            guard.done();
            return Err(e);
        }

        // An archive that unpacked to nothing would leave an empty install
        // directory behind, which the registry treats as not installed
        let populated = runtime
            .read_dir(&staging)
            .map(|entries| !entries.is_empty())
            .unwrap_or(false);
        if !populated {
            let _ = runtime.remove_dir_all(&staging);
            guard.done();
            return Err(InstallError::CorruptArchive("archive is empty".to_string()));
        }

        if runtime.exists(final_dir)
            && let Err(e) = runtime.remove_dir_all(final_dir)
        {
            let _ = runtime.remove_dir_all(&staging);
            guard.done();
            return Err(InstallError::Extraction(e.to_string()));
        }
        if let Err(e) = runtime.rename(&staging, final_dir) {
            let _ = runtime.remove_dir_all(&staging);
            guard.done();
            return Err(InstallError::Extraction(e.to_string()));
        }
        guard.done();
        Ok(())
    }

    fn extract_into<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        format: ArchiveFormat,
        staging: &Path,
    ) -> Result<(), InstallError> {
        match format {
            ArchiveFormat::TarGz => self.tar_gz.extract(runtime, archive_path, staging),
            ArchiveFormat::Zip => self.zip.extract(runtime, archive_path, staging),
        }
    }
}

/// Whether an archive entry path is safe to join below the extraction dir.
pub(crate) fn is_safe_entry_path(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
