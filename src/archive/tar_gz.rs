use flate2::read::GzDecoder;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::Path;
use tar::{Archive, EntryType};

use crate::runtime::Runtime;

use super::{Extractor, InstallError, is_safe_entry_path};

/// Extractor for .tar.gz archives
#[derive(Default)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    #[tracing::instrument(skip(self, runtime, archive_path, extract_to))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<(), InstallError> {
        debug!("Extracting tar.gz archive to {:?}...", extract_to);
        let file = runtime.open(archive_path).map_err(|e| {
            InstallError::Extraction(format!("failed to open archive {:?}: {}", archive_path, e))
        })?;

        let mut archive = Archive::new(GzDecoder::new(file));
        let entries = archive
            .entries()
            .map_err(|e| InstallError::CorruptArchive(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| InstallError::CorruptArchive(e.to_string()))?;
            let rel_path = entry
                .path()
                .map_err(|e| InstallError::CorruptArchive(e.to_string()))?
                .to_path_buf();

            if !is_safe_entry_path(&rel_path) {
                debug!("Skipping entry with unsafe path {:?}", rel_path);
                continue;
            }
            let dest = extract_to.join(&rel_path);

            match entry.header().entry_type() {
                EntryType::Directory => {
                    runtime
                        .create_dir_all(&dest)
                        .map_err(|e| InstallError::Extraction(e.to_string()))?;
                }
                EntryType::Symlink => {
                    let target = entry
                        .link_name()
                        .map_err(|e| InstallError::CorruptArchive(e.to_string()))?;
                    let Some(target) = target else {
                        debug!("Skipping symlink entry without target: {:?}", rel_path);
                        continue;
                    };
                    if let Some(parent) = dest.parent() {
                        runtime
                            .create_dir_all(parent)
                            .map_err(|e| InstallError::Extraction(e.to_string()))?;
                    }
                    runtime
                        .symlink(&target, &dest)
                        .map_err(|e| InstallError::Extraction(e.to_string()))?;
                }
                EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                    if let Some(parent) = dest.parent() {
                        runtime
                            .create_dir_all(parent)
                            .map_err(|e| InstallError::Extraction(e.to_string()))?;
                    }
                    let mut writer = runtime
                        .create_file(&dest)
                        .map_err(|e| InstallError::Extraction(e.to_string()))?;
                    std::io::copy(&mut entry, &mut writer).map_err(|e| {
                        // A bad deflate stream surfaces as InvalidData on read
                        if e.kind() == ErrorKind::InvalidData {
                            InstallError::CorruptArchive(e.to_string())
                        } else {
                            InstallError::Extraction(format!(
                                "failed to extract {:?}: {}",
                                dest, e
                            ))
                        }
                    })?;

                    // Preserve the executable bits toolchain binaries rely on (Unix only)
                    #[cfg(unix)]
                    if let Ok(mode) = entry.header().mode()
                        && let Err(e) = runtime.set_permissions(&dest, mode)
                    {
                        debug!("Failed to set permissions on {:?}: {}", dest, e);
                    }
                }
                other => {
                    debug!("Skipping unsupported entry type {:?}: {:?}", other, rel_path);
                }
            }
        }

        info!("Extraction complete.");
        Ok(())
    }
}
