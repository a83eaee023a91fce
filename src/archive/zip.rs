use log::{debug, info};
use std::io::{ErrorKind, Read};
use std::path::Path;
use zip::ZipArchive;

use crate::runtime::Runtime;

use super::{Extractor, InstallError};

/// Extractor for .zip archives
#[derive(Default)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    #[tracing::instrument(skip(self, runtime, archive_path, extract_to))]
    fn extract<R: Runtime + 'static>(
        &self,
        runtime: &R,
        archive_path: &Path,
        extract_to: &Path,
    ) -> Result<(), InstallError> {
        debug!("Extracting zip archive to {:?}...", extract_to);
        let mut reader = runtime.open(archive_path).map_err(|e| {
            InstallError::Extraction(format!("failed to open archive {:?}: {}", archive_path, e))
        })?;

        // The zip reader needs Read + Seek, but Runtime::open returns a plain
        // reader, so the archive is buffered in memory
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(|e| {
            InstallError::Extraction(format!("failed to read archive {:?}: {}", archive_path, e))
        })?;
        let cursor = std::io::Cursor::new(buffer);

        let mut archive =
            ZipArchive::new(cursor).map_err(|e| InstallError::CorruptArchive(e.to_string()))?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| InstallError::CorruptArchive(e.to_string()))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with invalid path");
                    continue;
                }
            };

            let full_path = extract_to.join(&entry_path);

            if entry.is_dir() {
                runtime
                    .create_dir_all(&full_path)
                    .map_err(|e| InstallError::Extraction(e.to_string()))?;
            } else {
                if let Some(parent) = full_path.parent() {
                    runtime
                        .create_dir_all(parent)
                        .map_err(|e| InstallError::Extraction(e.to_string()))?;
                }
                let mut dest_file = runtime
                    .create_file(&full_path)
                    .map_err(|e| InstallError::Extraction(e.to_string()))?;
                std::io::copy(&mut entry, &mut dest_file).map_err(|e| {
                    if e.kind() == ErrorKind::InvalidData {
                        InstallError::CorruptArchive(e.to_string())
                    } else {
                        InstallError::Extraction(format!(
                            "failed to extract {:?}: {}",
                            full_path, e
                        ))
                    }
                })?;

                // Set file permissions from archive metadata (Unix only)
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode()
                    && let Err(e) = runtime.set_permissions(&full_path, mode)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }

        info!("Extraction complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RealRuntime;
    use anyhow::Result;
    use std::collections::HashMap;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::CompressionMethod;
    use zip::ZipWriter;
    use zip::write::FileOptions;

    fn create_test_archive(path: &Path, files: HashMap<&str, &str>) -> Result<()> {
        let file = File::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options: FileOptions<()> =
            FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, content) in files.iter() {
            zip.start_file(*name, options)?;
            zip.write_all(content.as_bytes())?;
        }

        zip.finish()?;
        Ok(())
    }

    #[test]
    fn test_extract_archive() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        create_test_archive(
            &archive_path,
            HashMap::from([("bin/prog.exe", "binary"), ("examples/leds.v", "module")]),
        )?;

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert_eq!(
            fs::read_to_string(extract_path.join("bin/prog.exe"))?,
            "binary"
        );
        assert_eq!(
            fs::read_to_string(extract_path.join("examples/leds.v"))?,
            "module"
        );
        Ok(())
    }

    #[test]
    fn test_extract_archive_with_directory_entries() -> Result<()> {
        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        {
            let file = File::create(&archive_path)?;
            let mut zip = ZipWriter::new(file);
            let options: FileOptions<()> =
                FileOptions::default().compression_method(CompressionMethod::Stored);

            zip.add_directory("subdir/", options)?;

            let file_options: FileOptions<()> =
                FileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file("subdir/file.txt", file_options)?;
            zip.write_all(b"nested file")?;

            zip.finish()?;
        }

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        assert!(extract_path.join("subdir").is_dir());
        assert_eq!(
            fs::read_to_string(extract_path.join("subdir/file.txt"))?,
            "nested file"
        );
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_extract_archive_preserves_file_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir()?;
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path)?;

        {
            let file = File::create(&archive_path)?;
            let mut zip = ZipWriter::new(file);

            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o755);
            zip.start_file("script.sh", options)?;
            zip.write_all(b"#!/bin/bash\necho hello")?;

            let options: FileOptions<()> = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .unix_permissions(0o644);
            zip.start_file("config.txt", options)?;
            zip.write_all(b"some config")?;

            zip.finish()?;
        }

        ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path)?;

        let script_mode = fs::metadata(extract_path.join("script.sh"))?
            .permissions()
            .mode();
        assert!(
            script_mode & 0o111 != 0,
            "Expected script.sh to be executable, but mode was {:o}",
            script_mode
        );

        let config_mode = fs::metadata(extract_path.join("config.txt"))?
            .permissions()
            .mode();
        assert!(
            config_mode & 0o111 == 0,
            "Expected config.txt to NOT be executable, but mode was {:o}",
            config_mode
        );

        Ok(())
    }

    #[test]
    fn test_extract_corrupted_archive() {
        let dir = tempdir().unwrap();
        let archive_path = dir.path().join("test.zip");
        let extract_path = dir.path().join("extracted");
        fs::create_dir(&extract_path).unwrap();

        fs::write(&archive_path, "corrupted data").unwrap();

        let result = ZipExtractor.extract(&RealRuntime, &archive_path, &extract_path);
        assert!(matches!(result, Err(InstallError::CorruptArchive(_))));
    }

    #[test]
    fn test_extract_nonexistent_archive() {
        let dir = tempdir().unwrap();
        let result = ZipExtractor.extract(
            &RealRuntime,
            &dir.path().join("nonexistent.zip"),
            dir.path(),
        );
        assert!(matches!(result, Err(InstallError::Extraction(_))));
    }
}
