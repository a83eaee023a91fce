use log::debug;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Tracks paths that need cleanup on interruption
#[derive(Default)]
pub struct CleanupContext {
    #[cfg(test)]
    pub paths: Vec<PathBuf>,
    #[cfg(not(test))]
    paths: Vec<PathBuf>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path to be cleaned up on interruption
    pub fn add(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove a path from cleanup list (e.g., when operation succeeds)
    pub fn remove(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    /// Clean up all registered paths
    pub fn cleanup(&self) {
        for path in &self.paths {
            debug!("Cleaning up: {:?}", path);
            if path.is_dir() {
                let _ = std::fs::remove_dir_all(path);
            } else {
                let _ = std::fs::remove_file(path);
            }
        }
    }
}

/// Type alias for shared cleanup context
pub type SharedCleanupContext = Arc<Mutex<CleanupContext>>;

/// Create a new shared cleanup context
pub fn new_shared() -> SharedCleanupContext {
    Arc::new(Mutex::new(CleanupContext::new()))
}

/// Registers a scratch path for interrupt cleanup until the owning
/// operation either finishes with it or deletes it itself.
pub struct CleanupGuard {
    ctx: SharedCleanupContext,
    path: PathBuf,
}

impl CleanupGuard {
    /// Create a new cleanup guard and register the path
    pub fn new(ctx: SharedCleanupContext, path: PathBuf) -> Self {
        {
            let mut guard = ctx.lock().unwrap();
            guard.add(path.clone());
        }
        Self { ctx, path }
    }

    /// The guarded operation is done (the path was renamed away or
    /// deleted); stop tracking it.
    pub fn done(self) {
        let mut guard = self.ctx.lock().unwrap();
        guard.remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_context_add_remove() {
        let mut ctx = CleanupContext::new();
        let path = PathBuf::from("/tmp/test");

        ctx.add(path.clone());
        assert_eq!(ctx.paths.len(), 1);

        ctx.remove(&path);
        assert_eq!(ctx.paths.len(), 0);
    }

    #[test]
    fn test_cleanup_context_cleanup_files_and_dirs() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("pkg.download");
        fs::write(&file_path, "partial").unwrap();
        let sub_dir = dir.path().join("pkg.staging");
        fs::create_dir(&sub_dir).unwrap();
        fs::write(sub_dir.join("file.txt"), "test").unwrap();

        let mut ctx = CleanupContext::new();
        ctx.add(file_path.clone());
        ctx.add(sub_dir.clone());

        ctx.cleanup();
        assert!(!file_path.exists());
        assert!(!sub_dir.exists());
    }

    #[test]
    fn test_cleanup_guard_tracks_until_done() {
        let ctx = new_shared();
        let path = PathBuf::from("/tmp/guarded");

        let guard = CleanupGuard::new(ctx.clone(), path.clone());
        assert_eq!(ctx.lock().unwrap().paths, vec![path.clone()]);

        guard.done();
        assert!(ctx.lock().unwrap().paths.is_empty());
    }
}
