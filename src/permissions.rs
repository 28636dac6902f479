//! Permission guard.
//!
//! Before paths are moved, every directory between the install root and each
//! path (and the path itself) must accept the move. Non-writable entries are
//! switched to a fixed writable mode and their original mode is recorded once;
//! `restore` puts the recorded modes back after all moves are done.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::errors::PreserveError;
use crate::fs_adapter::Filesystem;
use crate::paths::ancestors_within;

pub const WRITABLE_DIR_MODE: u32 = 0o755;
pub const WRITABLE_FILE_MODE: u32 = 0o644;

/// Recorded original modes, keyed by path.
#[derive(Debug, Default)]
pub struct PermissionGuard {
    snapshot: BTreeMap<PathBuf, u32>,
}

impl PermissionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Recorded `(path, original mode)` pairs in path order.
    pub fn snapshot(&self) -> impl Iterator<Item = (&Path, u32)> {
        self.snapshot.iter().map(|(p, m)| (p.as_path(), *m))
    }

    /// Make each path and its ancestors inside `root` writable.
    pub fn prepare(
        &mut self,
        fs: &dyn Filesystem,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<(), PreserveError> {
        for path in paths {
            self.prepare_ancestors(fs, root, path)?;
            if fs.exists(path) && !fs.is_symlink(path) && !fs.is_writable(path) {
                let mode = if fs.is_dir(path) { WRITABLE_DIR_MODE } else { WRITABLE_FILE_MODE };
                self.relax(fs, path, mode)?;
            }
        }
        Ok(())
    }

    /// Make only the ancestors inside `root` writable; the paths themselves are
    /// left alone because whatever sits there is about to be replaced.
    pub fn prepare_parents(
        &mut self,
        fs: &dyn Filesystem,
        root: &Path,
        paths: &[PathBuf],
    ) -> Result<(), PreserveError> {
        for path in paths {
            self.prepare_ancestors(fs, root, path)?;
        }
        Ok(())
    }

    fn prepare_ancestors(
        &mut self,
        fs: &dyn Filesystem,
        root: &Path,
        path: &Path,
    ) -> Result<(), PreserveError> {
        for dir in ancestors_within(root, path) {
            if !fs.is_dir(&dir) {
                // Missing from here down; ensure_dir will create it writable.
                break;
            }
            if !fs.is_writable(&dir) {
                self.relax(fs, &dir, WRITABLE_DIR_MODE)?;
            }
        }
        Ok(())
    }

    fn relax(&mut self, fs: &dyn Filesystem, path: &Path, mode: u32) -> Result<(), PreserveError> {
        let denied = |source| PreserveError::PermissionDenied {
            path: path.to_path_buf(),
            source,
        };
        if !self.snapshot.contains_key(path) {
            let original = fs.mode(path).map_err(denied)?;
            fs.set_mode(path, mode).map_err(denied)?;
            self.snapshot.insert(path.to_path_buf(), original);
            debug!(path = %path.display(), from = format!("{original:o}"), to = format!("{mode:o}"), "Relaxed permissions");
        } else {
            // Already recorded; keep the first original mode.
            fs.set_mode(path, mode).map_err(denied)?;
            trace!(path = %path.display(), "Relaxed permissions again");
        }
        Ok(())
    }

    /// Put every recorded mode back and forget it. On error the entries not
    /// yet applied stay recorded.
    ///
    /// Deeper paths must go first: once a parent gets back a mode without
    /// search permission, nothing below it can be chmod-ed any more.
    pub fn restore(&mut self, fs: &dyn Filesystem) -> Result<(), PreserveError> {
        while let Some((path, mode)) = self.snapshot.pop_last() {
            if let Err(source) = fs.set_mode(&path, mode) {
                self.snapshot.insert(path.clone(), mode);
                return Err(PreserveError::PermissionDenied { path, source });
            }
            debug!(path = %path.display(), mode = format!("{mode:o}"), "Restored permissions");
        }
        Ok(())
    }
}

/// Whether `path` exists, looking past ancestors inside `root` that are not
/// searchable. Modes relaxed for the check are put back before returning.
pub fn probe_exists(fs: &dyn Filesystem, root: &Path, path: &Path) -> Result<bool, PreserveError> {
    let mut scoped = PermissionGuard::new();
    let mut found = None;
    for dir in ancestors_within(root, path) {
        if !fs.is_dir(&dir) {
            found = Some(false);
            break;
        }
        if !fs.is_writable(&dir) {
            if let Err(e) = scoped.relax(fs, &dir, WRITABLE_DIR_MODE) {
                scoped.restore(fs)?;
                return Err(e);
            }
        }
    }
    let exists = found.unwrap_or_else(|| fs.exists(path));
    scoped.restore(fs)?;
    Ok(exists)
}
