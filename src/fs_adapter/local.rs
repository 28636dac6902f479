//! Local-disk implementation of [`Filesystem`].
//! - rename: atomic rename, then a best-effort fsync of the destination directory.
//! - Cross-device renames fall back to copy + remove (see `copy.rs`).
//! - remove_tree: makes directories owner-writable first so read-only trees can be deleted.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::copy::copy_tree;
use super::{Filesystem, SourceNotRemoved};
use crate::platform;

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        LocalFs
    }
}

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    }

    fn is_symlink(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false)
    }

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool> {
        Ok(fs::read_dir(path)?.next().is_none())
    }

    fn is_writable(&self, path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            // Links carry no meaningful mode of their own.
            Ok(meta) if meta.file_type().is_symlink() => true,
            Ok(meta) => platform::is_writable(path, meta.is_dir()),
            Err(_) => false,
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Ok(()) => {
                #[cfg(unix)]
                if let Some(parent) = to.parent() {
                    // Ignore fsync errors to avoid turning a successful rename into a failure.
                    let _ = fs::File::open(parent).and_then(|d| d.sync_all());
                }
                Ok(())
            }
            Err(e) if platform::is_cross_device(&e) => {
                warn!(src = %from.display(), dest = %to.display(), "Atomic rename crosses filesystems; copying instead");
                if let Err(copy_err) = copy_tree(from, to) {
                    let _ = self.remove_tree(to);
                    return Err(copy_err);
                }
                self.remove_tree(from).map_err(|e| {
                    warn!(src = %from.display(), error = %e, "Copied across filesystems but could not remove the source");
                    SourceNotRemoved::wrap(e)
                })
            }
            Err(e) => Err(e),
        }
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        let meta = fs::symlink_metadata(path)?;
        if !meta.is_dir() {
            return fs::remove_file(path);
        }

        // Parents are yielded before their contents, so each directory becomes
        // searchable before walkdir descends into it.
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() && !platform::is_writable(entry.path(), true) {
                let mode = platform::read_mode(entry.path())?;
                platform::write_mode(entry.path(), mode | 0o700)?;
                debug!(path = %entry.path().display(), "Relaxed directory mode before removal");
            }
        }
        fs::remove_dir_all(path)
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        platform::read_mode(path)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        platform::write_mode(path, mode)
    }
}
