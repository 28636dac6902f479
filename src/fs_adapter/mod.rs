//! Filesystem capability used by the preserver.
//!
//! The preserver never touches the disk directly; it goes through the
//! [`Filesystem`] trait so tests can swap in an in-memory tree.
//!
//! Implementations:
//! - [`LocalFs`]: the real filesystem (atomic rename with a cross-device copy fallback).
//! - [`MemoryFs`]: in-memory double with owner-only permission checks (test builds
//!   or the `test-helpers` feature).

mod copy;
mod helpers;
mod local;
#[cfg(any(test, feature = "test-helpers"))]
mod memory;

pub use helpers::{hint, io_error_with_help};
pub use local::LocalFs;
#[cfg(any(test, feature = "test-helpers"))]
pub use memory::MemoryFs;

use std::io;
use std::path::{Path, PathBuf};

/// A move that copied everything to the destination but could not fully
/// remove the source. The destination is the complete copy.
#[derive(Debug, thiserror::Error)]
#[error("copied to the destination, but the source was only partly removed: {error}")]
pub struct SourceNotRemoved {
    pub error: io::Error,
}

impl SourceNotRemoved {
    /// Wrap the removal failure, keeping its kind.
    pub fn wrap(error: io::Error) -> io::Error {
        io::Error::new(error.kind(), SourceNotRemoved { error })
    }
}

/// Whether a failed `rename` left a complete copy at the destination.
pub fn is_source_not_removed(e: &io::Error) -> bool {
    e.get_ref().is_some_and(|inner| inner.is::<SourceNotRemoved>())
}

/// Primitive operations the preserver depends on.
///
/// `exists`, `is_dir` and `is_symlink` report `false` when the path cannot be
/// inspected (missing, or an ancestor is not searchable).
pub trait Filesystem {
    /// Lexically normalize a path.
    fn normalize(&self, path: &Path) -> PathBuf {
        crate::paths::normalize(path)
    }

    /// Whether anything (file, directory or symlink) is present at `path`.
    /// Symlinks are not followed.
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_symlink(&self, path: &Path) -> bool;

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool>;

    /// Whether the current user may modify `path`. For directories this also
    /// requires search permission, since entries cannot be created or removed without it.
    fn is_writable(&self, path: &Path) -> bool;

    /// Move a file or a whole directory tree. The destination must not exist.
    ///
    /// A failure wrapping [`SourceNotRemoved`] means the destination already
    /// holds the full tree and the source is partly gone; any other failure
    /// leaves the source untouched.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Remove a directory and everything below it, regardless of the modes inside.
    fn remove_tree(&self, path: &Path) -> io::Result<()>;

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()>;

    /// Create `path` and any missing parents.
    fn ensure_dir(&self, path: &Path) -> io::Result<()>;

    /// Permission bits of `path` (e.g. `0o755`).
    fn mode(&self, path: &Path) -> io::Result<u32>;

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;
}
