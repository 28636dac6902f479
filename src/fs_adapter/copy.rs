//! Cross-device fallback for rename: copy a file or tree, keeping bytes,
//! permission modes, symlinks and modification times.

use filetime::{FileTime, set_file_times, set_symlink_file_times};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::platform;

pub(super) fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if !meta.is_dir() {
        return copy_entry(src, dst, &meta);
    }

    // Directory modes are applied last (deepest first) so read-only
    // directories can still be filled while copying.
    let mut dirs: Vec<(PathBuf, Metadata)> = Vec::new();
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dst.join(rel);
        let meta = fs::symlink_metadata(entry.path())?;
        if meta.is_dir() {
            fs::create_dir(&target)?;
            dirs.push((target, meta));
        } else {
            copy_entry(entry.path(), &target, &meta)?;
        }
    }

    for (target, meta) in dirs.into_iter().rev() {
        platform::write_mode(&target, platform::mode_of(&meta))?;
        let _ = set_file_times(
            &target,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        );
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, meta: &Metadata) -> io::Result<()> {
    let atime = FileTime::from_last_access_time(meta);
    let mtime = FileTime::from_last_modification_time(meta);

    if meta.file_type().is_symlink() {
        let target = fs::read_link(src)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&target, dst)?;
        #[cfg(windows)]
        std::os::windows::fs::symlink_file(&target, dst)?;
        let _ = set_symlink_file_times(dst, atime, mtime);
        return Ok(());
    }

    // fs::copy carries the permission bits over.
    fs::copy(src, dst)?;
    let _ = set_file_times(dst, atime, mtime);
    Ok(())
}
