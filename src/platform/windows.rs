//! Windows fallbacks for platform helpers.
//! Windows has no POSIX mode bits; the read-only attribute is mapped onto
//! the owner write bit so mode snapshots still round-trip.

use anyhow::{Context, Result};
use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use super::temp::tmp_config_sibling_name;

pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = tmp_config_sibling_name(path);
    {
        let mut f = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .with_context(|| format!("create temp '{}'", tmp.display()))?;
        f.write_all(contents).context("write temp")?;
        f.sync_all().context("fsync temp")?;
    }
    if path.exists() {
        let _ = fs::remove_file(path);
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("rename '{}' -> '{}'", tmp.display(), path.display()))
}

pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn set_file_mode_0600(_path: &Path) -> io::Result<()> {
    Ok(())
}

pub fn mode_of(meta: &Metadata) -> u32 {
    let base = if meta.is_dir() { 0o555 } else { 0o444 };
    if meta.permissions().readonly() { base } else { base | 0o222 }
}

pub fn read_mode(path: &Path) -> io::Result<u32> {
    fs::metadata(path).map(|m| mode_of(&m))
}

pub fn write_mode(path: &Path, mode: u32) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)
}

pub fn is_writable(path: &Path, _is_dir: bool) -> bool {
    fs::metadata(path).map(|m| !m.permissions().readonly()).unwrap_or(false)
}

/// ERROR_NOT_SAME_DEVICE
pub fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(17)
}
