//! Unix implementations of platform helpers.

use super::common_unix::atomic_write_with_mode;
use anyhow::Result;
use std::ffi::CString;
use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

/// Open log file for appending; set 0600 only when creating a new file.
/// If the file already exists, we preserve its existing permissions to avoid
/// clobbering administrator adjustments (e.g. group-readable for log shipping).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600) // applies on create
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

/// Write config atomically: temp file (0600) + fsync + rename + fsync dir.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    atomic_write_with_mode(path, contents, 0o600)
}

/// POSIX chmod 0700 for directories.
pub fn set_dir_mode_0700(path: &Path) -> io::Result<()> {
    write_mode(path, 0o700)
}

/// POSIX chmod 0600 for files.
pub fn set_file_mode_0600(path: &Path) -> io::Result<()> {
    write_mode(path, 0o600)
}

/// Permission bits (including setuid/setgid/sticky) from metadata.
pub fn mode_of(meta: &Metadata) -> u32 {
    meta.permissions().mode() & 0o7777
}

/// Permission bits of `path` (follows symlinks).
pub fn read_mode(path: &Path) -> io::Result<u32> {
    fs::metadata(path).map(|m| mode_of(&m))
}

/// chmod `path` to exactly `mode`.
pub fn write_mode(path: &Path, mode: u32) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// access(2) probe for the real user. Directories also need search (X_OK)
/// for entries to be created or removed.
pub fn is_writable(path: &Path, is_dir: bool) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let wanted = if is_dir { libc::W_OK | libc::X_OK } else { libc::W_OK };
    unsafe { libc::access(c_path.as_ptr(), wanted) == 0 }
}

/// EXDEV: rename across filesystems.
pub fn is_cross_device(e: &io::Error) -> bool {
    e.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn running_as_root() -> bool {
        unsafe { libc::geteuid() == 0 }
    }

    #[test]
    fn preserve_existing_log_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_secure_append(&path).unwrap();
        assert_eq!(read_mode(&path).unwrap() & 0o777, 0o640, "existing permissions should be preserved");
    }

    #[test]
    fn atomic_config_write_sets_mode_and_no_temp_leftover() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("config.xml");
        write_config_secure_new_0600(&cfg, b"<x/>").unwrap();
        assert_eq!(fs::read(&cfg).unwrap(), b"<x/>");
        assert_eq!(read_mode(&cfg).unwrap() & 0o777, 0o600);
        for entry in fs::read_dir(dir.path()).unwrap() {
            let p = entry.unwrap().path();
            let name = p.file_name().unwrap().to_string_lossy();
            assert!(!name.starts_with(".preserve_paths.config.tmp."), "leftover temp file: {}", name);
        }
    }

    #[test]
    fn mode_roundtrip_and_writability() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_mode(&sub, 0o500).unwrap();
        assert_eq!(read_mode(&sub).unwrap(), 0o500);
        if !running_as_root() {
            assert!(!is_writable(&sub, true));
        }
        write_mode(&sub, 0o700).unwrap();
        assert!(is_writable(&sub, true));
    }

    #[test]
    fn exdev_is_cross_device() {
        assert!(is_cross_device(&io::Error::from_raw_os_error(libc::EXDEV)));
        assert!(!is_cross_device(&io::Error::from_raw_os_error(libc::EACCES)));
    }
}
