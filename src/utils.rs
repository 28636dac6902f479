use std::fs;
use std::path::{Path, PathBuf};

use crate::paths::normalize;

/// Make `path` absolute against `base` (when relative) and normalize it.
/// - Absolute paths ignore `base`.
/// - No disk access; symlinks are not resolved.
pub(crate) fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// `absolutize` over a list, dropping empty entries.
pub(crate) fn absolutize_all<I, P>(base: &Path, paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .filter(|p| !p.as_ref().as_os_str().is_empty())
        .map(|p| absolutize(base, p.as_ref()))
        .collect()
}

/// Quick writable probe: create and remove a small file in `dir`.
/// Uses create_new to avoid clobbering existing files.
pub(crate) fn is_writable_probe(dir: &Path) -> std::io::Result<()> {
    let probe = dir.join(format!(".preserve_paths_probe_{}.tmp", std::process::id()));
    fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&probe)?;
    let _ = fs::remove_file(&probe);
    Ok(())
}
