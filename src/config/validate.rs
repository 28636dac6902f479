//! Config validation logic.
//! Makes every configured path absolute, prepares the cache dir and refuses
//! layouts where backups would be written into the area being replaced.

use anyhow::{Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::fs_adapter::io_error_with_help;
use crate::paths::is_within;
use crate::utils::{absolutize, absolutize_all, is_writable_probe};

use super::types::Config;

/// Normalize `cfg` in place against `base_dir` and return the absolute install roots.
///
/// - Relative cache dir, log file and preserve paths are taken from `base_dir`.
/// - The cache dir is created when missing (not in dry-run) and must be writable.
/// - The cache dir must not be, or lie inside, an install root.
/// - Preserve paths outside every install root are kept but logged, since
///   they will never be touched.
pub fn validate_and_normalize(
    cfg: &mut Config,
    install_roots: &[PathBuf],
    base_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let roots = absolutize_all(base_dir, install_roots);
    if roots.is_empty() {
        bail!("at least one install path is required");
    }
    cfg.cache_dir = absolutize(base_dir, &cfg.cache_dir);
    cfg.preserve_paths = absolutize_all(base_dir, &cfg.preserve_paths);
    cfg.log_file = cfg.log_file.as_deref().map(|p| absolutize(base_dir, p));

    let cache = &cfg.cache_dir;
    let cache_real = resolve(cache);
    for root in &roots {
        let root_real = resolve(root);
        if cache_real == root_real || is_within(&root_real, &cache_real) {
            error!("cache_dir {} lies inside install path {}", cache.display(), root.display());
            bail!(
                "cache_dir '{}' must not be inside install path '{}'; the install would overwrite the backups",
                cache.display(),
                root.display()
            );
        }
    }

    for p in &cfg.preserve_paths {
        if !roots.iter().any(|r| is_within(r, p)) {
            warn!(path = %p.display(), "Preserve path is outside every install path; it will be left alone");
        }
    }

    if cfg.dry_run {
        debug!(cache_dir = %cache.display(), "Dry run: cache dir not prepared");
    } else {
        ensure_dir_is_or_create(cache, "cache_dir")?;
        ensure_writable(cache, "cache_dir")?;
    }

    info!(
        "Config validated: cache_dir='{}' preserve_paths={} install_paths={}",
        cache.display(),
        cfg.preserve_paths.len(),
        roots.len()
    );
    Ok(roots)
}

/// Follow symlinks through the deepest existing ancestor; the missing tail
/// is appended as-is.
fn resolve(path: &Path) -> PathBuf {
    for anc in path.ancestors() {
        if let Ok(real) = dunce::canonicalize(anc) {
            return match path.strip_prefix(anc) {
                Ok(rest) if !rest.as_os_str().is_empty() => real.join(rest),
                _ => real,
            };
        }
    }
    path.to_path_buf()
}

/// Ensure directory exists (create if missing). If exists, it must be a directory.
fn ensure_dir_is_or_create(path: &Path, name: &str) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            error!("{name} exists but isn't a directory: {}", path.display());
            bail!("{name} exists but isn't a directory: {}", path.display());
        }
    } else {
        fs::create_dir_all(path).map_err(io_error_with_help("create directory", path))?;
        info!("Created {name} directory: {}", path.display());
    }
    Ok(())
}

/// Ensure directory is writable using a non-destructive probe file.
fn ensure_writable(path: &Path, name: &str) -> Result<()> {
    is_writable_probe(path).map_err(io_error_with_help("write probe file in", path))?;
    debug!("{name} writable: {}", path.display());
    Ok(())
}
