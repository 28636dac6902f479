//! Default path helpers and symlink checks.
//! Determines OS-appropriate config/cache/log paths and detects symlinked ancestors for safety.

use anyhow::{Result, anyhow};
use dirs::{cache_dir, config_dir, data_dir};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{APP_DIR_NAME, CONFIG_ENV_VAR};

/// Config file location.
/// - `PRESERVE_PATHS_CONFIG` wins; a relative value is taken from the current
///   directory and a directory value means `<dir>/config.xml`.
/// - Otherwise `<platform config dir>/preserve_paths/config.xml`.
pub fn default_config_path() -> Result<PathBuf> {
    if let Some(raw) = env::var_os(CONFIG_ENV_VAR) {
        let mut p = PathBuf::from(raw);
        if p.as_os_str().is_empty() {
            return Err(anyhow!("{CONFIG_ENV_VAR} is set but empty"));
        }
        if p.is_relative() {
            p = env::current_dir()?.join(p);
        }
        if p.is_dir() {
            p.push("config.xml");
        }
        return Ok(p);
    }
    let mut base = config_dir()
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or_else(|| anyhow!("cannot determine a config directory"))?;
    base.push(APP_DIR_NAME);
    base.push("config.xml");
    Ok(base)
}

/// Scratch root used when neither the config nor the CLI name one.
pub fn default_cache_dir() -> PathBuf {
    cache_dir()
        .unwrap_or_else(env::temp_dir)
        .join(APP_DIR_NAME)
}

/// OS-appropriate default log file path (data dir). Parent is created best-effort.
pub fn default_log_path() -> Result<PathBuf> {
    let mut base = data_dir()
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .ok_or_else(|| anyhow!("cannot determine a data directory"))?;
    base.push(APP_DIR_NAME);
    let _ = fs::create_dir_all(&base);
    base.push("preserve_paths.log");
    Ok(base)
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        match fs::symlink_metadata(anc) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        p = anc.parent();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn env_directory_means_config_xml_inside() {
        let td = tempdir().unwrap();
        unsafe { env::set_var(CONFIG_ENV_VAR, td.path()) };
        let got = default_config_path();
        unsafe { env::remove_var(CONFIG_ENV_VAR) };
        assert_eq!(got.unwrap(), td.path().join("config.xml"));
    }

    #[test]
    #[serial]
    fn env_file_is_used_verbatim() {
        let td = tempdir().unwrap();
        let file = td.path().join("custom.xml");
        unsafe { env::set_var(CONFIG_ENV_VAR, &file) };
        let got = default_config_path();
        unsafe { env::remove_var(CONFIG_ENV_VAR) };
        assert_eq!(got.unwrap(), file);
    }

    #[test]
    fn cache_dir_ends_with_app_name() {
        assert!(default_cache_dir().ends_with(APP_DIR_NAME));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_ancestor_is_detected() {
        let td = tempdir().unwrap();
        let real = td.path().join("real");
        fs::create_dir_all(&real).unwrap();
        let link = td.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(path_has_symlink_ancestor(&link.join("x/config.xml")).unwrap());
        assert!(!path_has_symlink_ancestor(&real.join("config.xml")).unwrap());
    }
}
