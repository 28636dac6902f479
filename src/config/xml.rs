//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Creates a secure template if missing (unless PRESERVE_PATHS_CONFIG is set).
//!
//! Notes:
//! - This module only reads/writes the config file; directory validation happens elsewhere.
//! - Unknown XML elements are rejected so typos do not silently drop settings.

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::CONFIG_ENV_VAR;
use super::paths::{default_cache_dir, default_config_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel};
use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    #[serde(rename = "cache_dir")]
    cache_dir: Option<String>,
    #[serde(rename = "log_level")]
    log_level: Option<String>,
    #[serde(rename = "log_file")]
    log_file: Option<String>,
    #[serde(rename = "preserve_paths")]
    preserve_paths: Option<XmlPreservePaths>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlPreservePaths {
    #[serde(rename = "path", default)]
    paths: Vec<String>,
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|t| !t.is_empty())
}

// Map XmlConfig -> Config
fn xml_to_config(parsed: XmlConfig, origin: &Path) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(dir) = non_empty(parsed.cache_dir.as_deref()) {
        cfg.cache_dir = PathBuf::from(dir);
    }
    if let Some(file) = non_empty(parsed.log_file.as_deref()) {
        cfg.log_file = Some(PathBuf::from(file));
    }
    if let Some(level) = non_empty(parsed.log_level.as_deref()) {
        cfg.log_level = level
            .parse::<LogLevel>()
            .map_err(|e| anyhow!("{e} in '{}'", origin.display()))?;
    }
    let listed = parsed.preserve_paths.unwrap_or_default().paths;
    cfg.add_preserve_paths(
        listed
            .iter()
            .filter_map(|p| non_empty(Some(p.as_str())))
            .map(PathBuf::from),
    );

    Ok(cfg)
}

/// Load a Config from a specific XML file path (quick_xml).
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    let cfg = xml_to_config(parsed, path)?;
    debug!(path = %path.display(), preserve_paths = cfg.preserve_paths.len(), "Loaded config");
    Ok(cfg)
}

/// Load the active config.
/// - `PRESERVE_PATHS_CONFIG` set: that file must exist and parse.
/// - Otherwise the default file is used when present, else defaults.
///
/// Returns the config and the file it came from, if any.
pub fn load_config() -> Result<(Config, Option<PathBuf>)> {
    let env_set = env::var_os(CONFIG_ENV_VAR).is_some();
    let path = default_config_path()?;
    if !path.exists() {
        if env_set {
            bail!(
                "{CONFIG_ENV_VAR} points to '{}', which does not exist",
                path.display()
            );
        }
        debug!(path = %path.display(), "No config file; using defaults");
        return Ok((Config::default(), None));
    }
    let cfg = load_config_from_xml_path(&path)?;
    Ok((cfg, Some(path)))
}

/// Create default template config file and parent directory (best-effort permissions).
/// Uses secure creation to avoid following attacker-controlled symlinks on Unix.
pub fn create_template_config(path: &Path) -> Result<()> {
    if fs::symlink_metadata(path).is_ok() {
        bail!("Refusing to overwrite existing config at {}", path.display());
    }
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let content = format!(
        "<!--\n  preserve_paths configuration (XML)\n\n  Fields:\n    cache_dir       -> scratch directory for backups (must not be inside an install path)\n    log_level       -> quiet | normal | info | debug\n    log_file        -> path to log file (optional; stdout/stderr still used)\n    preserve_paths  -> one <path> per file or directory to keep across installs;\n                       relative paths are taken from the working directory\n\n  Notes:\n    - CLI flags override XML values; --preserve adds to the list below.\n-->\n<config>\n  <cache_dir>{}</cache_dir>\n  <log_level>normal</log_level>\n  <log_file></log_file>\n  <preserve_paths>\n  </preserve_paths>\n</config>\n",
        default_cache_dir().display()
    );

    // Atomic, secure write (O_NOFOLLOW + create_new on Unix), then tighten perms.
    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

/// Create the default config if PRESERVE_PATHS_CONFIG is not set; return the
/// created path so the CLI can inform the user.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    if env::var_os(CONFIG_ENV_VAR).is_some() {
        return None;
    }
    let cfg_path = default_config_path().ok()?;
    if cfg_path.exists() {
        return None;
    }
    match create_template_config(&cfg_path) {
        Ok(()) => Some(cfg_path),
        Err(e) => {
            debug!(path = %cfg_path.display(), error = %e, "Could not create template config");
            None
        }
    }
}
