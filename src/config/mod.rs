//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{default_cache_dir, default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use validate::validate_and_normalize;
pub use xml::{
    create_template_config, ensure_default_config_exists, load_config, load_config_from_xml_path,
};

/// Environment variable naming an explicit config file (or a directory holding `config.xml`).
pub const CONFIG_ENV_VAR: &str = "PRESERVE_PATHS_CONFIG";
/// Directory name used under the platform config/cache/data dirs.
pub const APP_DIR_NAME: &str = "preserve_paths";
