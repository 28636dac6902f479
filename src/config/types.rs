//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::paths;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Warnings and notices (default)
    #[default]
    Normal,
    /// One line per preserved/restored path
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" | "warn" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Scratch root; backups live under `<cache_dir>/preserve-paths/`
    pub cache_dir: PathBuf,
    /// Paths to keep safe while a package is written
    pub preserve_paths: Vec<PathBuf>,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// If true, report threatened paths but do not move anything
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: paths::default_cache_dir(),
            preserve_paths: Vec::new(),
            log_level: LogLevel::Normal,
            log_file: None,
            dry_run: false,
        }
    }
}

impl Config {
    /// Construct a Config with explicit cache dir and preserve paths; other fields use defaults.
    pub fn new<I, P>(cache_dir: impl Into<PathBuf>, preserve_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            cache_dir: cache_dir.into(),
            preserve_paths: preserve_paths.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Append preserve paths, skipping ones already present.
    pub fn add_preserve_paths<I, P>(&mut self, extra: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for p in extra {
            let p = p.into();
            if !self.preserve_paths.contains(&p) {
                self.preserve_paths.push(p);
            }
        }
    }
}
