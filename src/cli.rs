//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Everything after `--` is the command to run while paths are preserved.
//! - --debug is a shorthand for --log-level debug.

use clap::{ArgAction, Parser, ValueHint};
use std::ffi::OsString;
use std::path::PathBuf;

use crate::config::types::{Config, LogLevel};

/// Keep selected files and directories safe while a package is (re)installed.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "preserve-paths",
    author,
    version,
    about = "Move preserved paths aside, run an install command, then put them back"
)]
pub struct Args {
    /// Directory the package manager is about to write (repeatable).
    #[arg(
        short = 'i',
        long = "install-path",
        value_name = "INSTALL_PATH",
        value_hint = ValueHint::DirPath,
        num_args = 1..,
        action = ArgAction::Append,
        required_unless_present = "print_config"
    )]
    pub install_paths: Vec<PathBuf>,

    /// Path to keep across the install (repeatable; added to the config list).
    #[arg(short = 'p', long = "preserve", value_name = "PATH", value_hint = ValueHint::AnyPath, action = ArgAction::Append)]
    pub preserve: Vec<PathBuf>,

    /// Override the scratch directory backups are moved into.
    #[arg(long, value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Name for this run in logs (defaults to the joined install paths).
    #[arg(long, value_name = "NAME")]
    pub operation: Option<String>,

    /// List the paths that would be moved aside, then exit without touching anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the config file location used by preserve-paths and exit.
    #[arg(long)]
    pub print_config: bool,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    /// Also write logs to this file.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long)]
    pub json: bool,

    /// Command to run while the paths are moved aside.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<OsString>,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    s.parse()
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level
    }

    /// Session key: `--operation`, else the install paths joined with `", "`.
    pub fn operation_key(&self, roots: &[PathBuf]) -> String {
        match &self.operation {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => roots
                .iter()
                .map(|r| r.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(dir) = &self.cache_dir {
            cfg.cache_dir = dir.clone();
        }
        cfg.add_preserve_paths(self.preserve.iter().cloned());
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(file) = &self.log_file {
            cfg.log_file = Some(file.clone());
        }
        if self.dry_run {
            cfg.dry_run = true;
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_paths_and_trailing_command() {
        let args = Args::try_parse_from([
            "preserve-paths", "-i", "web/core", "-i", "vendor/x", "-p", "web/sites", "--", "composer",
            "install", "--no-dev",
        ])
        .unwrap();
        assert_eq!(args.install_paths, vec![PathBuf::from("web/core"), PathBuf::from("vendor/x")]);
        assert_eq!(args.preserve, vec![PathBuf::from("web/sites")]);
        assert_eq!(args.command, vec!["composer", "install", "--no-dev"]);
    }

    #[test]
    fn install_path_is_required_unless_printing_config() {
        assert!(Args::try_parse_from(["preserve-paths"]).is_err());
        assert!(Args::try_parse_from(["preserve-paths", "--print-config"]).is_ok());
    }

    #[test]
    fn debug_wins_over_log_level() {
        let args =
            Args::try_parse_from(["preserve-paths", "-i", "/w", "--log-level", "quiet", "-d"]).unwrap();
        assert_eq!(args.effective_log_level(), Some(LogLevel::Debug));
        assert!(Args::try_parse_from(["preserve-paths", "-i", "/w", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn overrides_merge_into_config() {
        let args = Args::try_parse_from([
            "preserve-paths", "-i", "/w", "-p", "/w/b", "--cache-dir", "/scratch", "--dry-run",
        ])
        .unwrap();
        let mut cfg = Config::new("/cache", ["/w/a"]);
        args.apply_overrides(&mut cfg);
        assert_eq!(cfg.cache_dir, PathBuf::from("/scratch"));
        assert_eq!(cfg.preserve_paths, vec![PathBuf::from("/w/a"), PathBuf::from("/w/b")]);
        assert!(cfg.dry_run);
    }

    #[test]
    fn operation_key_defaults_to_install_paths() {
        let args = Args::try_parse_from(["preserve-paths", "-i", "/a", "/b"]).unwrap();
        let roots = args.install_paths.clone();
        assert_eq!(args.operation_key(&roots), "/a, /b");
        let named = Args::try_parse_from(["preserve-paths", "-i", "/a", "--operation", "core-10"]).unwrap();
        assert_eq!(named.operation_key(&roots), "core-10");
    }
}
