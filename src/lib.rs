//! Core library for `preserve_paths`.
//!
//! Keeps user-designated files and directories alive while a package manager
//! deletes and rewrites an install directory: the paths are moved into a
//! scratch area before the package is written and moved back afterwards.
//!
//! Layout:
//! - `preserver`: the backup/restore engine for one operation.
//! - `session`: one preserver per live package operation.
//! - `permissions`: temporarily relaxes modes that would block the moves.
//! - `fs_adapter`: the filesystem capability the engine runs on.
//! - `config`, `cli`, `output`, `shutdown`: the binary's ambient pieces.

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs_adapter;
pub mod notice;
pub mod output;
pub mod paths;
pub mod permissions;
pub mod platform;
pub mod preserver;
pub mod session;
pub mod shutdown;
mod utils;

pub use config::{
    Config, LogLevel, default_cache_dir, default_config_path, default_log_path,
    load_config_from_xml_path, path_has_symlink_ancestor, validate_and_normalize,
};
pub use errors::{PreserveError, RestoreStep};
pub use fs_adapter::{Filesystem, LocalFs, SourceNotRemoved};
#[cfg(any(test, feature = "test-helpers"))]
pub use fs_adapter::MemoryFs;
pub use notice::{ConsoleNotifier, LogNotifier, Notify};
#[cfg(any(test, feature = "test-helpers"))]
pub use notice::RecordingNotifier;
pub use permissions::{PermissionGuard, probe_exists};
pub use preserver::{BackupEntry, Preserver};
pub use session::{Package, PackageOperation, PreserveSessions};
