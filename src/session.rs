//! Per-operation bookkeeping for a package manager run.
//!
//! A package operation (install, update, uninstall) is announced before and
//! after it touches the disk. `PreserveSessions` builds one `Preserver` when
//! the operation starts, keeps it under the operation's key while the package
//! manager works, and rolls it back when the operation ends.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::PreserveError;
use crate::fs_adapter::Filesystem;
use crate::notice::Notify;
use crate::preserver::{BackupEntry, Preserver};
use crate::utils::{absolutize, absolutize_all};

/// A package as seen by the package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: String,
    /// Where the package gets installed; relative paths are taken against the
    /// session base directory.
    pub install_path: PathBuf,
}

impl Package {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        install_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            install_path: install_path.into(),
        }
    }

    /// `name-version`, unique per package release.
    pub fn unique_name(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOperation {
    Install(Package),
    /// Both packages are involved: the old one is removed from its path and the
    /// new one written to its own.
    Update { initial: Package, target: Package },
    Uninstall(Package),
}

impl PackageOperation {
    pub fn packages(&self) -> Vec<&Package> {
        match self {
            PackageOperation::Install(p) | PackageOperation::Uninstall(p) => vec![p],
            PackageOperation::Update { initial, target } => vec![initial, target],
        }
    }

    /// Sorted, de-duplicated unique names joined with `", "`.
    pub fn key(&self) -> String {
        let mut names: Vec<String> = self.packages().iter().map(|p| p.unique_name()).collect();
        names.sort();
        names.dedup();
        names.join(", ")
    }

    pub fn install_paths(&self) -> Vec<PathBuf> {
        self.packages().iter().map(|p| p.install_path.clone()).collect()
    }
}

impl fmt::Display for PackageOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOperation::Install(p) => write!(f, "install {}", p.unique_name()),
            PackageOperation::Update { initial, target } => {
                write!(f, "update {} -> {}", initial.unique_name(), target.unique_name())
            }
            PackageOperation::Uninstall(p) => write!(f, "uninstall {}", p.unique_name()),
        }
    }
}

/// Live preservers keyed by operation.
pub struct PreserveSessions<'a> {
    base_dir: PathBuf,
    preserve_paths: Vec<PathBuf>,
    scratch_root: PathBuf,
    fs: &'a dyn Filesystem,
    notifier: &'a dyn Notify,
    active: BTreeMap<String, Preserver<'a>>,
}

impl fmt::Debug for PreserveSessions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreserveSessions")
            .field("base_dir", &self.base_dir)
            .field("preserve_paths", &self.preserve_paths)
            .field("scratch_root", &self.scratch_root)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<'a> PreserveSessions<'a> {
    /// `base_dir` is the project directory relative paths are resolved from.
    pub fn new<P>(
        base_dir: impl AsRef<Path>,
        preserve_paths: P,
        scratch_root: impl AsRef<Path>,
        fs: &'a dyn Filesystem,
        notifier: &'a dyn Notify,
    ) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<Path>,
    {
        let base_dir = fs.normalize(base_dir.as_ref());
        Self {
            preserve_paths: absolutize_all(&base_dir, preserve_paths),
            scratch_root: absolutize(&base_dir, scratch_root.as_ref()),
            base_dir,
            fs,
            notifier,
            active: BTreeMap::new(),
        }
    }

    /// Preserve every configured path threatened by changes under `roots`.
    ///
    /// The session is stored even when preserving fails part-way, so `finish`
    /// can still bring back whatever was already moved.
    pub fn begin<R>(&mut self, key: &str, roots: R) -> Result<(), PreserveError>
    where
        R: IntoIterator,
        R::Item: AsRef<Path>,
    {
        if self.active.contains_key(key) {
            return Err(PreserveError::SessionActive(key.to_string()));
        }
        let roots = absolutize_all(&self.base_dir, roots);
        let mut preserver = Preserver::new(
            roots,
            &self.preserve_paths,
            &self.scratch_root,
            self.fs,
            self.notifier,
        )?;
        let result = preserver.preserve();
        debug!(key, moved = preserver.pending_backups().len(), "Session started");
        self.active.insert(key.to_string(), preserver);
        result
    }

    /// Roll back and forget the session. `Ok(false)` when no session exists
    /// under `key`. A failed rollback keeps the session for another attempt.
    pub fn finish(&mut self, key: &str) -> Result<bool, PreserveError> {
        let Some(preserver) = self.active.get_mut(key) else {
            debug!(key, "No session to finish");
            return Ok(false);
        };
        if let Err(e) = preserver.rollback() {
            warn!(key, error = %e, "Rollback failed; session kept");
            return Err(e);
        }
        self.active.remove(key);
        info!(key, "Session finished");
        Ok(true)
    }

    /// Hook for "package operation about to run".
    pub fn before_apply(&mut self, op: &PackageOperation) -> Result<(), PreserveError> {
        info!(operation = %op, "Preserving paths before operation");
        self.begin(&op.key(), op.install_paths())
    }

    /// Hook for "package operation done".
    pub fn after_apply(&mut self, op: &PackageOperation) -> Result<bool, PreserveError> {
        self.finish(&op.key())
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains_key(key)
    }

    pub fn active_keys(&self) -> impl Iterator<Item = &str> {
        self.active.keys().map(String::as_str)
    }

    /// Backups still waiting to be restored for `key`.
    pub fn pending_backups(&self, key: &str) -> Option<&BTreeMap<PathBuf, BackupEntry>> {
        self.active.get(key).map(|p| p.pending_backups())
    }

    pub fn preserve_paths(&self) -> &[PathBuf] {
        &self.preserve_paths
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs_adapter::MemoryFs;
    use crate::notice::RecordingNotifier;

    fn pkg(name: &str, version: &str, path: &str) -> Package {
        Package::new(name, version, path)
    }

    #[test]
    fn keys_are_sorted_and_joined() {
        let update = PackageOperation::Update {
            initial: pkg("drupal/core", "9.5.0", "web/core"),
            target: pkg("drupal/core", "10.1.0", "web/core"),
        };
        assert_eq!(update.key(), "drupal/core-10.1.0, drupal/core-9.5.0");
        assert_eq!(update.install_paths().len(), 2);

        let install = PackageOperation::Install(pkg("a/b", "1.0", "vendor/a/b"));
        assert_eq!(install.key(), "a/b-1.0");
        assert_eq!(install.to_string(), "install a/b-1.0");
    }

    #[test]
    fn relative_paths_resolve_against_base() {
        let fs = MemoryFs::new();
        let notes = RecordingNotifier::new();
        let sessions = PreserveSessions::new("/project", ["web/sites/default", "/abs"], ".cache", &fs, &notes);
        assert_eq!(
            sessions.preserve_paths(),
            &[PathBuf::from("/project/web/sites/default"), PathBuf::from("/abs")]
        );
    }

    #[test]
    fn update_preserves_and_restores() {
        let fs = MemoryFs::new()
            .with_file("/project/web/core/settings.php", b"secret", 0o644)
            .with_file("/project/web/core/core.php", b"v9", 0o644)
            .with_dir("/project/.cache", 0o755);
        let notes = RecordingNotifier::new();
        let mut sessions = PreserveSessions::new(
            "/project",
            ["web/core/settings.php"],
            ".cache",
            &fs,
            &notes,
        );
        let op = PackageOperation::Update {
            initial: pkg("drupal/core", "9", "web/core"),
            target: pkg("drupal/core", "10", "web/core"),
        };

        sessions.before_apply(&op).unwrap();
        assert!(sessions.is_active(&op.key()));
        assert!(!fs.contains("/project/web/core/settings.php"));

        // The update replaces the package directory.
        fs.remove_tree(Path::new("/project/web/core")).unwrap();
        fs.put_file("/project/web/core/core.php", b"v10");

        assert!(sessions.after_apply(&op).unwrap());
        assert!(!sessions.is_active(&op.key()));
        assert_eq!(fs.read("/project/web/core/settings.php").unwrap(), b"secret");
        assert_eq!(fs.read("/project/web/core/core.php").unwrap(), b"v10");
    }

    #[test]
    fn finishing_an_unknown_session_is_a_no_op() {
        let fs = MemoryFs::new();
        let notes = RecordingNotifier::new();
        let mut sessions = PreserveSessions::new("/p", ["x"], "/cache", &fs, &notes);
        assert!(!sessions.finish("nobody-1.0").unwrap());
        assert_eq!(fs.mutation_count(), 0);
    }

    #[test]
    fn second_begin_for_same_key_is_refused() {
        let fs = MemoryFs::new().with_dir("/p/pkg", 0o755);
        let notes = RecordingNotifier::new();
        let mut sessions = PreserveSessions::new("/p", ["pkg/keep"], "/cache", &fs, &notes);
        sessions.begin("k", ["pkg"]).unwrap();
        assert!(matches!(
            sessions.begin("k", ["pkg"]),
            Err(PreserveError::SessionActive(_))
        ));
        assert_eq!(sessions.active_keys().collect::<Vec<_>>(), vec!["k"]);
    }

    #[test]
    fn failed_rollback_keeps_session_for_retry() {
        let fs = MemoryFs::new()
            .with_file("/p/pkg/keep", b"k", 0o644)
            .with_dir("/cache", 0o755);
        let notes = RecordingNotifier::new();
        let mut sessions = PreserveSessions::new("/p", ["pkg/keep"], "/cache", &fs, &notes);
        sessions.begin("k", ["pkg"]).unwrap();

        let location = sessions.pending_backups("k").unwrap()[Path::new("/p/pkg/keep")]
            .location
            .clone();
        fs.fail_rename(&location);
        assert!(sessions.finish("k").is_err());
        assert!(sessions.is_active("k"));
        assert_eq!(sessions.pending_backups("k").unwrap().len(), 1);
    }

    #[test]
    fn partial_preserve_is_still_recoverable() {
        let fs = MemoryFs::new()
            .with_file("/p/pkg/a", b"a", 0o644)
            .with_file("/p/pkg/b", b"b", 0o644)
            .with_dir("/cache", 0o755);
        fs.fail_rename("/p/pkg/b");
        let notes = RecordingNotifier::new();
        let mut sessions = PreserveSessions::new("/p", ["pkg/a", "pkg/b"], "/cache", &fs, &notes);

        assert!(sessions.begin("k", ["pkg"]).is_err());
        assert!(sessions.is_active("k"));
        assert!(sessions.finish("k").unwrap());
        assert_eq!(fs.read("/p/pkg/a").unwrap(), b"a");
        assert_eq!(fs.read("/p/pkg/b").unwrap(), b"b");
    }
}
