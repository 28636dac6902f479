//! Backup/restore engine.
//!
//! A `Preserver` lives for one package operation:
//! - `preserve()` moves every existing preserve path that lies inside an
//!   install root into a fresh backup area under the scratch root;
//! - `rollback()` clears whatever the package put in those places and moves
//!   the backups back, then restores any permissions relaxed on the way.
//!
//! Backup layout: `<scratch>/preserve-paths/<digest(root + time)>/<digest(original)>`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{PreserveError, RestoreStep};
use crate::fs_adapter::{Filesystem, is_source_not_removed};
use crate::notice::Notify;
use crate::paths::{BACKUP_DIR_NAME, backup_area_name, is_within, path_digest};
use crate::permissions::{PermissionGuard, probe_exists};

/// Where one preserved path currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Install root the original lies in.
    pub root: PathBuf,
    /// Location inside the backup area.
    pub location: PathBuf,
}

pub struct Preserver<'a> {
    install_roots: Vec<PathBuf>,
    preserve_paths: Vec<PathBuf>,
    scratch_root: PathBuf,
    fs: &'a dyn Filesystem,
    notifier: &'a dyn Notify,
    backups: BTreeMap<PathBuf, BackupEntry>,
    guard: PermissionGuard,
}

impl std::fmt::Debug for Preserver<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preserver")
            .field("install_roots", &self.install_roots)
            .field("preserve_paths", &self.preserve_paths)
            .field("scratch_root", &self.scratch_root)
            .field("backups", &self.backups)
            .field("guard", &self.guard)
            .finish()
    }
}

fn absolute(fs: &dyn Filesystem, path: &Path, what: &str) -> Result<PathBuf, PreserveError> {
    if path.as_os_str().is_empty() {
        return Err(PreserveError::Configuration(format!("{what} is empty")));
    }
    let normalized = fs.normalize(path);
    if !normalized.is_absolute() {
        return Err(PreserveError::Configuration(format!(
            "{what} must be absolute: {}",
            path.display()
        )));
    }
    Ok(normalized)
}

impl<'a> Preserver<'a> {
    /// Build a preserver. Paths are normalized and de-duplicated; nothing on
    /// disk is touched.
    ///
    /// Fails with [`PreserveError::Configuration`] when there is no install
    /// root, when any path is relative or empty, or when a preserve path is
    /// itself an install root (preserving it would make the root vanish).
    pub fn new<R, P>(
        install_roots: R,
        preserve_paths: P,
        scratch_root: impl AsRef<Path>,
        fs: &'a dyn Filesystem,
        notifier: &'a dyn Notify,
    ) -> Result<Self, PreserveError>
    where
        R: IntoIterator,
        R::Item: AsRef<Path>,
        P: IntoIterator,
        P::Item: AsRef<Path>,
    {
        let roots = install_roots
            .into_iter()
            .map(|p| absolute(fs, p.as_ref(), "install root"))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if roots.is_empty() {
            return Err(PreserveError::Configuration(
                "at least one install root is required".into(),
            ));
        }
        let candidates = preserve_paths
            .into_iter()
            .map(|p| absolute(fs, p.as_ref(), "preserve path"))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if let Some(clash) = candidates.iter().find(|c| roots.contains(*c)) {
            return Err(PreserveError::Configuration(format!(
                "preserve path '{}' is an install root; it cannot be moved aside",
                clash.display()
            )));
        }
        let scratch_root = absolute(fs, scratch_root.as_ref(), "scratch root")?;

        Ok(Self {
            install_roots: roots.into_iter().collect(),
            preserve_paths: candidates.into_iter().collect(),
            scratch_root,
            fs,
            notifier,
            backups: BTreeMap::new(),
            guard: PermissionGuard::new(),
        })
    }

    pub fn install_roots(&self) -> &[PathBuf] {
        &self.install_roots
    }

    /// Original path -> backup entry for everything currently moved aside.
    pub fn pending_backups(&self) -> &BTreeMap<PathBuf, BackupEntry> {
        &self.backups
    }

    /// Preserve paths that exist and lie inside `root`, outermost only:
    /// a path nested in another threatened path travels with its ancestor.
    pub fn threatened_paths(&self, root: &Path) -> Result<Vec<PathBuf>, PreserveError> {
        let root = self.fs.normalize(root);
        let mut threatened: Vec<PathBuf> = Vec::new();
        // preserve_paths is sorted, so ancestors come before their descendants.
        for candidate in &self.preserve_paths {
            if !is_within(&root, candidate) {
                continue;
            }
            if threatened.iter().any(|t| candidate.starts_with(t)) {
                debug!(path = %candidate.display(), "Covered by an enclosing preserve path");
                continue;
            }
            if probe_exists(self.fs, &root, candidate)? {
                threatened.push(candidate.clone());
            } else {
                debug!(path = %candidate.display(), "Preserve path does not exist; ignoring");
            }
        }
        Ok(threatened)
    }

    /// Move every threatened path of every install root into a backup area.
    ///
    /// Fails fast on the first error; paths already moved stay recorded so
    /// `rollback()` can still bring them back. A move that left a complete
    /// backup behind is recorded too, even though it reported an error.
    pub fn preserve(&mut self) -> Result<(), PreserveError> {
        let fs = self.fs;
        for root in self.install_roots.clone() {
            let threatened = self.threatened_paths(&root)?;
            if threatened.is_empty() {
                debug!(root = %root.display(), "Nothing to preserve");
                continue;
            }

            self.guard.prepare(fs, &root, &threatened)?;

            let area = self
                .scratch_root
                .join(BACKUP_DIR_NAME)
                .join(backup_area_name(&root));
            fs.ensure_dir(&area)
                .map_err(|source| PreserveError::BackupArea { path: area.clone(), source })?;

            for original in threatened {
                let location = area.join(path_digest(&original));
                let entry = BackupEntry {
                    root: root.clone(),
                    location: location.clone(),
                };
                match fs.rename(&original, &location) {
                    Ok(()) => {
                        info!(path = %original.display(), backup = %location.display(), "Preserved path");
                        self.backups.insert(original, entry);
                    }
                    Err(source) if is_source_not_removed(&source) => {
                        // The backup is complete; rollback must put it over the leftovers.
                        warn!(path = %original.display(), backup = %location.display(), "Preserved path, but the original was only partly removed");
                        self.backups.insert(original.clone(), entry);
                        return Err(PreserveError::MoveFailed { from: original, to: location, source });
                    }
                    Err(source) => {
                        if fs.is_dir_empty(&area).unwrap_or(false) {
                            let _ = fs.remove_empty_dir(&area);
                        }
                        return Err(PreserveError::MoveFailed { from: original, to: location, source });
                    }
                }
            }
        }
        Ok(())
    }

    /// Put every backed-up path back in place.
    ///
    /// Content found at an original location is removed first, even if it
    /// looks untouched. Each record is dropped as soon as its path is restored,
    /// so a failed rollback can be retried. No-op when nothing was preserved.
    pub fn rollback(&mut self) -> Result<(), PreserveError> {
        if self.backups.is_empty() {
            if !self.guard.is_empty() {
                self.guard.restore(self.fs)?;
            }
            return Ok(());
        }
        let fs = self.fs;

        let mut by_root: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
        for (original, entry) in &self.backups {
            by_root.entry(entry.root.clone()).or_default().push(original.clone());
        }
        for (root, originals) in &by_root {
            self.guard.prepare_parents(fs, root, originals)?;
        }

        let originals: Vec<PathBuf> = self.backups.keys().cloned().collect();
        for original in originals {
            let Some(entry) = self.backups.get(&original).cloned() else {
                continue;
            };
            self.restore_one(&original, &entry.location)?;
            self.backups.remove(&original);
        }

        self.guard.restore(fs)?;
        Ok(())
    }

    fn restore_one(&self, original: &Path, location: &Path) -> Result<(), PreserveError> {
        let fs = self.fs;
        let failed = |step, source| PreserveError::RestoreFailed {
            path: original.to_path_buf(),
            step,
            source,
        };

        if fs.exists(original) {
            let cleared = if fs.is_dir(original) && !fs.is_symlink(original) {
                fs.remove_tree(original)
            } else {
                fs.remove_file(original)
            };
            cleared.map_err(|e| failed(RestoreStep::ClearInstalled, e))?;
            warn!(path = %original.display(), "Installed content replaced by preserved path");
            self.notifier.notice(&format!(
                "Content at {} was overwritten with the preserved copy",
                original.display()
            ));
        }

        if let Some(parent) = original.parent() {
            fs.ensure_dir(parent)
                .map_err(|e| failed(RestoreStep::CreateParent, e))?;
        }

        fs.rename(location, original)
            .map_err(|e| failed(RestoreStep::MoveBack, e))?;
        info!(path = %original.display(), "Restored preserved path");

        if let Some(area) = location.parent() {
            if fs.is_dir_empty(area).unwrap_or(false) {
                match fs.remove_empty_dir(area) {
                    Ok(()) => debug!(area = %area.display(), "Removed empty backup area"),
                    Err(e) => debug!(area = %area.display(), error = %e, "Could not remove backup area"),
                }
            }
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::fs_adapter::MemoryFs;
    use crate::notice::RecordingNotifier;

    const CACHE: &str = "/cache";

    fn scenario() -> MemoryFs {
        MemoryFs::new()
            .with_file("/w/a/x.txt", b"x", 0o644)
            .with_file("/w/f.txt", b"hi", 0o644)
            .with_dir(CACHE, 0o755)
    }

    fn preserver<'a>(fs: &'a MemoryFs, notes: &'a RecordingNotifier, paths: &[&str]) -> Preserver<'a> {
        Preserver::new(["/w"], paths.iter().copied(), CACHE, fs, notes).unwrap()
    }

    #[test]
    fn literal_scenario_round_trips() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/a", "/w/missing", "/w/f.txt"]);

        p.preserve().unwrap();
        assert!(!fs.contains("/w/a"));
        assert!(!fs.contains("/w/f.txt"));
        assert!(!fs.contains("/w/missing"));
        assert_eq!(p.pending_backups().len(), 2);
        for entry in p.pending_backups().values() {
            assert!(entry.location.starts_with("/cache/preserve-paths"));
            assert!(fs.contains(&entry.location));
        }

        p.rollback().unwrap();
        assert_eq!(fs.read("/w/a/x.txt").unwrap(), b"x");
        assert_eq!(fs.read("/w/f.txt").unwrap(), b"hi");
        assert!(p.pending_backups().is_empty());
        assert!(fs.children_of("/cache/preserve-paths").is_empty());
        assert!(notes.messages().is_empty());
    }

    #[test]
    fn rejects_bad_configuration() {
        let fs = MemoryFs::new();
        let notes = RecordingNotifier::new();
        let none: [&str; 0] = [];
        assert!(matches!(
            Preserver::new(none, ["/w/a"], CACHE, &fs, &notes),
            Err(PreserveError::Configuration(_))
        ));
        assert!(matches!(
            Preserver::new(["w"], ["/w/a"], CACHE, &fs, &notes),
            Err(PreserveError::Configuration(_))
        ));
        assert!(matches!(
            Preserver::new(["/w"], ["/w/a"], "", &fs, &notes),
            Err(PreserveError::Configuration(_))
        ));
        assert!(matches!(
            Preserver::new(["/w"], ["/w/./"], CACHE, &fs, &notes),
            Err(PreserveError::Configuration(_))
        ));
    }

    #[test]
    fn containment_is_per_component() {
        let fs = MemoryFs::new()
            .with_dir("/work/parentA/childA", 0o755)
            .with_dir("/work/parentAX", 0o755)
            .with_dir(CACHE, 0o755);
        let notes = RecordingNotifier::new();
        let p = Preserver::new(
            ["/work/parentA"],
            ["/work/parentA/childA", "/work/parentAX", "/work/parentA/../parentAX"],
            CACHE,
            &fs,
            &notes,
        )
        .unwrap();
        assert_eq!(
            p.threatened_paths(Path::new("/work/parentA")).unwrap(),
            vec![PathBuf::from("/work/parentA/childA")]
        );
    }

    #[test]
    fn nested_candidates_travel_with_their_ancestor() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/a/x.txt", "/w/a"]);
        p.preserve().unwrap();
        assert_eq!(p.pending_backups().len(), 1);
        assert!(p.pending_backups().contains_key(Path::new("/w/a")));
        p.rollback().unwrap();
        assert_eq!(fs.read("/w/a/x.txt").unwrap(), b"x");
    }

    #[test]
    fn rollback_without_preserve_is_a_no_op() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/a"]);
        p.rollback().unwrap();
        assert_eq!(fs.mutation_count(), 0);

        let mut nothing = preserver(&fs, &notes, &["/w/missing", "/elsewhere/x"]);
        nothing.preserve().unwrap();
        nothing.rollback().unwrap();
        assert_eq!(fs.mutation_count(), 0);
    }

    #[test]
    fn second_rollback_does_nothing() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/f.txt"]);
        p.preserve().unwrap();
        p.rollback().unwrap();
        let after_first = fs.mutation_count();
        p.rollback().unwrap();
        assert_eq!(fs.mutation_count(), after_first);
    }

    #[test]
    fn installed_content_is_replaced_and_reported() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/a", "/w/f.txt"]);
        p.preserve().unwrap();

        // The package writes its own versions, including an empty placeholder dir.
        fs.put_dir("/w/a");
        fs.put_file("/w/a/package.txt", b"pkg");
        fs.put_file("/w/f.txt", b"");

        p.rollback().unwrap();
        assert!(!fs.contains("/w/a/package.txt"));
        assert_eq!(fs.read("/w/a/x.txt").unwrap(), b"x");
        assert_eq!(fs.read("/w/f.txt").unwrap(), b"hi");
        let messages = notes.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().any(|m| m.contains("/w/a")));
    }

    #[test]
    fn missing_parent_is_recreated() {
        let fs = MemoryFs::new()
            .with_file("/w/deep/nested/keep.txt", b"k", 0o644)
            .with_dir(CACHE, 0o755);
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/deep/nested/keep.txt"]);
        p.preserve().unwrap();
        // An uninstall removes the whole package directory.
        fs.remove_tree(Path::new("/w/deep")).unwrap();
        p.rollback().unwrap();
        assert_eq!(fs.read("/w/deep/nested/keep.txt").unwrap(), b"k");
    }

    #[test]
    fn move_failure_keeps_earlier_backups_restorable() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        fs.fail_rename("/w/f.txt");
        let mut p = preserver(&fs, &notes, &["/w/a", "/w/f.txt"]);

        let err = p.preserve().unwrap_err();
        assert!(matches!(err, PreserveError::MoveFailed { ref from, .. } if from == Path::new("/w/f.txt")));
        assert!(!fs.contains("/w/a"), "earlier move stays done");
        assert!(fs.contains("/w/f.txt"), "failed path untouched");
        assert_eq!(p.pending_backups().len(), 1);

        p.rollback().unwrap();
        assert_eq!(fs.read("/w/a/x.txt").unwrap(), b"x");
        assert_eq!(fs.read("/w/f.txt").unwrap(), b"hi");
    }

    #[test]
    fn first_move_failure_leaves_no_backup_area() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        fs.fail_rename("/w/a");
        let mut p = preserver(&fs, &notes, &["/w/a"]);
        assert!(p.preserve().is_err());
        assert!(fs.children_of("/cache/preserve-paths").is_empty());
    }

    #[test]
    fn permission_failure_creates_no_backup_area() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        fs.chmod_unchecked("/w/f.txt", 0o444);
        fs.deny_chmod("/w/f.txt");
        let mut p = preserver(&fs, &notes, &["/w/f.txt"]);
        let err = p.preserve().unwrap_err();
        assert!(matches!(err, PreserveError::PermissionDenied { ref path, .. } if path == Path::new("/w/f.txt")));
        assert!(!fs.contains("/cache/preserve-paths"));
        assert!(p.pending_backups().is_empty());
    }

    #[test]
    fn partly_removed_original_is_recorded_and_restored() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        fs.half_rename("/w/a");
        let mut p = preserver(&fs, &notes, &["/w/a"]);

        let err = p.preserve().unwrap_err();
        assert!(matches!(err, PreserveError::MoveFailed { ref from, .. } if from == Path::new("/w/a")));
        let location = p.pending_backups()[Path::new("/w/a")].location.clone();
        assert_eq!(fs.read(location.join("x.txt")).unwrap(), b"x");
        assert!(!fs.contains("/w/a/x.txt"));

        p.rollback().unwrap();
        assert_eq!(fs.read("/w/a/x.txt").unwrap(), b"x");
        assert!(p.pending_backups().is_empty());
        assert!(fs.children_of("/cache/preserve-paths").is_empty());
        assert_eq!(notes.messages().len(), 1);
    }

    #[test]
    fn failed_restore_keeps_the_record() {
        let fs = scenario();
        let notes = RecordingNotifier::new();
        let mut p = preserver(&fs, &notes, &["/w/f.txt"]);
        p.preserve().unwrap();
        let location = p.pending_backups()[Path::new("/w/f.txt")].location.clone();
        fs.fail_rename(&location);

        let err = p.rollback().unwrap_err();
        assert!(matches!(
            err,
            PreserveError::RestoreFailed { step: RestoreStep::MoveBack, .. }
        ));
        assert_eq!(p.pending_backups().len(), 1);
        assert!(fs.contains(&location));
    }

    #[test]
    fn read_only_root_and_modes_round_trip() {
        let fs = MemoryFs::new()
            .with_dir("/w/folder1/subfolder1", 0o755)
            .with_file("/w/folder1/file1.txt", b"Test content", 0o644)
            .with_file("/w/folder1/file2.txt", b"Test content 2", 0o400)
            .with_dir(CACHE, 0o755);
        fs.chmod_unchecked("/w/folder1/subfolder1", 0o500);
        fs.chmod_unchecked("/w/folder1", 0o400);
        let notes = RecordingNotifier::new();
        let mut p = Preserver::new(
            ["/w/folder1"],
            [
                "/w/folder1/subfolder1",
                "/w/folder1/file1.txt",
                "/w/folder1/file2.txt",
            ],
            CACHE,
            &fs,
            &notes,
        )
        .unwrap();

        p.preserve().unwrap();
        assert_eq!(p.pending_backups().len(), 3);
        assert!(fs.children_of("/w/folder1").is_empty());

        // The user (or the package) makes the root read-only again before rollback.
        fs.chmod_unchecked("/w/folder1", 0o400);
        p.rollback().unwrap();

        assert_eq!(fs.peek_mode("/w/folder1"), Some(0o400));
        assert_eq!(fs.peek_mode("/w/folder1/subfolder1"), Some(0o500));
        assert_eq!(fs.peek_mode("/w/folder1/file1.txt"), Some(0o644));
        assert_eq!(fs.peek_mode("/w/folder1/file2.txt"), Some(0o400));
        assert_eq!(fs.read("/w/folder1/file2.txt").unwrap(), b"Test content 2");
    }

    #[test]
    fn several_roots_get_separate_areas() {
        let fs = MemoryFs::new()
            .with_file("/r1/keep", b"1", 0o644)
            .with_file("/r2/keep", b"2", 0o644)
            .with_dir(CACHE, 0o755);
        let notes = RecordingNotifier::new();
        let mut p =
            Preserver::new(["/r1", "/r2", "/r1/"], ["/r1/keep", "/r2/keep"], CACHE, &fs, &notes)
                .unwrap();
        assert_eq!(p.install_roots().len(), 2);
        p.preserve().unwrap();
        let areas: BTreeSet<_> = p
            .pending_backups()
            .values()
            .map(|e| e.location.parent().unwrap().to_path_buf())
            .collect();
        assert_eq!(areas.len(), 2);
        p.rollback().unwrap();
        assert_eq!(fs.read("/r1/keep").unwrap(), b"1");
        assert_eq!(fs.read("/r2/keep").unwrap(), b"2");
    }
}
