//! In-memory [`Filesystem`] for tests.
//!
//! Models the owner's view of POSIX permissions, which is all the preserver
//! cares about:
//! - looking anything up needs search (`x`) on every ancestor,
//! - adding or removing an entry needs write + search on its parent,
//! - moving a directory to a different parent needs write on the directory itself.
//!
//! Checks apply regardless of the real uid, so permission tests stay
//! meaningful when the suite runs as root. Failures can be injected per path.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use super::{Filesystem, SourceNotRemoved};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir,
    File(Vec<u8>),
    Symlink(PathBuf),
}

#[derive(Debug, Clone)]
struct Entry {
    node: Node,
    mode: u32,
}

#[derive(Debug)]
pub struct MemoryFs {
    entries: RefCell<BTreeMap<PathBuf, Entry>>,
    failing_renames: RefCell<BTreeSet<PathBuf>>,
    half_renames: RefCell<BTreeSet<PathBuf>>,
    denied_chmods: RefCell<BTreeSet<PathBuf>>,
    mutations: RefCell<usize>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn denied(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("permission denied: {}", path.display()),
    )
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("not found: {}", path.display()))
}

impl MemoryFs {
    /// An empty tree containing only `/` (mode 0755).
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(PathBuf::from("/"), Entry { node: Node::Dir, mode: 0o755 });
        Self {
            entries: RefCell::new(entries),
            failing_renames: RefCell::new(BTreeSet::new()),
            half_renames: RefCell::new(BTreeSet::new()),
            denied_chmods: RefCell::new(BTreeSet::new()),
            mutations: RefCell::new(0),
        }
    }

    /// Add a directory (parents are created with 0755).
    pub fn with_dir(self, path: impl AsRef<Path>, mode: u32) -> Self {
        self.insert(path.as_ref(), Node::Dir, mode);
        self
    }

    /// Add a file (parents are created with 0755).
    pub fn with_file(self, path: impl AsRef<Path>, contents: &[u8], mode: u32) -> Self {
        self.insert(path.as_ref(), Node::File(contents.to_vec()), mode);
        self
    }

    pub fn with_symlink(self, path: impl AsRef<Path>, target: impl AsRef<Path>) -> Self {
        self.insert(path.as_ref(), Node::Symlink(target.as_ref().to_path_buf()), 0o777);
        self
    }

    /// Make every rename whose source is `path` fail.
    pub fn fail_rename(&self, path: impl AsRef<Path>) {
        self.failing_renames.borrow_mut().insert(path.as_ref().to_path_buf());
    }

    /// Make renames of `path` behave like a cross-device move whose cleanup
    /// failed: the destination gets the full tree, the source keeps its
    /// directories but loses its other entries, and the call fails.
    pub fn half_rename(&self, path: impl AsRef<Path>) {
        self.half_renames.borrow_mut().insert(path.as_ref().to_path_buf());
    }

    /// Make every chmod of `path` fail with EPERM-like PermissionDenied.
    pub fn deny_chmod(&self, path: impl AsRef<Path>) {
        self.denied_chmods.borrow_mut().insert(path.as_ref().to_path_buf());
    }

    /// Write directly, bypassing permission checks (simulates a package install).
    pub fn put_file(&self, path: impl AsRef<Path>, contents: &[u8]) {
        self.insert(path.as_ref(), Node::File(contents.to_vec()), 0o644);
    }

    /// Create a directory directly, bypassing permission checks.
    pub fn put_dir(&self, path: impl AsRef<Path>) {
        self.insert(path.as_ref(), Node::Dir, 0o755);
    }

    /// Change a mode directly, bypassing permission checks (simulates the user).
    pub fn chmod_unchecked(&self, path: impl AsRef<Path>, mode: u32) {
        if let Some(e) = self.entries.borrow_mut().get_mut(path.as_ref()) {
            e.mode = mode;
        }
    }

    /// Contents of a file, ignoring permissions.
    pub fn read(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        match self.entries.borrow().get(path.as_ref()).map(|e| &e.node) {
            Some(Node::File(bytes)) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Mode of an entry, ignoring permissions.
    pub fn peek_mode(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.entries.borrow().get(path.as_ref()).map(|e| e.mode)
    }

    /// Whether an entry is present, ignoring permissions.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.borrow().contains_key(path.as_ref())
    }

    /// Every path strictly below `dir`, ignoring permissions.
    pub fn children_of(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let dir = dir.as_ref();
        self.entries
            .borrow()
            .keys()
            .filter(|p| p.as_path() != dir && p.starts_with(dir))
            .cloned()
            .collect()
    }

    /// Number of successful mutating calls made through the trait.
    pub fn mutation_count(&self) -> usize {
        *self.mutations.borrow()
    }

    fn bump(&self) {
        *self.mutations.borrow_mut() += 1;
    }

    fn insert(&self, path: &Path, node: Node, mode: u32) {
        let mut entries = self.entries.borrow_mut();
        for anc in path.ancestors().skip(1) {
            entries
                .entry(anc.to_path_buf())
                .or_insert(Entry { node: Node::Dir, mode: 0o755 });
        }
        entries.insert(path.to_path_buf(), Entry { node, mode });
    }

    /// Every ancestor must be a searchable directory.
    fn check_search(&self, path: &Path) -> io::Result<()> {
        let entries = self.entries.borrow();
        let mut ancestors: Vec<&Path> = path.ancestors().skip(1).collect();
        ancestors.reverse();
        for anc in ancestors {
            match entries.get(anc) {
                Some(Entry { node: Node::Dir, mode }) if mode & 0o100 != 0 => {}
                Some(Entry { node: Node::Dir, .. }) => return Err(denied(anc)),
                _ => return Err(not_found(anc)),
            }
        }
        Ok(())
    }

    fn lookup(&self, path: &Path) -> io::Result<Entry> {
        self.check_search(path)?;
        self.entries.borrow().get(path).cloned().ok_or_else(|| not_found(path))
    }

    /// The parent of `path` must exist and accept new or removed entries.
    fn check_parent_writable(&self, path: &Path) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| denied(path))?;
        let entry = self.lookup(parent)?;
        if entry.node != Node::Dir {
            return Err(not_found(parent));
        }
        if entry.mode & 0o300 != 0o300 {
            return Err(denied(parent));
        }
        Ok(())
    }

    fn remove_subtree(&self, path: &Path) {
        self.entries
            .borrow_mut()
            .retain(|p, _| !(p.as_path() == path || p.starts_with(path)));
    }
}

impl Filesystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.lookup(path).is_ok()
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Ok(Entry { node: Node::Dir, .. }))
    }

    fn is_symlink(&self, path: &Path) -> bool {
        matches!(self.lookup(path), Ok(Entry { node: Node::Symlink(_), .. }))
    }

    fn is_dir_empty(&self, path: &Path) -> io::Result<bool> {
        let entry = self.lookup(path)?;
        if entry.node != Node::Dir {
            return Err(io::Error::other(format!("not a directory: {}", path.display())));
        }
        if entry.mode & 0o400 == 0 {
            return Err(denied(path));
        }
        Ok(self.children_of(path).is_empty())
    }

    fn is_writable(&self, path: &Path) -> bool {
        match self.lookup(path) {
            Ok(Entry { node: Node::Symlink(_), .. }) => true,
            Ok(Entry { node: Node::Dir, mode }) => mode & 0o300 == 0o300,
            Ok(Entry { mode, .. }) => mode & 0o200 != 0,
            Err(_) => false,
        }
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if self.failing_renames.borrow().contains(from) {
            return Err(io::Error::other(format!("injected rename failure: {}", from.display())));
        }
        let entry = self.lookup(from)?;
        self.check_parent_writable(from)?;
        self.check_parent_writable(to)?;
        if self.exists(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("already exists: {}", to.display()),
            ));
        }
        if to.starts_with(from) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot move a directory into itself"));
        }
        if entry.node == Node::Dir && from.parent() != to.parent() && entry.mode & 0o200 == 0 {
            return Err(denied(from));
        }

        let mut entries = self.entries.borrow_mut();
        let moved: Vec<(PathBuf, Entry)> = entries
            .iter()
            .filter(|(p, _)| p.as_path() == from || p.starts_with(from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        let half = self.half_renames.borrow().contains(from);
        for (old, e) in moved {
            if !half || e.node != Node::Dir {
                entries.remove(&old);
            }
            let rel = old.strip_prefix(from).map_err(io::Error::other)?;
            let new = if rel.as_os_str().is_empty() { to.to_path_buf() } else { to.join(rel) };
            entries.insert(new, e);
        }
        drop(entries);
        self.bump();
        if half {
            return Err(SourceNotRemoved::wrap(denied(from)));
        }
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let entry = self.lookup(path)?;
        if entry.node == Node::Dir {
            return Err(io::Error::other(format!("is a directory: {}", path.display())));
        }
        self.check_parent_writable(path)?;
        self.entries.borrow_mut().remove(path);
        self.bump();
        Ok(())
    }

    fn remove_tree(&self, path: &Path) -> io::Result<()> {
        self.lookup(path)?;
        self.check_parent_writable(path)?;
        self.remove_subtree(path);
        self.bump();
        Ok(())
    }

    fn remove_empty_dir(&self, path: &Path) -> io::Result<()> {
        if !self.is_dir_empty(path)? {
            return Err(io::Error::other(format!("directory not empty: {}", path.display())));
        }
        self.check_parent_writable(path)?;
        self.entries.borrow_mut().remove(path);
        self.bump();
        Ok(())
    }

    fn ensure_dir(&self, path: &Path) -> io::Result<()> {
        let mut chain: Vec<&Path> = path.ancestors().collect();
        chain.reverse();
        for dir in chain {
            match self.lookup(dir) {
                Ok(Entry { node: Node::Dir, .. }) => continue,
                Ok(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("not a directory: {}", dir.display()),
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    self.check_parent_writable(dir)?;
                    self.entries
                        .borrow_mut()
                        .insert(dir.to_path_buf(), Entry { node: Node::Dir, mode: 0o755 });
                    self.bump();
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn mode(&self, path: &Path) -> io::Result<u32> {
        self.lookup(path).map(|e| e.mode)
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.lookup(path)?;
        if self.denied_chmods.borrow().contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("operation not permitted: {}", path.display()),
            ));
        }
        if let Some(e) = self.entries.borrow_mut().get_mut(path) {
            e.mode = mode;
        }
        self.bump();
        Ok(())
    }
}
