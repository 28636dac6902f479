//! Path helpers shared by the preserver and the permission guard.
//! - Lexical normalization (no disk access).
//! - Component-wise containment checks.
//! - Content-independent digests used to name backup locations.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static AREA_SEQ: AtomicU64 = AtomicU64::new(0);

/// Directory under the scratch root that holds every backup area.
pub const BACKUP_DIR_NAME: &str = "preserve-paths";

/// Normalize a path lexically: drop `.`, fold `..`, collapse separators and
/// strip trailing ones. `..` never climbs above the root of an absolute path.
pub fn normalize(path: &Path) -> PathBuf {
    let path = dunce::simplified(path);
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Prefix(_) | Component::RootDir => out.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() && !path.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// True when `candidate` lies strictly inside `root`.
/// Both paths are expected to be normalized; comparison is per component,
/// so `/app/foobar` is not inside `/app/foo`.
pub fn is_within(root: &Path, candidate: &Path) -> bool {
    candidate != root && candidate.starts_with(root)
}

/// Directories from `root` (inclusive) down to the parent of `path` (inclusive),
/// shallowest first. Empty when `path` is not inside `root`.
pub fn ancestors_within(root: &Path, path: &Path) -> Vec<PathBuf> {
    if !is_within(root, path) {
        return Vec::new();
    }
    let mut dirs: Vec<PathBuf> = path
        .ancestors()
        .skip(1)
        .take_while(|a| a.starts_with(root))
        .map(Path::to_path_buf)
        .collect();
    dirs.reverse();
    dirs
}

/// Lowercase hex SHA-256 of the path's encoded bytes.
pub fn path_digest(path: &Path) -> String {
    hex_digest(path.as_os_str().as_encoded_bytes())
}

/// Name for a fresh backup area: digest of the install root, the current time
/// and a process-wide sequence number.
pub fn backup_area_name(install_root: &Path) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = AREA_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut seed = install_root.as_os_str().as_encoded_bytes().to_vec();
    seed.extend_from_slice(format!(" {nanos}.{seq}").as_bytes());
    hex_digest(&seed)
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
