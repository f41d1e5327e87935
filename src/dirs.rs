use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// Seam for the one filesystem primitive relocation depends on.
pub trait FileMover: Send + Sync + 'static {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

pub struct LocalFs;

impl FileMover for LocalFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }
}

pub fn ensure_parent_dirs(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Removes the parent of `path` and its ancestors for as long as they are empty, stopping at
/// `root`, which is never removed. A directory that has already disappeared counts as
/// removed. Returns how many directories this call deleted.
pub fn prune_empty_ancestors(path: &Path, root: &Path) -> usize {
    let mut removed = 0;
    let mut current = path.parent();

    while let Some(dir) = current {
        if dir == root || !dir.starts_with(root) {
            break;
        }

        match fs::remove_dir(dir) {
            Ok(()) => {
                debug!(path = %dir.display(), "removed empty directory");
                removed += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(_) => break,
        }

        current = dir.parent();
    }

    removed
}
