//! Path resolution and filesystem probes used by the warehouse.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::error;

/// Resolve a store path. Absolute paths are kept; relative ones are taken
/// relative to `base_dir` (the catalog's directory). The result is lexically
/// normalized since the target directory may not exist yet.
pub fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base_dir.join(path))
    }
}

/// Remove `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or a prefix
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` lives under `base` and can be stored relative to it.
pub fn can_be_relative(path: &Path, base: &Path) -> bool {
    path.starts_with(base)
}

/// Rewrite `path` as `./rest` relative to `base` when possible.
pub fn try_make_relative(path: &Path, base: &Path) -> PathBuf {
    match path.strip_prefix(base) {
        Ok(rest) if rest.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rest) => Path::new(".").join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Probe write access by creating a temp file that is deleted on close.
/// This bumps the directory's modification time.
pub fn is_directory_writable(dir: &Path) -> bool {
    tempfile::tempfile_in(dir).is_ok()
}

/// Toggle the read-only flag on a file. Failures are logged, never returned,
/// because the flag is a courtesy rather than a guarantee.
pub fn set_readonly(path: &Path, readonly: bool) {
    let result = fs::metadata(path).and_then(|meta| {
        let mut perms = meta.permissions();
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(readonly);
        fs::set_permissions(path, perms)
    });

    if let Err(e) = result {
        error!(path = %path.display(), readonly, error = %e, "Failed to change read-only flag");
    }
}
