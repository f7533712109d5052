//! Sharded directory layout of a store root.
//!
//! ```text
//! <root>/___store___.guid     identity marker (read-only)
//! <root>/00 .. <root>/ff      content partitions
//! <root>/t00 .. <root>/tff    thumbnail partitions
//! ```
//!
//! A file's location is derived from its content alone:
//! `<root>/<first two hex digits>/<hash><extension>`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::util::hash::Digest;

/// Name of the identity marker file at the root of every store.
pub const MARKER_FILE: &str = "___store___.guid";

/// Number of content partitions (and of thumbnail partitions).
pub const PARTITION_COUNT: usize = 256;

const THUMBNAIL_PREFIX: &str = "t";

/// `"00"` .. `"ff"`
pub fn partition_names() -> impl Iterator<Item = String> {
    (0..PARTITION_COUNT).map(|i| format!("{i:02x}"))
}

/// Every partition directory a valid store must contain, content and thumbnail.
pub fn partition_dirs(root: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    partition_names().flat_map(move |name| {
        [root.join(&name), root.join(format!("{THUMBNAIL_PREFIX}{name}"))]
    })
}

pub fn marker_path(root: &Path) -> PathBuf {
    root.join(MARKER_FILE)
}

/// Where content with this hash and extension lives inside a store.
pub fn content_path(root: &Path, hash: &Digest, extension: &str) -> PathBuf {
    root.join(hash.prefix()).join(format!("{hash}{extension}"))
}

/// Create the root and all 512 partition directories.
pub fn create(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)?;
    for dir in partition_dirs(root) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_every_prefix() {
        let names: Vec<String> = partition_names().collect();
        assert_eq!(names.len(), 256);
        assert_eq!(names.first().map(String::as_str), Some("00"));
        assert_eq!(names.last().map(String::as_str), Some("ff"));
        assert!(names.contains(&"a7".to_string()));
    }

    #[test]
    fn partition_dirs_include_thumbnails() {
        let root = Path::new("/store");
        let dirs: Vec<PathBuf> = partition_dirs(root).collect();
        assert_eq!(dirs.len(), 512);
        assert!(dirs.contains(&PathBuf::from("/store/3c")));
        assert!(dirs.contains(&PathBuf::from("/store/t3c")));
        assert!(dirs.contains(&PathBuf::from("/store/tff")));
    }

    #[test]
    fn content_path_uses_hash_prefix() {
        let hash = Digest::from_hex(&format!("abcd{}", "0".repeat(60))).unwrap();
        let path = content_path(Path::new("/r"), &hash, ".png");
        assert_eq!(path, PathBuf::from(format!("/r/ab/{hash}.png")));
    }

    #[test]
    fn creates_full_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("store");
        create(&root).unwrap();
        assert!(partition_dirs(&root).all(|d| d.is_dir()));
        assert_eq!(fs::read_dir(&root).unwrap().count(), 512);
    }
}
