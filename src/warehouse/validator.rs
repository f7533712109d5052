//! Store validation against the filesystem.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::layout;
use crate::state::StoreStatus;

/// What was found on disk for one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub root_present: bool,
    pub marker_present: bool,
    pub marker_matches: bool,
    pub partitions_present: bool,
}

impl Probe {
    /// Status for these observations. Checks run in a fixed order and the
    /// first failing one decides.
    pub fn status(&self) -> StoreStatus {
        if !self.root_present {
            StoreStatus::Missing
        } else if !self.marker_present {
            StoreStatus::Invalid
        } else if !self.marker_matches {
            StoreStatus::Mismatch
        } else if !self.partitions_present {
            StoreStatus::Invalid
        } else {
            StoreStatus::Ok
        }
    }
}

/// Inspect the store rooted at `root` that should carry `identity`.
///
/// Stops looking as soon as the outcome is decided, so a missing root never
/// touches the marker and a mismatched marker never walks the partitions.
pub fn probe(root: &Path, identity: &str) -> Probe {
    let mut probe = Probe {
        root_present: root.is_dir(),
        marker_present: false,
        marker_matches: false,
        partitions_present: false,
    };
    if !probe.root_present {
        return probe;
    }

    let marker = layout::marker_path(root);
    probe.marker_present = marker.is_file();
    if !probe.marker_present {
        return probe;
    }

    // Exact, byte-for-byte comparison
    probe.marker_matches = fs::read_to_string(&marker).is_ok_and(|content| content == identity);
    if !probe.marker_matches {
        return probe;
    }

    probe.partitions_present = layout::partition_dirs(root).all(|dir| dir.is_dir());
    probe
}

/// Validate the store rooted at `root`.
pub fn validate(root: &Path, identity: &str) -> StoreStatus {
    let status = probe(root, identity).status();
    debug!(root = %root.display(), ?status, "Validated store");
    status
}
