//! Deterministic splitting of an input file set across accelerator slots.

use std::path::PathBuf;

/// Split `files` into `n` disjoint groups by sorted round-robin.
///
/// The file set is sorted into a total order on relative path before
/// assignment, so the result never depends on filesystem enumeration
/// order. The union of the groups is exactly the input set; when
/// `files.len() < n` the trailing groups are empty (the supervisor skips
/// spawning workers for those).
pub fn partition(mut files: Vec<PathBuf>, n: usize) -> Vec<Vec<PathBuf>> {
    let n = n.max(1);
    files.sort();
    files.dedup();

    let mut groups = vec![Vec::new(); n];
    for (i, file) in files.into_iter().enumerate() {
        groups[i % n].push(file);
    }
    groups
}
