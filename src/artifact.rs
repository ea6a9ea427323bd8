//! Packaging of a job's merged output tree into a single zip archive.

use std::fs::File;
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{FarmError, Result};

/// Archive the full contents of `output_tree` at `archive_path`.
///
/// Entries are rooted at the tree itself so unpacking reproduces the same
/// relative layout. Any stale archive at the path is overwritten.
/// Compression runs on the blocking pool.
pub async fn package(output_tree: &Path, archive_path: &Path) -> Result<()> {
    let tree = output_tree.to_path_buf();
    let archive = archive_path.to_path_buf();
    tokio::task::spawn_blocking(move || write_zip(&tree, &archive))
        .await
        .map_err(|e| FarmError::Packaging(e.to_string()))?
}

fn write_zip(tree: &Path, archive: &Path) -> Result<()> {
    let file = File::create(archive)
        .map_err(|e| FarmError::Packaging(format!("{}: {}", archive.display(), e)))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    // Sorted walk keeps archive entry order stable across runs.
    for entry in WalkDir::new(tree).sort_by_file_name() {
        let entry = entry.map_err(|e| FarmError::Packaging(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(tree)
            .map_err(|e| FarmError::Packaging(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel.to_string_lossy().into_owned();

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)
                .map_err(|e| FarmError::Packaging(e.to_string()))?;
        } else if entry.file_type().is_file() {
            zip.start_file(name, options)
                .map_err(|e| FarmError::Packaging(e.to_string()))?;
            let mut src = File::open(entry.path())
                .map_err(|e| FarmError::Packaging(format!("{}: {}", entry.path().display(), e)))?;
            io::copy(&mut src, &mut zip).map_err(|e| FarmError::Packaging(e.to_string()))?;
        }
    }

    zip.finish().map_err(|e| FarmError::Packaging(e.to_string()))?;
    Ok(())
}
