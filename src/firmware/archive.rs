//! Firmware archive extraction.

use super::error::FirmwareResult;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Unpack `archive` into `target`, returning the files written.
///
/// Entries whose names would land outside `target` are skipped.
pub fn extract(archive: &Path, target: &Path) -> FirmwareResult<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(target)?;

    let mut written = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(name = entry.name(), "skipping archive entry outside target");
            continue;
        };
        let path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)?;
        io::copy(&mut entry, &mut out)?;
        debug!(file = %path.display(), "extracted");
        written.push(path);
    }
    Ok(written)
}
