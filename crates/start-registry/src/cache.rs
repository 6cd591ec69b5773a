//! Atomic extraction of fetched module archives.

use anyhow::{Context as _, Result};
use flate2::read::GzDecoder;
use std::path::Path;

/// Unpack a gzipped tarball into `dest`, atomically.
///
/// The archive is extracted under a staging name next to `dest` and renamed
/// into place on success, so readers never observe a partial tree. When a
/// concurrent invocation won the race, the existing entry is kept; entries
/// are content-addressed by canonical version and never silently replaced.
pub fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let parent = dest
        .parent()
        .context("extraction destination has no parent")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let staging = parent.join(format!(
        ".extract-{}-{}",
        std::process::id(),
        dest.file_name().unwrap_or_default().to_string_lossy()
    ));
    if staging.exists() {
        std::fs::remove_dir_all(&staging)?;
    }
    std::fs::create_dir_all(&staging)?;

    let result = unpack_then_rename(bytes, &staging, dest);
    if result.is_err() {
        let _ = std::fs::remove_dir_all(&staging);
    }
    result
}

fn unpack_then_rename(bytes: &[u8], staging: &Path, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive
        .unpack(staging)
        .context("failed to extract module archive")?;

    if dest.exists() {
        // Lost the race; the winner's tree is identical by construction.
        std::fs::remove_dir_all(staging)?;
        return Ok(());
    }
    std::fs::rename(staging, dest)
        .with_context(|| format!("failed to move extracted module into {}", dest.display()))
}
