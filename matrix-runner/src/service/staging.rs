//! Artifact staging
//!
//! Unpacks a downloaded release artifact into the directory the runtime
//! container serves from.

use matrix_core::error::PipelineError;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Extracts `archive` into `dest` on the blocking pool
///
/// # Returns
/// Number of entries extracted
pub async fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    let entries = tokio::task::spawn_blocking(move || extract_blocking(&archive, &dest))
        .await
        .map_err(|e| PipelineError::Staging(format!("extraction task failed: {}", e)))??;

    Ok(entries)
}

fn extract_blocking(archive: &Path, dest: &Path) -> Result<usize, PipelineError> {
    let file = File::open(archive)
        .map_err(|e| PipelineError::Staging(format!("cannot open {}: {}", archive.display(), e)))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| {
        PipelineError::Staging(format!("{} is not a valid zip archive: {}", archive.display(), e))
    })?;

    if zip.len() == 0 {
        return Err(PipelineError::Staging(format!(
            "{} contains no files",
            archive.display()
        )));
    }

    std::fs::create_dir_all(dest)
        .map_err(|e| PipelineError::Staging(format!("cannot create {}: {}", dest.display(), e)))?;
    zip.extract(dest).map_err(|e| {
        PipelineError::Staging(format!("cannot extract into {}: {}", dest.display(), e))
    })?;

    info!(
        "Extracted {} entries from {} into {}",
        zip.len(),
        archive.display(),
        dest.display()
    );
    Ok(zip.len())
}
