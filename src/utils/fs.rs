//! Filesystem helpers

use std::path::Path;

use walkdir::WalkDir;

use crate::error::GradeResult;

/// Recursively copy `src` into `dst`, overwriting files that already exist.
///
/// Returns the number of files copied.
pub async fn copy_dir_recursive(src: &Path, dst: &Path) -> GradeResult<u64> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();

    tokio::task::spawn_blocking(move || copy_dir_blocking(&src, &dst)).await?
}

fn copy_dir_blocking(src: &Path, dst: &Path) -> GradeResult<u64> {
    std::fs::create_dir_all(dst)?;
    let mut copied = 0;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            clear_file(&target)?;
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Remove a file or symlink at `path` so it can be recreated regardless of
/// its permission bits. Directories and missing paths are left alone.
pub(crate) fn clear_file(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => std::fs::remove_file(path),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
