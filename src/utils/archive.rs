//! Zip archive extraction

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{GradeError, GradeResult};
use crate::utils::fs::clear_file;

/// Whether a file starts with a zip signature (local header or empty archive).
pub fn is_zip(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    Ok(read == 4 && (magic == *b"PK\x03\x04" || magic == *b"PK\x05\x06"))
}

/// Extract a zip file into `dest_dir`, optionally deleting the archive.
///
/// Entries whose names would escape `dest_dir` are rejected. Existing files
/// are overwritten.
pub async fn extract_zip(zip_path: &Path, dest_dir: &Path, delete_after: bool) -> GradeResult<Vec<PathBuf>> {
    let zip_path = zip_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || extract_zip_blocking(&zip_path, &dest_dir, delete_after)).await?
}

fn extract_zip_blocking(zip_path: &Path, dest_dir: &Path, delete_after: bool) -> GradeResult<Vec<PathBuf>> {
    let file = File::open(zip_path).map_err(|e| {
        GradeError::Archive(format!("failed to open {}: {}", zip_path.display(), e))
    })?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| GradeError::Archive(format!("failed to read {}: {}", zip_path.display(), e)))?;

    let mut extracted = Vec::with_capacity(archive.len());

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            GradeError::Archive(format!("entry {} escapes the extraction directory", entry.name()))
        })?;
        let outpath = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        clear_file(&outpath)?;
        let mut outfile = File::create(&outpath)?;
        std::io::copy(&mut entry, &mut outfile)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
            }
        }

        extracted.push(outpath);
    }

    if delete_after {
        std::fs::remove_file(zip_path)?;
    }

    tracing::debug!(
        archive = %zip_path.display(),
        dest = %dest_dir.display(),
        files = extracted.len(),
        "Extracted archive"
    );

    Ok(extracted)
}


#[cfg(test)]
mod tests {
    use super::test_support::{write_zip, write_zip_with_mode};
    use super::*;

    #[tokio::test]
    async fn test_extract_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("hw.zip");
        write_zip(&zip_path, &[("main.c", b"int main(){}"), ("src/util.h", b"#pragma once")]);

        assert!(is_zip(&zip_path).unwrap());

        let files = extract_zip(&zip_path, dir.path(), true).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(std::fs::read(dir.path().join("main.c")).unwrap(), b"int main(){}");
        assert!(dir.path().join("src/util.h").exists());
        assert!(!zip_path.exists());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("broken.zip");
        std::fs::write(&zip_path, b"PK\x03\x04 definitely not a zip").unwrap();

        let err = extract_zip(&zip_path, dir.path(), true).await.unwrap_err();
        assert!(matches!(err, GradeError::Archive(_)));
        // A failed extraction leaves the archive for inspection.
        assert!(zip_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_over_read_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");
        write_zip_with_mode(&first, &[("data.txt", b"old")], 0o444);
        write_zip(&second, &[("data.txt", b"new")]);

        extract_zip(&first, dir.path(), true).await.unwrap();
        extract_zip(&second, dir.path(), true).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("data.txt")).unwrap(), b"new");
    }

    #[test]
    fn test_plain_file_is_not_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.py");
        std::fs::write(&path, b"print('hi')").unwrap();
        assert!(!is_zip(&path).unwrap());
    }
}
