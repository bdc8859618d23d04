//! File transfer collaborator
//!
//! The grader never talks to the LMS file API directly. It asks a
//! `FileTransfer` to fetch a remote file to a local path and to unpack
//! archives, and looks files up by display name with `resolve_remote`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{GradeError, GradeResult};
use crate::models::RemoteFile;
use crate::utils::{extract_zip, is_zip};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Fetch the file at `location` and write it to `dest`.
    async fn download(&self, location: &str, dest: &Path) -> GradeResult<()>;

    /// Unpack `path` into `dest_dir`, removing the archive afterwards when
    /// `delete_after` is set.
    async fn extract_archive(&self, path: &Path, dest_dir: &Path, delete_after: bool) -> GradeResult<()>;
}

/// Find exactly one file whose display name equals `name`.
pub fn resolve_remote<'a>(files: &'a [RemoteFile], name: &str) -> GradeResult<&'a RemoteFile> {
    if name.is_empty() {
        return Err(GradeError::Transfer("No file name was given".to_string()));
    }

    let matches: Vec<&RemoteFile> = files.iter().filter(|f| f.display_name == name).collect();
    match matches.as_slice() {
        [file] => Ok(file),
        [] => Err(GradeError::Transfer(format!("{} file not found", name))),
        many => Err(GradeError::Transfer(format!(
            "Multiple files found matching {}: {}",
            name,
            many.len()
        ))),
    }
}

/// Files served from a local directory tree.
///
/// A location is a path relative to `root`. Zip archives are extracted with
/// entries confined to the destination; anything else is left where it was
/// downloaded, so a plain source attachment lands in the work directory
/// as-is.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn source_path(&self, location: &str) -> GradeResult<PathBuf> {
        let relative = Path::new(location);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(GradeError::Transfer(format!(
                "{} is outside the file store",
                location
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileTransfer for LocalFileStore {
    async fn download(&self, location: &str, dest: &Path) -> GradeResult<()> {
        let source = self.source_path(location)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::copy(&source, dest).await.map_err(|e| {
            GradeError::Transfer(format!("failed to fetch {}: {}", location, e))
        })?;

        tracing::debug!(location = %location, dest = %dest.display(), "Downloaded file");
        Ok(())
    }

    async fn extract_archive(&self, path: &Path, dest_dir: &Path, delete_after: bool) -> GradeResult<()> {
        if !is_zip(path)? {
            tracing::debug!(file = %path.display(), "Not an archive, leaving in place");
            return Ok(());
        }

        extract_zip(path, dest_dir, delete_after).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::archive::test_support::write_zip;

    fn remote(name: &str) -> RemoteFile {
        RemoteFile {
            display_name: name.to_string(),
            location: format!("codeval/{}", name),
        }
    }

    #[test]
    fn test_resolve_remote() {
        let files = vec![remote("hw1.codeval"), remote("extra.zip"), remote("extra.zip")];

        assert_eq!(resolve_remote(&files, "hw1.codeval").unwrap().location, "codeval/hw1.codeval");

        let err = resolve_remote(&files, "hw2.codeval").unwrap_err();
        assert!(matches!(err, GradeError::Transfer(ref m) if m.contains("not found")));

        let err = resolve_remote(&files, "extra.zip").unwrap_err();
        assert!(matches!(err, GradeError::Transfer(ref m) if m.starts_with("Multiple files found")));

        assert!(resolve_remote(&files, "").is_err());
    }

    #[tokio::test]
    async fn test_local_store_download_and_extract() {
        let root = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("uploads")).unwrap();
        write_zip(&root.path().join("uploads/hw.zip"), &[("main.c", b"int main;")]);

        let store = LocalFileStore::new(root.path());
        let target = dest.path().join("hw.zip");
        store.download("uploads/hw.zip", &target).await.unwrap();
        store.extract_archive(&target, dest.path(), true).await.unwrap();

        assert!(dest.path().join("main.c").exists());
        assert!(!target.exists());
        // Source is untouched.
        assert!(root.path().join("uploads/hw.zip").exists());
    }

    #[tokio::test]
    async fn test_plain_attachment_is_kept() {
        let root = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("main.py"), b"print(1)").unwrap();

        let store = LocalFileStore::new(root.path());
        let target = dest.path().join("main.py");
        store.download("main.py", &target).await.unwrap();
        store.extract_archive(&target, dest.path(), true).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"print(1)");
    }

    #[tokio::test]
    async fn test_missing_and_escaping_locations() {
        let root = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(root.path());

        let err = store.download("nope.zip", &dest.path().join("x")).await.unwrap_err();
        assert!(matches!(err, GradeError::Transfer(_)));

        let err = store.download("../etc/passwd", &dest.path().join("x")).await.unwrap_err();
        assert!(matches!(err, GradeError::Transfer(_)));
    }
}
