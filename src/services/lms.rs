//! Learning-management-system collaborator
//!
//! `LmsClient` is the only surface through which the grader sees courses:
//! it lists the grading spec files, assignments and submissions, and accepts
//! feedback comments. `LocalCourse` serves the same data from a directory:
//!
//! ```text
//! <course>/assignments.json               [{"id": "...", "name": "..."}]
//! <course>/submissions/<assignment>.json  [Submission, ...]
//! <course>/codeval/                       descriptors and extra-file archives
//! ```
//!
//! File locations are relative to the course root, so a `LocalFileStore`
//! rooted at the same directory can fetch them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::constants::CODEVAL_FOLDER;
use crate::error::{GradeError, GradeResult};
use crate::models::{Assignment, Comment, RemoteFile, Submission};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LmsClient: Send + Sync {
    /// Files in the course's CodEval folder
    async fn spec_files(&self) -> GradeResult<Vec<RemoteFile>>;

    async fn assignments(&self) -> GradeResult<Vec<Assignment>>;

    /// Latest submission of every student, comments oldest first
    async fn submissions(&self, assignment: &Assignment) -> GradeResult<Vec<Submission>>;

    async fn post_comment(&self, assignment: &Assignment, submission: &Submission, text: &str) -> GradeResult<()>;
}

/// Course data kept as JSON files under a directory
#[derive(Debug)]
pub struct LocalCourse {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalCourse {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn submissions_path(&self, assignment: &Assignment) -> PathBuf {
        self.root
            .join("submissions")
            .join(format!("{}.json", assignment.id))
    }

    async fn read_submissions(&self, path: &Path) -> GradeResult<Vec<Submission>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl LmsClient for LocalCourse {
    async fn spec_files(&self) -> GradeResult<Vec<RemoteFile>> {
        let folder = self.root.join(CODEVAL_FOLDER);
        let mut entries = match tokio::fs::read_dir(&folder).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(RemoteFile {
                location: format!("{}/{}", CODEVAL_FOLDER, name),
                display_name: name,
            });
        }
        files.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(files)
    }

    async fn assignments(&self) -> GradeResult<Vec<Assignment>> {
        let bytes = tokio::fs::read(self.root.join("assignments.json")).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn submissions(&self, assignment: &Assignment) -> GradeResult<Vec<Submission>> {
        self.read_submissions(&self.submissions_path(assignment)).await
    }

    async fn post_comment(&self, assignment: &Assignment, submission: &Submission, text: &str) -> GradeResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.submissions_path(assignment);

        let mut submissions = self.read_submissions(&path).await?;
        let target = submissions
            .iter_mut()
            .find(|s| s.id == submission.id)
            .ok_or_else(|| {
                GradeError::Reporting(format!(
                    "submission {} not found in assignment {}",
                    submission.id, assignment.name
                ))
            })?;

        target.comments.push(Comment {
            comment: text.to_string(),
            created_at: Utc::now(),
        });

        tokio::fs::write(&path, serde_json::to_vec_pretty(&submissions)?).await?;
        Ok(())
    }
}
