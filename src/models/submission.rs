//! Assignment and submission models

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DESCRIPTOR_FILE_NAME;

/// An assignment as seen by the grader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub name: String,
}

/// Student who owns a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
}

/// A file held by the LMS, addressed by display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub display_name: String,
    /// Opaque reference handed to the file transfer collaborator
    pub location: String,
}

/// Feedback comment on a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// A student's latest submission for an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub user: Student,
    /// None when the student has not submitted anything
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<RemoteFile>,
    /// Oldest first
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Submission {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Per-submission execution state
///
/// Owns nothing on disk itself: the orchestrator holds the temp directory
/// guard for `work_dir` and removes (or preserves) it when grading ends.
#[derive(Debug, Clone)]
pub struct SubmissionContext {
    pub assignment_id: String,
    pub student_id: String,
    pub student_name: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub attachments: Vec<RemoteFile>,
    pub work_dir: PathBuf,
}

impl SubmissionContext {
    pub fn new(assignment: &Assignment, submission: &Submission, work_dir: &Path) -> Self {
        Self {
            assignment_id: assignment.id.clone(),
            student_id: submission.user.id.clone(),
            student_name: submission.user.name.clone(),
            submitted_at: submission.submitted_at,
            attachments: submission.attachments.clone(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    /// Descriptor copy inside the work directory, used by the distributed pass
    pub fn testcases_path(&self) -> PathBuf {
        self.work_dir.join(DESCRIPTOR_FILE_NAME)
    }
}
