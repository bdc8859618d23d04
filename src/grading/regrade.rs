//! Decides whether a submission still needs an automated grade

use crate::constants::GRADE_MARKER;
use crate::models::Submission;

/// Whether `submission` should be graded in this pass.
///
/// A grade comment created at or after the submission time means the
/// current submission was already graded. A submission without a timestamp
/// counts as graded once any grade comment exists.
pub fn should_grade(submission: &Submission, forced: bool) -> bool {
    if forced {
        return true;
    }

    let already_graded = submission
        .comments
        .iter()
        .rev()
        .filter(|c| c.comment.starts_with(GRADE_MARKER))
        .any(|c| match submission.submitted_at {
            Some(submitted_at) => c.created_at >= submitted_at,
            None => true,
        });

    !already_graded
}
