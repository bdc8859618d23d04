//! Per-submission working directory assembly

use std::path::Path;

use crate::error::GradeResult;
use crate::models::RemoteFile;
use crate::services::transfer::FileTransfer;
use crate::utils::copy_dir_recursive;

/// Fill `work_dir` with the student's attachments, then the fixed files.
///
/// Each attachment is downloaded under its display name, extracted in place
/// and removed. Fixed files are copied last, so they replace any student file
/// with the same name.
pub async fn build_workspace(
    transfer: &dyn FileTransfer,
    attachments: &[RemoteFile],
    fixed_dir: &Path,
    work_dir: &Path,
) -> GradeResult<()> {
    for attachment in attachments {
        let local = work_dir.join(&attachment.display_name);
        transfer.download(&attachment.location, &local).await?;
        transfer.extract_archive(&local, work_dir, true).await?;
    }

    let copied = copy_dir_recursive(fixed_dir, work_dir).await?;
    tracing::debug!(
        work_dir = %work_dir.display(),
        attachments = attachments.len(),
        fixed_files = copied,
        "Workspace ready"
    );

    Ok(())
}
