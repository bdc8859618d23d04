//! Course-wide grading pass
//!
//! For each assignment with a descriptor, the orchestrator builds one fixed
//! directory, then grades every eligible submission in its own work
//! directory. A failure while preparing an assignment skips that assignment;
//! a failure while grading a submission becomes that submission's report.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;

use crate::config::Config;
use crate::constants::{DESCRIPTOR_FILE_NAME, DESCRIPTOR_SUFFIX, TEMP_DIR_PREFIX};
use crate::error::GradeResult;
use crate::grading::directive::{ApplyContext, apply_directives, parse_directives};
use crate::grading::distributed::{DistributedCoordinator, DistributedTracker};
use crate::grading::engine::ExecutionEngine;
use crate::grading::regrade::should_grade;
use crate::grading::workspace::build_workspace;
use crate::models::{
    Assignment, EvaluationResult, GradeReport, RemoteFile, ReportKind, Submission, SubmissionContext,
    TestDescriptor,
};
use crate::services::lms::LmsClient;
use crate::services::transfer::{FileTransfer, resolve_remote};
use crate::utils::copy_dir_recursive;

/// Counts for one `grade_course` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub assignments_graded: usize,
    pub assignments_skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
}

impl BatchSummary {
    fn record(&mut self, kind: ReportKind) {
        match kind {
            ReportKind::Success => self.succeeded += 1,
            ReportKind::Failure => self.failed += 1,
            ReportKind::InfrastructureError => self.errored += 1,
        }
    }

    pub fn reports(&self) -> usize {
        self.succeeded + self.failed + self.errored
    }
}

pub struct Orchestrator {
    config: Arc<Config>,
    lms: Arc<dyn LmsClient>,
    transfer: Arc<dyn FileTransfer>,
    engine: ExecutionEngine,
    coordinator: Arc<DistributedCoordinator>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        lms: Arc<dyn LmsClient>,
        transfer: Arc<dyn FileTransfer>,
        tracker: Arc<dyn DistributedTracker>,
    ) -> Self {
        let coordinator = Arc::new(DistributedCoordinator::new(
            config.run.distributed.clone(),
            tracker,
        ));
        let engine = ExecutionEngine::new(config.run.clone(), coordinator.clone());

        Self {
            config,
            lms,
            transfer,
            engine,
            coordinator,
        }
    }

    /// Grade every assignment that has a descriptor in the CodEval folder.
    ///
    /// Only failing to list the course itself is an error.
    pub async fn grade_course(&self) -> GradeResult<BatchSummary> {
        let mut summary = BatchSummary::default();

        let spec_files = self.lms.spec_files().await?;
        if !spec_files
            .iter()
            .any(|f| f.display_name.ends_with(DESCRIPTOR_SUFFIX))
        {
            tracing::error!("No *{} files found in the CodEval folder", DESCRIPTOR_SUFFIX);
            return Ok(summary);
        }

        if self.config.grading.dry_run {
            tracing::warn!("This is a dry run. No comments will be posted.");
        }

        for assignment in self.lms.assignments().await? {
            let spec_name = format!("{}{}", assignment.name, DESCRIPTOR_SUFFIX);
            if !spec_files.iter().any(|f| f.display_name == spec_name) {
                tracing::debug!(assignment = %assignment.name, "Skipping assignment without descriptor");
                continue;
            }

            match self.grade_assignment(&assignment, &spec_files, &mut summary).await {
                Ok(()) => summary.assignments_graded += 1,
                Err(e) => {
                    tracing::warn!(
                        assignment = %assignment.name,
                        error = ?e,
                        "Could not process assignment, skipping"
                    );
                    summary.assignments_skipped += 1;
                }
            }

            self.coordinator.settle().await;
        }

        Ok(summary)
    }

    async fn grade_assignment(
        &self,
        assignment: &Assignment,
        spec_files: &[RemoteFile],
        summary: &mut BatchSummary,
    ) -> GradeResult<()> {
        let fixed = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .suffix("fixed")
            .tempdir()?;
        let descriptor = self.prepare_assignment(assignment, spec_files, fixed.path()).await?;

        let eligible: Vec<Submission> = self
            .lms
            .submissions(assignment)
            .await?
            .into_iter()
            .filter(|s| s.has_attachments() && should_grade(s, self.config.grading.force))
            .collect();

        tracing::info!(
            assignment = %assignment.name,
            submissions = eligible.len(),
            timeout_secs = descriptor.compile_timeout_seconds,
            distributed = descriptor.distributed_tests_enabled,
            "Grading assignment"
        );

        let kinds: Vec<ReportKind> = futures::stream::iter(eligible.iter())
            .map(|submission| self.grade_submission(assignment, submission, &descriptor, fixed.path()))
            .buffered(self.config.grading.workers)
            .collect()
            .await;

        for kind in kinds {
            summary.record(kind);
        }
        Ok(())
    }

    /// Fetch and apply the assignment's descriptor into `fixed_dir`.
    async fn prepare_assignment(
        &self,
        assignment: &Assignment,
        spec_files: &[RemoteFile],
        fixed_dir: &Path,
    ) -> GradeResult<TestDescriptor> {
        let spec = resolve_remote(spec_files, &format!("{}{}", assignment.name, DESCRIPTOR_SUFFIX))?;
        let testcases = fixed_dir.join(DESCRIPTOR_FILE_NAME);
        self.transfer.download(&spec.location, &testcases).await?;

        let text = tokio::fs::read_to_string(&testcases).await?;
        let directives = parse_directives(&text)?;
        let ctx = ApplyContext {
            spec_files,
            transfer: self.transfer.as_ref(),
            fixed_dir,
            run: &self.config.run,
        };

        apply_directives(&directives, &ctx).await
    }

    async fn grade_submission(
        &self,
        assignment: &Assignment,
        submission: &Submission,
        descriptor: &TestDescriptor,
        fixed_dir: &Path,
    ) -> ReportKind {
        tracing::debug!(
            assignment = %assignment.name,
            student = %submission.user.name,
            "Checking submission"
        );

        let report = match self.evaluate_submission(assignment, submission, descriptor, fixed_dir).await {
            Ok(result) => GradeReport::from_evaluation(&result),
            Err(e) => {
                tracing::info!(
                    assignment = %assignment.name,
                    submission_id = %submission.id,
                    error_code = e.error_code(),
                    error = ?e,
                    "Could not evaluate submission"
                );
                GradeReport::from_error(&e)
            }
        };

        tracing::info!(
            assignment = %assignment.name,
            student = %submission.user.name,
            kind = %report.kind,
            "Submission graded"
        );

        self.deliver(assignment, submission, &report).await;
        report.kind
    }

    /// Run one submission in a fresh work directory, removed on return.
    async fn evaluate_submission(
        &self,
        assignment: &Assignment,
        submission: &Submission,
        descriptor: &TestDescriptor,
        fixed_dir: &Path,
    ) -> GradeResult<EvaluationResult> {
        let work = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .suffix("submission")
            .tempdir()?;
        let ctx = SubmissionContext::new(assignment, submission, work.path());

        let result = self.build_and_run(&ctx, descriptor, fixed_dir).await;

        if self.config.grading.copy_tmpdir {
            self.preserve(work.path()).await;
        }
        result
    }

    async fn build_and_run(
        &self,
        ctx: &SubmissionContext,
        descriptor: &TestDescriptor,
        fixed_dir: &Path,
    ) -> GradeResult<EvaluationResult> {
        build_workspace(self.transfer.as_ref(), &ctx.attachments, fixed_dir, &ctx.work_dir).await?;
        self.engine.run(ctx, descriptor, fixed_dir).await
    }

    async fn preserve(&self, work_dir: &Path) {
        let Some(name) = work_dir.file_name() else {
            return;
        };
        let target = self.config.grading.preserve_dir.join(name);

        match copy_dir_recursive(work_dir, &target).await {
            Ok(files) => tracing::info!(
                from = %work_dir.display(),
                to = %target.display(),
                files,
                "Preserved work directory"
            ),
            Err(e) => tracing::warn!(
                from = %work_dir.display(),
                error = %e,
                "Failed to preserve work directory"
            ),
        }
    }

    async fn deliver(&self, assignment: &Assignment, submission: &Submission, report: &GradeReport) {
        if self.config.grading.dry_run {
            tracing::info!(
                student = %submission.user.name,
                "Would have said {} to {}",
                report.text,
                submission.user.name
            );
            return;
        }

        if let Err(e) = self
            .lms
            .post_comment(assignment, submission, &report.comment_text())
            .await
        {
            tracing::warn!(
                assignment = %assignment.name,
                student = %submission.user.name,
                error = %e,
                "Failed to post grade comment"
            );
        }
    }
}
