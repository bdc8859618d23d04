//! Two-phase submission execution
//!
//! ```text
//! Pending -> Precompiling -> Evaluating -> Succeeded | Failed | TimedOut
//! Succeeded -> DistributedTesting -> DistSucceeded | DistFailed
//! ```
//!
//! The precommand and the evaluation command share the descriptor's timeout
//! and both run in the submission's work directory. Nothing is retried.

use std::path::Path;
use std::sync::Arc;

use crate::config::RunConfig;
use crate::constants::{placeholders, timeout_notice};
use crate::error::{GradeError, GradeResult};
use crate::grading::distributed::DistributedCoordinator;
use crate::grading::process::{StreamMode, run_shell};
use crate::models::{EvaluationResult, ExecutionState, SubmissionContext, TestDescriptor};

/// Runs the configured commands against one prepared work directory
pub struct ExecutionEngine {
    run: RunConfig,
    coordinator: Arc<DistributedCoordinator>,
}

impl ExecutionEngine {
    pub fn new(run: RunConfig, coordinator: Arc<DistributedCoordinator>) -> Self {
        Self { run, coordinator }
    }

    /// Execute one submission.
    ///
    /// Failing and timed-out evaluations are results, not errors. `Err` means
    /// the submission could not be evaluated at all (precommand failure,
    /// spawn failure, tracking store failure).
    pub async fn run(
        &self,
        ctx: &SubmissionContext,
        descriptor: &TestDescriptor,
        fixed_dir: &Path,
    ) -> GradeResult<EvaluationResult> {
        let limit = descriptor.timeout();
        let work_dir = ctx.work_dir.to_string_lossy();
        let mut state = ExecutionState::Pending;

        if let Some(precommand) = &self.run.precommand {
            advance(ctx, &mut state, ExecutionState::Precompiling);
            let command = precommand.render(&[(placeholders::SUBMISSIONS, &*work_dir)])?;
            let result = run_shell(&command, &ctx.work_dir, limit, StreamMode::Separate).await?;

            if result.timed_out {
                return Err(GradeError::Precommand(format!(
                    "precommand took longer than {} seconds",
                    descriptor.compile_timeout_seconds
                )));
            }
            if !result.stderr.is_empty() {
                return Err(GradeError::Precommand(
                    String::from_utf8_lossy(&result.stderr).trim_end().to_string(),
                ));
            }
        }

        advance(ctx, &mut state, ExecutionState::Evaluating);
        let command = self.run.evaluate_command.render(&[
            (placeholders::EVALUATE, descriptor.executable()),
            (placeholders::SUBMISSIONS, &*work_dir),
        ])?;
        let result = run_shell(&command, &ctx.work_dir, limit, StreamMode::Combined).await?;

        let passed = result.success();
        let exit_code = result.exit_code();
        let mut output = result.stdout;

        if result.timed_out {
            output.extend_from_slice(timeout_notice(descriptor.compile_timeout_seconds).as_bytes());
            self.coordinator
                .mark_inactive_if_present(&ctx.assignment_id, &ctx.student_id);
            advance(ctx, &mut state, ExecutionState::TimedOut);
            return Ok(EvaluationResult {
                output,
                exit_code: None,
                timed_out: true,
                state,
            });
        }

        if !passed {
            self.coordinator
                .mark_inactive_if_present(&ctx.assignment_id, &ctx.student_id);
            advance(ctx, &mut state, ExecutionState::Failed);
            return Ok(EvaluationResult {
                output,
                exit_code,
                timed_out: false,
                state,
            });
        }

        advance(ctx, &mut state, ExecutionState::Succeeded);

        if descriptor.distributed_tests_enabled {
            advance(ctx, &mut state, ExecutionState::DistributedTesting);
            let outcome = self.coordinator.run_distributed(ctx, fixed_dir, limit).await?;
            output.extend_from_slice(&outcome.output);

            if outcome.passed {
                advance(ctx, &mut state, ExecutionState::DistSucceeded);
            } else {
                self.coordinator
                    .mark_inactive_if_present(&ctx.assignment_id, &ctx.student_id);
                advance(ctx, &mut state, ExecutionState::DistFailed);
            }
        }

        Ok(EvaluationResult {
            output,
            exit_code,
            timed_out: false,
            state,
        })
    }
}

fn advance(ctx: &SubmissionContext, state: &mut ExecutionState, next: ExecutionState) {
    tracing::debug!(
        assignment_id = %ctx.assignment_id,
        student_id = %ctx.student_id,
        from = %state,
        to = %next,
        "Execution state changed"
    );
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistributedConfig;
    use crate::grading::distributed::{DistributedTracker, MockDistributedTracker};
    use crate::grading::template::CommandTemplate;

    fn context(work_dir: &Path) -> SubmissionContext {
        SubmissionContext {
            assignment_id: "7".into(),
            student_id: "42".into(),
            student_name: "Ada".into(),
            submitted_at: None,
            attachments: vec![],
            work_dir: work_dir.to_path_buf(),
        }
    }

    fn engine(
        evaluate: &str,
        precommand: Option<&str>,
        dist: Option<&str>,
        tracker: MockDistributedTracker,
    ) -> (ExecutionEngine, Arc<DistributedCoordinator>) {
        let run = RunConfig {
            evaluate_command: CommandTemplate::parse(evaluate, placeholders::EVALUATE_COMMAND).unwrap(),
            precommand: precommand.map(|p| CommandTemplate::parse(p, placeholders::PRECOMMAND).unwrap()),
            distributed: dist.map(|d| DistributedConfig {
                command: CommandTemplate::parse(d, placeholders::DIST_COMMAND).unwrap(),
                host_address: "10.0.0.7".into(),
            }),
        };
        let tracker: Arc<dyn DistributedTracker> = Arc::new(tracker);
        let coordinator = Arc::new(DistributedCoordinator::new(run.distributed.clone(), tracker));
        (ExecutionEngine::new(run, coordinator.clone()), coordinator)
    }

    fn expect_marked_inactive() -> MockDistributedTracker {
        let mut tracker = MockDistributedTracker::new();
        tracker.expect_mark_inactive().times(1).returning(|_, _| Ok(false));
        tracker
    }

    fn descriptor(seconds: u64) -> TestDescriptor {
        TestDescriptor {
            compile_timeout_seconds: seconds,
            ..TestDescriptor::default()
        }
    }

    #[tokio::test]
    async fn test_successful_evaluation() {
        let work = tempfile::tempdir().unwrap();
        let (engine, _) = engine("echo running {EVALUATE}", None, None, MockDistributedTracker::new());

        let result = engine
            .run(&context(work.path()), &descriptor(10), work.path())
            .await
            .unwrap();

        assert!(result.passed());
        assert_eq!(result.state, ExecutionState::Succeeded);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.output, b"running ./evaluate.sh\n");
    }

    #[tokio::test]
    async fn test_using_overrides_executable() {
        let work = tempfile::tempdir().unwrap();
        let (engine, _) = engine("echo {EVALUATE}", None, None, MockDistributedTracker::new());
        let descriptor = TestDescriptor {
            executable_override: Some("run.sh".into()),
            ..descriptor(10)
        };

        let result = engine.run(&context(work.path()), &descriptor, work.path()).await.unwrap();
        assert_eq!(result.output, b"run.sh\n");
    }

    #[tokio::test]
    async fn test_failure_marks_inactive() {
        let work = tempfile::tempdir().unwrap();
        let (engine, coordinator) = engine("echo wrong answer; exit 1", None, None, expect_marked_inactive());

        let result = engine
            .run(&context(work.path()), &descriptor(10), work.path())
            .await
            .unwrap();
        coordinator.settle().await;

        assert_eq!(result.state, ExecutionState::Failed);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.output, b"wrong answer\n");
    }

    #[tokio::test]
    async fn test_timeout_keeps_output_and_marks_inactive() {
        let work = tempfile::tempdir().unwrap();
        let (engine, coordinator) = engine("echo partial; sleep 30", None, None, expect_marked_inactive());

        let result = engine
            .run(&context(work.path()), &descriptor(1), work.path())
            .await
            .unwrap();
        coordinator.settle().await;

        assert!(result.timed_out);
        assert_eq!(result.state, ExecutionState::TimedOut);
        assert_eq!(
            String::from_utf8_lossy(&result.output),
            "partial\n\nTOOK LONGER THAN 1 seconds to run. FAILED\n"
        );
    }

    #[tokio::test]
    async fn test_precommand_stderr_aborts() {
        let work = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            "touch evaluated",
            Some("echo 'main.c:1: error' >&2"),
            None,
            MockDistributedTracker::new(),
        );

        let err = engine
            .run(&context(work.path()), &descriptor(10), work.path())
            .await
            .unwrap_err();

        assert!(matches!(err, GradeError::Precommand(ref m) if m == "main.c:1: error"));
        assert!(!work.path().join("evaluated").exists());
    }

    #[tokio::test]
    async fn test_precommand_timeout_aborts() {
        let work = tempfile::tempdir().unwrap();
        let (engine, _) = engine("touch evaluated", Some("sleep 30"), None, MockDistributedTracker::new());

        let err = engine
            .run(&context(work.path()), &descriptor(1), work.path())
            .await
            .unwrap_err();

        assert!(matches!(err, GradeError::Precommand(ref m) if m.contains("longer than 1 seconds")));
        assert!(!work.path().join("evaluated").exists());
    }

    #[tokio::test]
    async fn test_precommand_runs_before_evaluation() {
        let work = tempfile::tempdir().unwrap();
        let (engine, _) = engine(
            "cat built.txt",
            Some("echo built > {SUBMISSIONS}/built.txt"),
            None,
            MockDistributedTracker::new(),
        );

        let result = engine
            .run(&context(work.path()), &descriptor(10), work.path())
            .await
            .unwrap();
        assert_eq!(result.output, b"built\n");
    }

    #[tokio::test]
    async fn test_distributed_output_is_appended() {
        let work = tempfile::tempdir().unwrap();
        let mut tracker = MockDistributedTracker::new();
        tracker.expect_upsert_active().times(1).returning(|_| Ok(()));
        let (engine, _) = engine("echo local", None, Some("echo remote {HOST}"), tracker);
        let descriptor = TestDescriptor {
            distributed_tests_enabled: true,
            ..descriptor(10)
        };

        let result = engine.run(&context(work.path()), &descriptor, work.path()).await.unwrap();

        assert_eq!(result.state, ExecutionState::DistSucceeded);
        assert_eq!(result.output, b"local\nremote 10.0.0.7\n");
    }

    #[tokio::test]
    async fn test_distributed_failure_marks_inactive() {
        let work = tempfile::tempdir().unwrap();
        let mut tracker = expect_marked_inactive();
        tracker.expect_upsert_active().times(1).returning(|_| Ok(()));
        let (engine, coordinator) = engine("echo local", None, Some("echo remote; exit 2"), tracker);
        let descriptor = TestDescriptor {
            distributed_tests_enabled: true,
            ..descriptor(10)
        };

        let result = engine.run(&context(work.path()), &descriptor, work.path()).await.unwrap();
        coordinator.settle().await;

        assert_eq!(result.state, ExecutionState::DistFailed);
        assert!(!result.passed());
        assert_eq!(result.output, b"local\nremote\n");
    }

    fn distributed_descriptor(seconds: u64) -> TestDescriptor {
        TestDescriptor {
            distributed_tests_enabled: true,
            ..descriptor(seconds)
        }
    }

    #[tokio::test]
    async fn test_failed_local_run_skips_distributed_pass() {
        let work = tempfile::tempdir().unwrap();
        let mut tracker = expect_marked_inactive();
        tracker.expect_upsert_active().times(0);
        let (engine, coordinator) = engine("echo broken; exit 1", None, Some("touch remote-ran"), tracker);

        let result = engine
            .run(&context(work.path()), &distributed_descriptor(10), work.path())
            .await
            .unwrap();
        coordinator.settle().await;

        assert_eq!(result.state, ExecutionState::Failed);
        assert_eq!(result.output, b"broken\n");
        assert!(!work.path().join("remote-ran").exists());
    }

    #[tokio::test]
    async fn test_timed_out_local_run_skips_distributed_pass() {
        let work = tempfile::tempdir().unwrap();
        let mut tracker = expect_marked_inactive();
        tracker.expect_upsert_active().times(0);
        let (engine, coordinator) = engine("sleep 30", None, Some("touch remote-ran"), tracker);

        let result = engine
            .run(&context(work.path()), &distributed_descriptor(1), work.path())
            .await
            .unwrap();
        coordinator.settle().await;

        assert_eq!(result.state, ExecutionState::TimedOut);
        assert!(result.timed_out);
        assert!(!work.path().join("remote-ran").exists());
    }
}
