//! Distributed (secondary) test coordination
//!
//! After a submission passes locally, assignments with `--DT--` run a second
//! command against a remote host. The submission is registered as active in
//! a tracking store first, so the remote side can find it. When a local or
//! remote run fails, the record is marked inactive.
//!
//! Inactive marking is bookkeeping. It is spawned into a `JoinSet` owned by
//! the coordinator and never reports back to the grading path; `settle`
//! waits for the outstanding updates and logs their failures.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::config::DistributedConfig;
use crate::constants::{placeholders, timeout_notice};
use crate::error::{GradeError, GradeResult};
use crate::grading::process::{StreamMode, run_shell};
use crate::models::{RemoteFile, SubmissionContext};

/// Tracking entry for one student's submission to one assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedRecord {
    pub assignment_id: String,
    pub student_id: String,
    pub student_name: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub attachments: Vec<RemoteFile>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl DistributedRecord {
    pub fn new_active(ctx: &SubmissionContext) -> Self {
        Self {
            assignment_id: ctx.assignment_id.clone(),
            student_id: ctx.student_id.clone(),
            student_name: ctx.student_name.clone(),
            submitted_at: ctx.submitted_at,
            attachments: ctx.attachments.clone(),
            active: true,
            updated_at: Utc::now(),
        }
    }
}

/// Store of distributed submissions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributedTracker: Send + Sync {
    /// Insert or replace the record for the record's (assignment, student).
    async fn upsert_active(&self, record: &DistributedRecord) -> anyhow::Result<()>;

    /// Mark the record inactive. Returns false when there was no active
    /// record to update.
    async fn mark_inactive(&self, assignment_id: &str, student_id: &str) -> anyhow::Result<bool>;
}

/// Tracking store kept in a single JSON file
#[derive(Debug)]
pub struct JsonFileTracker {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonFileTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> anyhow::Result<Vec<DistributedRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, records: &[DistributedRecord]) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, serde_json::to_vec_pretty(records)?).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DistributedTracker for JsonFileTracker {
    async fn upsert_active(&self, record: &DistributedRecord) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        match records
            .iter_mut()
            .find(|r| r.assignment_id == record.assignment_id && r.student_id == record.student_id)
        {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }

        self.save(&records).await
    }

    async fn mark_inactive(&self, assignment_id: &str, student_id: &str) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let mut records = self.load().await?;

        let Some(record) = records
            .iter_mut()
            .find(|r| r.active && r.assignment_id == assignment_id && r.student_id == student_id)
        else {
            return Ok(false);
        };

        record.active = false;
        record.updated_at = Utc::now();
        self.save(&records).await?;
        Ok(true)
    }
}

/// Output of one distributed pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedOutcome {
    /// Combined output, with the timeout notice when the pass was killed
    pub output: Vec<u8>,
    pub passed: bool,
    pub timed_out: bool,
}

/// Runs distributed passes and owns the inactive-marking side channel
pub struct DistributedCoordinator {
    config: Option<DistributedConfig>,
    tracker: Arc<dyn DistributedTracker>,
    pending: Mutex<JoinSet<()>>,
}

impl DistributedCoordinator {
    pub fn new(config: Option<DistributedConfig>, tracker: Arc<dyn DistributedTracker>) -> Self {
        Self {
            config,
            tracker,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Register the submission and run the remote test command in its work
    /// directory, bounded by `limit`.
    pub async fn run_distributed(
        &self,
        ctx: &SubmissionContext,
        fixed_dir: &Path,
        limit: Duration,
    ) -> GradeResult<DistributedOutcome> {
        let config = self.config.as_ref().ok_or_else(|| {
            GradeError::Configuration("distributed tests requested but not configured".to_string())
        })?;

        let fixed = fixed_dir.to_string_lossy();
        let submissions = ctx.work_dir.to_string_lossy();
        let testcases = ctx.testcases_path();
        let testcases = testcases.to_string_lossy();
        let command = config.command.render(&[
            (placeholders::HOST, config.host_address.as_str()),
            (placeholders::FIXED, &*fixed),
            (placeholders::SUBMISSIONS, &*submissions),
            (placeholders::TESTCASES, &*testcases),
            (placeholders::ASSIGNMENT_ID, ctx.assignment_id.as_str()),
            (placeholders::STUDENT_ID, ctx.student_id.as_str()),
        ])?;

        self.tracker
            .upsert_active(&DistributedRecord::new_active(ctx))
            .await
            .map_err(|e| e.context("failed to register distributed submission"))?;

        tracing::info!(
            assignment_id = %ctx.assignment_id,
            student_id = %ctx.student_id,
            host = %config.host_address,
            "Running distributed tests"
        );

        // A pass that cannot start counts as failed; the caller marks the record inactive.
        let result = match run_shell(&command, &ctx.work_dir, limit, StreamMode::Combined).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    assignment_id = %ctx.assignment_id,
                    student_id = %ctx.student_id,
                    error = %e,
                    "Distributed tests could not be started"
                );
                return Ok(DistributedOutcome {
                    output: format!("\nDistributed tests could not be started: {}\n", e).into_bytes(),
                    passed: false,
                    timed_out: false,
                });
            }
        };
        let passed = result.success();
        let mut output = result.stdout;
        if result.timed_out {
            output.extend_from_slice(timeout_notice(limit.as_secs()).as_bytes());
        }

        Ok(DistributedOutcome {
            output,
            passed,
            timed_out: result.timed_out,
        })
    }

    /// Flag the student's distributed record inactive in the background.
    ///
    /// Never fails: errors surface only in the log when the update finishes.
    pub fn mark_inactive_if_present(&self, assignment_id: &str, student_id: &str) {
        let tracker = Arc::clone(&self.tracker);
        let assignment_id = assignment_id.to_string();
        let student_id = student_id.to_string();

        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        pending.spawn(async move {
            match tracker.mark_inactive(&assignment_id, &student_id).await {
                Ok(true) => tracing::info!(
                    assignment_id = %assignment_id,
                    student_id = %student_id,
                    "Distributed submission marked inactive"
                ),
                Ok(false) => tracing::debug!(
                    assignment_id = %assignment_id,
                    student_id = %student_id,
                    "No active distributed submission to mark"
                ),
                Err(e) => tracing::warn!(
                    assignment_id = %assignment_id,
                    student_id = %student_id,
                    error = ?e,
                    "Failed to mark distributed submission inactive"
                ),
            }
        });
    }

    /// Wait for every outstanding inactive-marking update.
    pub async fn settle(&self) {
        let mut pending = {
            let mut guard = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::take(&mut *guard)
        };

        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "Inactive-marking task did not complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn config(command: &str) -> DistributedConfig {
        DistributedConfig {
            command: CommandTemplate::parse(command, placeholders::DIST_COMMAND).unwrap(),
            host_address: "10.0.0.7".into(),
        }
    }

    fn accepting_tracker() -> MockDistributedTracker {
        let mut tracker = MockDistributedTracker::new();
        tracker.expect_upsert_active().times(1).returning(|_| Ok(()));
        tracker
    }

    #[tokio::test]
    async fn test_run_substitutes_placeholders() {
        let work = tempfile::tempdir().unwrap();
        let fixed = tempfile::tempdir().unwrap();
        std::fs::write(work.path().join("testcases.txt"), "CTO 5\n").unwrap();

        let coordinator = DistributedCoordinator::new(
            Some(config("echo host={HOST} student={STUDENT_ID} assignment={ASSIGNMENT_ID}; cat {TESTCASES}")),
            Arc::new(accepting_tracker()),
        );

        let outcome = coordinator
            .run_distributed(&context(work.path()), fixed.path(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(outcome.passed);
        assert_eq!(
            String::from_utf8_lossy(&outcome.output),
            "host=10.0.0.7 student=42 assignment=7\nCTO 5\n"
        );
    }

    #[tokio::test]
    async fn test_timeout_appends_notice() {
        let work = tempfile::tempdir().unwrap();
        let coordinator =
            DistributedCoordinator::new(Some(config("echo begin; sleep 30")), Arc::new(accepting_tracker()));

        let outcome = coordinator
            .run_distributed(&context(work.path()), work.path(), Duration::from_secs(1))
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.passed);
        let text = String::from_utf8_lossy(&outcome.output);
        assert!(text.starts_with("begin\n"));
        assert!(text.contains("TOOK LONGER THAN 1 seconds to run. FAILED"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_failed_pass() {
        let work = tempfile::tempdir().unwrap();
        let missing = work.path().join("removed");
        let coordinator =
            DistributedCoordinator::new(Some(config("echo never")), Arc::new(accepting_tracker()));

        let outcome = coordinator
            .run_distributed(&context(&missing), work.path(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!outcome.passed);
        assert!(!outcome.timed_out);
        assert!(String::from_utf8_lossy(&outcome.output).contains("could not be started"));
    }

    #[tokio::test]
    async fn test_unconfigured_is_configuration_error() {
        let work = tempfile::tempdir().unwrap();
        let coordinator = DistributedCoordinator::new(None, Arc::new(MockDistributedTracker::new()));

        let err = coordinator
            .run_distributed(&context(work.path()), work.path(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn test_mark_inactive_errors_are_swallowed() {
        let mut tracker = MockDistributedTracker::new();
        tracker
            .expect_mark_inactive()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("tracker offline")));

        let coordinator = DistributedCoordinator::new(None, Arc::new(tracker));
        coordinator.mark_inactive_if_present("7", "42");
        coordinator.settle().await;
    }

    #[tokio::test]
    async fn test_json_tracker_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/tracking.json");
        let tracker = JsonFileTracker::new(&path);

        assert!(!tracker.mark_inactive("7", "42").await.unwrap());

        let work = tempfile::tempdir().unwrap();
        tracker
            .upsert_active(&DistributedRecord::new_active(&context(work.path())))
            .await
            .unwrap();
        assert!(tracker.mark_inactive("7", "42").await.unwrap());
        // Second call is a no-op.
        assert!(!tracker.mark_inactive("7", "42").await.unwrap());

        let reloaded = JsonFileTracker::new(&path).load().await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(!reloaded[0].active);
    }

    #[tokio::test]
    async fn test_coordinator_marks_through_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let tracker = Arc::new(JsonFileTracker::new(dir.path().join("tracking.json")));
        tracker
            .upsert_active(&DistributedRecord::new_active(&context(work.path())))
            .await
            .unwrap();

        let coordinator = DistributedCoordinator::new(None, tracker.clone());
        coordinator.mark_inactive_if_present("7", "42");
        coordinator.settle().await;

        let records = tracker.load().await.unwrap();
        assert!(!records[0].active);
    }
}
