//! CodEval - Batch Grading Entry Point
//!
//! Grades every assignment of the course configured in the environment and
//! logs a summary of the reports produced.

use std::sync::Arc;

use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use codeval::{
    Config, Orchestrator,
    grading::JsonFileTracker,
    services::{LocalCourse, LocalFileStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first: it carries the log filter
    let config = Arc::new(Config::from_env()?);

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.rust_log.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        course = %config.storage.course_dir.display(),
        dry_run = config.grading.dry_run,
        force = config.grading.force,
        workers = config.grading.workers,
        "Starting CodEval"
    );

    let course_dir = config.storage.course_dir.clone();
    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(LocalCourse::new(&course_dir)),
        Arc::new(LocalFileStore::new(&course_dir)),
        Arc::new(JsonFileTracker::new(&config.storage.tracker_path)),
    );

    let run_id = Uuid::new_v4();
    let summary = orchestrator
        .grade_course()
        .instrument(tracing::info_span!("grade_run", %run_id))
        .await?;

    tracing::info!(
        assignments_graded = summary.assignments_graded,
        assignments_skipped = summary.assignments_skipped,
        succeeded = summary.succeeded,
        failed = summary.failed,
        errored = summary.errored,
        "Grading run complete"
    );

    Ok(())
}
