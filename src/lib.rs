//! CodEval - Automated Grader for Student Code Submissions
//!
//! For every assignment with a grading descriptor, CodEval assembles a
//! working tree per submission (assignment-wide fixed files over the
//! student's extracted attachments), runs a configurable build step and
//! evaluation command under a timeout, optionally runs a distributed test
//! pass against a remote host, and posts the output back as a comment.
//!
//! # Architecture
//!
//! - **Grading**: descriptor parsing, workspace assembly, execution and
//!   orchestration
//! - **Services**: LMS and file transfer collaborators
//! - **Models**: descriptors, submissions and reports

pub mod config;
pub mod constants;
pub mod error;
pub mod grading;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{GradeError, GradeResult};
pub use grading::{BatchSummary, Orchestrator};
