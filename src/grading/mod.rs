//! Grading engine
//!
//! Descriptor handling, workspace assembly, command execution, distributed
//! test coordination and the course-wide orchestration loop.

pub mod directive;
pub mod distributed;
pub mod engine;
pub mod orchestrator;
pub mod process;
pub mod regrade;
pub mod template;
pub mod workspace;

pub use directive::{ApplyContext, apply_directives, parse_directives};
pub use distributed::{DistributedCoordinator, DistributedTracker, JsonFileTracker};
pub use engine::ExecutionEngine;
pub use orchestrator::{BatchSummary, Orchestrator};
pub use regrade::should_grade;
pub use template::{CommandTemplate, TemplateError};
