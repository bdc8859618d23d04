//! Domain models
//!
//! This module contains all domain models used throughout the grader.

pub mod descriptor;
pub mod report;
pub mod submission;

pub use descriptor::*;
pub use report::*;
pub use submission::*;
