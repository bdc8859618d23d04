//! External collaborators

pub mod lms;
pub mod transfer;

pub use lms::{LmsClient, LocalCourse};
pub use transfer::{FileTransfer, LocalFileStore, resolve_remote};
