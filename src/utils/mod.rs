//! Utility functions

pub mod archive;
pub mod fs;

pub use archive::{extract_zip, is_zip};
pub use fs::copy_dir_recursive;
