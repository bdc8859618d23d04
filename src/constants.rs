//! Application-wide constants
//!
//! This module contains all constant values used throughout the grader.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// DESCRIPTOR DEFAULTS
// =============================================================================

/// Default compile/evaluate timeout in seconds when no `CTO` directive is given
pub const DEFAULT_COMPILE_TIMEOUT_SECONDS: u64 = 20;

/// Default evaluation entry point substituted for `{EVALUATE}`
pub const DEFAULT_EXECUTABLE: &str = "./evaluate.sh";

/// Directive keywords (case-sensitive, matched as the first token)
pub mod directives {
    pub const EXTRA_FILES: &str = "Z";
    pub const COMPILE_TIMEOUT: &str = "CTO";
    pub const USING: &str = "USING";
    pub const DISTRIBUTED: &str = "--DT--";
}

// =============================================================================
// COURSE LAYOUT
// =============================================================================

/// Suffix of per-assignment descriptor files in the CodEval folder
pub const DESCRIPTOR_SUFFIX: &str = ".codeval";

/// Name the descriptor is saved under inside the fixed-files directory
pub const DESCRIPTOR_FILE_NAME: &str = "testcases.txt";

/// Name extra-file archives are downloaded under before extraction
pub const EXTRA_FILES_ARCHIVE: &str = "extrafiles.zip";

/// Folder (under the course root) holding descriptors and extra archives
pub const CODEVAL_FOLDER: &str = "codeval";

/// Temp directory prefix for both fixed and submission directories
pub const TEMP_DIR_PREFIX: &str = "codeval";

// =============================================================================
// REPORTING
// =============================================================================

/// Marker prefix identifying automated grade comments
pub const GRADE_MARKER: &str = "[AG]";

/// Build the diagnostic appended to output when a command exceeds its timeout
pub fn timeout_notice(seconds: u64) -> String {
    format!("\nTOOK LONGER THAN {} seconds to run. FAILED\n", seconds)
}

// =============================================================================
// COMMAND TEMPLATES
// =============================================================================

/// Placeholder tokens recognised in command templates
pub mod placeholders {
    pub const EVALUATE: &str = "EVALUATE";
    pub const SUBMISSIONS: &str = "SUBMISSIONS";
    pub const HOST: &str = "HOST";
    pub const FIXED: &str = "FIXED";
    pub const TESTCASES: &str = "TESTCASES";
    pub const ASSIGNMENT_ID: &str = "ASSIGNMENT_ID";
    pub const STUDENT_ID: &str = "STUDENT_ID";

    /// Tokens allowed in the evaluation command
    pub const EVALUATE_COMMAND: &[&str] = &[EVALUATE, SUBMISSIONS];

    /// Tokens allowed in the precommand
    pub const PRECOMMAND: &[&str] = &[SUBMISSIONS];

    /// Tokens allowed in the distributed test command
    pub const DIST_COMMAND: &[&str] =
        &[HOST, FIXED, SUBMISSIONS, TESTCASES, ASSIGNMENT_ID, STUDENT_ID];
}

// =============================================================================
// PROCESS CONTROL
// =============================================================================

/// How long to keep draining output after a child exits or is killed (ms)
pub const OUTPUT_DRAIN_GRACE_MS: u64 = 2000;

// =============================================================================
// RUN DEFAULTS
// =============================================================================

/// Default number of submissions graded concurrently
pub const DEFAULT_WORKERS: usize = 1;

/// Default path of the distributed tracking store
pub const DEFAULT_TRACKER_PATH: &str = "distributed_tracking.json";
