//! Assignment test descriptor model

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_COMPILE_TIMEOUT_SECONDS, DEFAULT_EXECUTABLE};

/// One recognised line of a descriptor file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// `Z <archive>` - extra files to fetch and extract into the fixed directory
    ExtraFiles { archive: String },
    /// `CTO <seconds>` - shared precommand/evaluation timeout
    CompileTimeout { seconds: u64 },
    /// `USING <file>` - replaces the default evaluation entry point
    Using { executable: String },
    /// `--DT--` - enables the distributed test pass
    DistributedTests,
}

/// Parsed grading configuration for one assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDescriptor {
    pub extra_file_archives: Vec<String>,
    pub compile_timeout_seconds: u64,
    pub executable_override: Option<String>,
    pub distributed_tests_enabled: bool,
}

impl Default for TestDescriptor {
    fn default() -> Self {
        Self {
            extra_file_archives: Vec::new(),
            compile_timeout_seconds: DEFAULT_COMPILE_TIMEOUT_SECONDS,
            executable_override: None,
            distributed_tests_enabled: false,
        }
    }
}

impl TestDescriptor {
    /// Fold directives in order; later `CTO`/`USING` lines win.
    pub fn from_directives(directives: &[Directive]) -> Self {
        directives
            .iter()
            .fold(Self::default(), |mut descriptor, directive| {
                descriptor.apply(directive);
                descriptor
            })
    }

    /// Record a single directive
    pub fn apply(&mut self, directive: &Directive) {
        match directive {
            Directive::ExtraFiles { archive } => self.extra_file_archives.push(archive.clone()),
            Directive::CompileTimeout { seconds } => self.compile_timeout_seconds = *seconds,
            Directive::Using { executable } => self.executable_override = Some(executable.clone()),
            Directive::DistributedTests => self.distributed_tests_enabled = true,
        }
    }

    /// Timeout applied to the precommand, evaluation and distributed pass
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_seconds)
    }

    /// Entry point substituted for `{EVALUATE}`
    pub fn executable(&self) -> &str {
        self.executable_override
            .as_deref()
            .unwrap_or(DEFAULT_EXECUTABLE)
    }
}
