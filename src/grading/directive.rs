//! Descriptor parsing and application
//!
//! Reading a descriptor is split in two. `parse_directives` is a pure
//! function from text to a list of directives. `apply_directives` then
//! performs the I/O those directives ask for (fetching extra-file archives,
//! checking the `USING` executable, checking distributed settings) against
//! the assignment's fixed-files directory.
//!
//! Grammar, one directive per line, whitespace-separated tokens:
//!
//! ```text
//! Z <archive>        extra files extracted into the fixed directory
//! CTO <seconds>      timeout for precommand, evaluation and distributed pass
//! USING <file>       replaces ./evaluate.sh as {EVALUATE}
//! --DT--             enables the distributed test pass
//! ```
//!
//! Lines starting with any other token are ignored.

use std::path::{Component, Path};

use crate::config::RunConfig;
use crate::constants::{EXTRA_FILES_ARCHIVE, directives};
use crate::error::{GradeError, GradeResult};
use crate::models::{Directive, RemoteFile, TestDescriptor};
use crate::services::transfer::{FileTransfer, resolve_remote};

/// Parse descriptor text into directives, in file order.
pub fn parse_directives(text: &str) -> GradeResult<Vec<Directive>> {
    let mut parsed = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((keyword, args)) = tokens.split_first() else {
            continue;
        };

        let directive = match *keyword {
            directives::EXTRA_FILES => {
                let archive = args.concat();
                if archive.is_empty() {
                    return Err(invalid(line_no, "Z requires an archive name"));
                }
                Directive::ExtraFiles { archive }
            }
            directives::COMPILE_TIMEOUT => {
                let raw = args
                    .first()
                    .ok_or_else(|| invalid(line_no, "CTO requires a number of seconds"))?;
                let seconds = raw.parse::<u64>().map_err(|_| {
                    invalid(line_no, &format!("CTO value {:?} is not a whole number of seconds", raw))
                })?;
                Directive::CompileTimeout { seconds }
            }
            directives::USING => {
                let executable = args
                    .first()
                    .ok_or_else(|| invalid(line_no, "USING requires a file name"))?;
                Directive::Using {
                    executable: executable.to_string(),
                }
            }
            directives::DISTRIBUTED => Directive::DistributedTests,
            _ => continue,
        };

        parsed.push(directive);
    }

    Ok(parsed)
}

fn invalid(line: usize, message: &str) -> GradeError {
    GradeError::Descriptor {
        line,
        message: message.to_string(),
    }
}

impl TestDescriptor {
    /// Parse descriptor text without performing any of its side effects.
    pub fn parse(text: &str) -> GradeResult<Self> {
        Ok(Self::from_directives(&parse_directives(text)?))
    }
}

/// Everything `apply_directives` needs to act on a descriptor
pub struct ApplyContext<'a> {
    /// Files in the course's CodEval folder, looked up by `Z`
    pub spec_files: &'a [RemoteFile],
    pub transfer: &'a dyn FileTransfer,
    /// Assignment-wide fixed-files directory
    pub fixed_dir: &'a Path,
    pub run: &'a RunConfig,
}

/// Perform each directive's I/O in order and build the descriptor.
///
/// `USING` is checked against the fixed directory as it stands when the
/// line is reached, so the executable may come from an earlier `Z` archive.
pub async fn apply_directives(directives: &[Directive], ctx: &ApplyContext<'_>) -> GradeResult<TestDescriptor> {
    let mut descriptor = TestDescriptor::default();

    for directive in directives {
        match directive {
            Directive::ExtraFiles { archive } => {
                let file = resolve_remote(ctx.spec_files, archive)?;
                let dest = ctx.fixed_dir.join(EXTRA_FILES_ARCHIVE);

                tracing::debug!(archive = %archive, "Fetching extra files");
                ctx.transfer.download(&file.location, &dest).await?;
                ctx.transfer.extract_archive(&dest, ctx.fixed_dir, true).await?;
            }
            Directive::Using { executable } => {
                check_executable(ctx.fixed_dir, executable).await?;
                tracing::debug!(executable = %executable, "Evaluation entry point overridden");
            }
            Directive::DistributedTests => {
                ctx.run.require_distributed()?;
            }
            Directive::CompileTimeout { .. } => {}
        }

        descriptor.apply(directive);
    }

    Ok(descriptor)
}

/// A `USING` name must be a relative path inside the fixed directory that
/// names a regular file.
async fn check_executable(fixed_dir: &Path, executable: &str) -> GradeResult<()> {
    let path = Path::new(executable);
    let confined = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && path.components().any(|c| matches!(c, Component::Normal(_)));
    if !confined {
        return Err(GradeError::Configuration(format!(
            "{} must be a relative path inside the fixed files directory",
            executable
        )));
    }

    match tokio::fs::metadata(fixed_dir.join(path)).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(GradeError::Configuration(format!(
            "{} in the fixed files directory is not a file",
            executable
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(GradeError::Configuration(format!(
            "{} not found in the fixed files directory",
            executable
        ))),
        Err(e) => Err(e.into()),
    }
}
