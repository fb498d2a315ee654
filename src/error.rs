//! Error taxonomy shared across the scanner, resolver, executor, and
//! orchestrator.
//!
//! Each module that can fail in a way callers need to distinguish defines its
//! own `thiserror` enum (see [`crate::block::decode::DecodeError`],
//! [`crate::config::IncludeError`], [`crate::executor::ExecError`]). This
//! module collects the subset of failures that propagate all the way to the
//! orchestrator and therefore determine the process exit code.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level failure kinds the orchestrator surfaces to its caller.
///
/// `MissingDependency` and `CircularDependency` abort the *current file's*
/// run and map to dedicated exit codes; every other variant becomes a
/// synthetic failed [`crate::result::TestResult`] for the owning file and
/// processing continues with the next file.
#[derive(Debug, Error)]
pub enum RestyError {
    /// A `yaml` fence was opened but never closed.
    #[error("unclosed ```yaml block starting at line {line} in {file}")]
    UnclosedBlock { file: PathBuf, line: usize },

    /// A fenced block failed to decode into a `Config` or `Test` block.
    #[error("failed to decode block at line {line} in {file}: {message}")]
    YamlDecodeError {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// A decoded block violated one of the test/config block invariants
    /// (e.g. `mock_only` without an inline mock or a method+URL).
    #[error("invalid test block at line {line} in {file}: {message}")]
    InvalidTest {
        file: PathBuf,
        line: usize,
        message: String,
    },

    /// An include formed a cycle back to a file already being processed.
    #[error("circular include detected: {0}")]
    CircularInclude(String),

    /// An `include:` path did not exist on disk.
    #[error("include file not found: {0}")]
    IncludeFileNotFound(PathBuf),

    /// A `requires` entry named a test that does not exist in the effective
    /// block set.
    #[error("test '{0}' requires unknown test '{1}'")]
    MissingDependency(String, String),

    /// A `requires` graph contains a cycle.
    #[error("circular dependency: {}", .0.join(" -> "))]
    CircularDependency(Vec<String>),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RestyError {
    /// Exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            RestyError::MissingDependency(..) => 3,
            RestyError::CircularDependency(_) => 4,
            RestyError::UnclosedBlock { .. }
            | RestyError::YamlDecodeError { .. }
            | RestyError::InvalidTest { .. }
            | RestyError::CircularInclude(_)
            | RestyError::IncludeFileNotFound(_)
            | RestyError::Io(_) => 2,
        }
    }
}
