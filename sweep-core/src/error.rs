//! Error types.

use std::io;
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

/// Crate-wide error type.
///
/// Every variant produced while handling a config file names that file, so
/// the batch driver can report it and move on to the next one.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IoError(String),

    #[error("{}: failed reading config file: {source}", .path.display())]
    ParseIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed parsing settings file {}: {message}", .path.display())]
    SettingsError { path: PathBuf, message: String },

    #[error("{}: no job is given", .config.display())]
    NoJobs { config: PathBuf },
    #[error("{}: duplicate job names: {names:?}", .config.display())]
    DuplicateJobs { config: PathBuf, names: Vec<String> },
    #[error("{}: whitespace in job names: {names:?}", .config.display())]
    WhitespaceInJobName { config: PathBuf, names: Vec<String> },
    #[error(
        "{}: job names must be plain directory names: {names:?}",
        .config.display()
    )]
    InvalidJobName { config: PathBuf, names: Vec<String> },
    #[error("{}: no parameter is given", .config.display())]
    NoParameters { config: PathBuf },
    #[error(
        "{}: parameter group size must be 1 or {jobs} (group index, size): {groups:?}",
        .config.display()
    )]
    CardinalityMismatch {
        config: PathBuf,
        jobs: usize,
        groups: Vec<(usize, usize)>,
    },
    #[error("{}: referenced files do not exist: {files:?}", .config.display())]
    MissingReferencedFile { config: PathBuf, files: Vec<String> },
    #[error(
        "{}: process count must be a positive 32-bit integer: {line}",
        .config.display()
    )]
    InvalidProcessCount { config: PathBuf, line: String },

    #[error(
        "{}: cluster allocation count must match job count (expected={expected}, actual={actual})",
        .config.display()
    )]
    ClusterCardinalityMismatch {
        config: PathBuf,
        expected: usize,
        actual: usize,
    },
    #[error("{}: malformed cluster allocation line: {line}", .config.display())]
    MalformedClusterLine { config: PathBuf, line: String },
    #[error(
        "{}: parallel process counts do not match host slots (expected={expected:?}, actual={actual:?})",
        .config.display()
    )]
    ClusterSlotMismatch {
        config: PathBuf,
        expected: Vec<u32>,
        actual: Vec<u32>,
    },

    #[error("artifact does not exist: {}", .0.display())]
    ArtifactMissing(PathBuf),
    #[error("failed spawning `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    /// Returns true for errors raised by the validator.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NoJobs { .. }
                | Error::DuplicateJobs { .. }
                | Error::WhitespaceInJobName { .. }
                | Error::InvalidJobName { .. }
                | Error::NoParameters { .. }
                | Error::CardinalityMismatch { .. }
                | Error::MissingReferencedFile { .. }
                | Error::InvalidProcessCount { .. }
                | Error::ClusterCardinalityMismatch { .. }
                | Error::MalformedClusterLine { .. }
                | Error::ClusterSlotMismatch { .. }
        )
    }
}

#[test]
fn slot_mismatch_message_lists_both_counts() {
    let e = Error::ClusterSlotMismatch {
        config: PathBuf::from("sweep.ini"),
        expected: vec![4, 2],
        actual: vec![4, 3],
    };
    let msg = e.to_string();
    assert!(msg.starts_with("sweep.ini:"));
    assert!(msg.contains("expected=[4, 2], actual=[4, 3]"));
    assert!(e.is_validation());
}
