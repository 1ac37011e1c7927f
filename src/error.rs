use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Every failure that can stop a batch run. None of them are recoverable.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("failed to open input `{path}`: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create output directory `{path}`: {source}")]
    CreateOutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed record #{position}: {source}")]
    MalformedRecord {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("record name `{name}` is not a safe file name: {reason}")]
    UnsafeRecordName { name: String, reason: &'static str },
    #[error("failed to stage output for record `{name}`: {source}")]
    Stage {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("tool `{binary}` could not be spawned for record `{name}`: {source}")]
    Spawn {
        binary: PathBuf,
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("tool exited with {status} for record `{name}`")]
    ToolFailed { name: String, status: ExitStatus },
    #[error("built-in engine failed for record `{name}`: {source}")]
    Engine {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to publish record `{name}` to `{path}`: {source}")]
    Publish {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
