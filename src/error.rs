//! Error taxonomy shared by the matcher, the backends, the executor and the sink.
//!
//! Only [`PatternError`], [`BatchError`] and [`SinkError`] ever reach the caller.
//! [`DecompileError`] is recovered inside the batch and turned into a placeholder
//! stub, so one bad class never stops the others.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PatternError {
    #[error("class name pattern is empty")]
    EmptyName,
    #[error("package name pattern is empty")]
    EmptyPackage,
    #[error("invalid class name pattern `{pattern}`")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum DecompileError {
    #[error("failed to launch {program}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("decompiler exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("class {0} not found in jar")]
    ClassNotFound(String),
    #[error("decompiler produced no source for {0}")]
    NoOutput(String),
    #[error("decompilation of {0} was cancelled")]
    Cancelled(String),
    #[error("decompiler panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch was aborted before every class settled")]
    Aborted,
    #[error("failed to create decompiler backend")]
    Backend(#[source] DecompileError),
    #[error("failed to build worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to spawn batch thread")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write archive {}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}
