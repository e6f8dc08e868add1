//! Error types for dataset materialization, attribution and reporting

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building image folders on disk.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// A class, concept or directory could not be located in the corpus.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The corpus holds fewer images than requested.
    #[error("Concept '{concept}' only contains {available} images. You requested {requested}")]
    InsufficientData {
        /// Concept or class name.
        concept: String,
        /// Images found in the corpus.
        available: usize,
        /// Images requested per folder.
        requested: usize,
    },

    /// Random sampling ran out of attempts before the folder was full.
    #[error("Random folder '{folder}' reached {collected}/{requested} images after {attempts} attempts")]
    RandomExhausted {
        /// Folder being filled.
        folder: String,
        /// Images copied so far.
        collected: usize,
        /// Images requested.
        requested: usize,
        /// Attempts made.
        attempts: usize,
    },

    /// A metadata file could not be parsed.
    #[error("Malformed metadata in {path} at line {line}: {message}")]
    Metadata {
        /// File being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Underlying filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Original error.
        #[source]
        source: std::io::Error,
    },
}

impl DatasetError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the external dataset tool process.
#[derive(Error, Debug)]
pub enum SubprocessError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    ExitStatus { program: PathBuf, status: String },
}

/// Errors raised by the attribution collaborator or its adapter.
#[derive(Error, Debug)]
pub enum AttributionError {
    /// Model graph or label file is missing.
    #[error("Model file not found: {0}")]
    ModelFiles(PathBuf),

    /// The attribution command could not be started.
    #[error("Failed to launch attribution command '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The attribution command exited unsuccessfully.
    #[error("Attribution command exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    /// The backend returned output that does not decode as a results set.
    #[error("Malformed attribution output: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Failure reported by a backend implementation.
    #[error("Attribution backend failed: {0}")]
    Backend(String),

    /// The backend produced no results at all.
    #[error("Attribution produced no results for target '{0}'")]
    EmptyResults(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while ranking scores.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReportError {
    /// Requested count is zero or exceeds the concepts available.
    #[error("Cannot report {requested} concept(s): {available} available")]
    InvalidCount { requested: usize, available: usize },
}
