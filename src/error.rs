// src/error.rs
//
// Error types for learnpath.
//
// - ValidationError: bad or missing input at a component boundary
// - ClusterError:    classifier construction / lookup failures
// - CatalogError:    course-definition structural failures (build time)
// - StorageError:    value-table persistence failures (fatal)
// - ConfigError:     config file / constraint failures

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A required input is missing or cannot be interpreted.
///
/// Always names the offending field so upstream pipelines can fix the
/// producer rather than guess.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid field `{field}`: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "required field is missing")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    #[error("no performance groups supplied")]
    Empty,

    #[error("group `{0}` appears more than once")]
    DuplicateGroup(String),

    #[error("group `{group}` has non-finite mean score {score}")]
    InvalidScore { group: String, score: f64 },

    #[error("unknown group `{0}`")]
    UnknownGroup(String),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read course document {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("course document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("duplicate action id `{0}`")]
    DuplicateId(String),

    #[error("missing `{field}` at {path}")]
    MissingField { path: String, field: String },

    #[error("course `{0}` contains no recommendable actions")]
    Empty(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot (de)serialize {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checksum mismatch in {path}: expected {expected}, found {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("unsupported artifact version {found} in {path} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("non-finite or out-of-range value in {path}: {detail}")]
    InvalidValue { path: PathBuf, detail: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Umbrella error for library entry points that cross components.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
