use std::path::PathBuf;
use thiserror::Error;

/// Failures of store and mediator operations. None of these reach the bridge.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("no active preset to save into")]
    NoActivePreset,
    #[error("bridge transport unavailable")]
    TransportUnavailable,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read schema file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse schema: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid descriptor for '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CaptureError {
    #[error("a capture is already running (started at {0})")]
    AlreadyActive(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}
