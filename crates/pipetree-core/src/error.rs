//! Unified Error Model
use thiserror::Error;

/// Errors raised by the container tree, the persistence layer and the
/// pipeline evaluator.
#[derive(Error, Debug)]
pub enum PipetreeError {
    #[error("NAME/DUPLICATE: '{0}' already exists")]
    DuplicateName(String),

    #[error("NAME/NOT_FOUND: '{0}'")]
    NotFound(String),

    #[error("TREE/NOT_EXTENDABLE: '{0}' holds a fixed leaf payload")]
    NotExtendable(String),

    #[error(
        "META/LENGTH: key '{key}' has length {meta_len}, payload length is {}",
        payload_len.map(|n| n.to_string()).unwrap_or_else(|| "undeclared".to_string())
    )]
    MetaLengthMismatch {
        key: String,
        meta_len: usize,
        payload_len: Option<usize>,
    },

    #[error("PERSIST/UNSERIALIZABLE: node '{node}': {reason}")]
    Unserializable { node: String, reason: String },

    #[error("PERSIST/CORRUPT: {0}")]
    CorruptContainer(String),

    #[error("STEP/FAILED: '{step}': {source}")]
    StepFailed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("DEFINITION/{0}")]
    InvalidDefinition(String),

    #[error("IO/{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipetreeError>;

impl PipetreeError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }
}
