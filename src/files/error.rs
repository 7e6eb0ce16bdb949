//! File operation error types

use thiserror::Error;

use crate::link::LinkError;

#[derive(Error, Debug)]
pub enum FileOpError {
    /// Rejected before any remote call
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: LinkError,
    },

    #[error("Upload batch partially failed: {succeeded} succeeded, {failed} failed")]
    PartialBatchFailure { succeeded: usize, failed: usize },

    #[error("Upload batch failed: all {failed} item(s) failed")]
    BatchFailed { failed: usize },

    #[error("An upload batch is already running")]
    BatchInProgress,

    #[error("No files selected")]
    EmptyBatch,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FileOpError {
    pub fn validation(message: impl Into<String>) -> Self {
        FileOpError::Validation(message.into())
    }

    pub fn remote(operation: impl Into<String>, source: LinkError) -> Self {
        FileOpError::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// Underlying link failure, if this came from the remote side
    pub fn link_error(&self) -> Option<&LinkError> {
        match self {
            FileOpError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl serde::Serialize for FileOpError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
