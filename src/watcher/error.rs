//! Error types for the fragment watch.

use thiserror::Error;

/// Errors from watch operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to connect to {source_name}: {reason}")]
    ConnectFailed { source_name: String, reason: String },

    #[error("Watch stream of {source_name} ended")]
    StreamEnded { source_name: String },

    #[error("Watch task of {source_name} aborted: {reason}")]
    TaskAborted { source_name: String, reason: String },
}

impl From<kube::Error> for WatchError {
    fn from(e: kube::Error) -> Self {
        WatchError::ConnectFailed {
            source_name: "kubernetes".to_string(),
            reason: e.to_string(),
        }
    }
}
