//! Error types for the delta xDS server.

use thiserror::Error;

/// Error type for delta stream processing.
#[derive(Debug, Error)]
pub enum Error {
    /// A watch yielded no response to send.
    #[error("missing response")]
    MissingResponse,

    /// Protocol-level error on the stream, carrying a gRPC status.
    #[error("stream error: {0}")]
    Stream(#[from] tonic::Status),

    /// The client closed the stream.
    #[error("stream closed unexpectedly")]
    StreamClosed,

    /// The cache failed to materialize a response or its versioning data.
    #[error("cache error: {0}")]
    Cache(String),
}

/// Result type alias for delta stream processing.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for tonic::Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Stream(status) => status,
            Error::StreamClosed => tonic::Status::unavailable("stream closed unexpectedly"),
            err => tonic::Status::internal(err.to_string()),
        }
    }
}
