use thiserror::Error;

/// Errors raised by the file sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The stream is not open yet, or is closing or closed.
    #[error("log stream is not open")]
    StreamUnavailable,

    #[error("log file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
