use thiserror::Error;

/// Errors raised inside the formatting layer.
///
/// None of these reach a logging call: every formatter recovers locally and
/// produces a degraded but valid line.
#[derive(Debug, Error)]
pub enum FormatError {
    /// A configured pattern could not be compiled, even as a literal.
    #[error("invalid pattern `{pattern}`: {source}")]
    ConfigInvalid {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A value could not be serialized (cyclic structure, poisoned node).
    #[error("unable to serialize value: {0}")]
    SerializationFailure(String),
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::SerializationFailure(err.to_string())
    }
}
