use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// No codec is registered for the requested content type.
    #[error("no codec registered for content type `{0}`")]
    UnknownContentType(String),

    #[error("failed to encode `{content_type}` payload: {reason}")]
    Encode {
        content_type: &'static str,
        reason: String,
    },

    #[error("failed to decode `{content_type}` payload: {reason}")]
    Decode {
        content_type: &'static str,
        reason: String,
    },

    /// Frame metadata could not be turned back into a qualifier and headers.
    #[error("malformed headers: {0}")]
    Headers(String),
}
