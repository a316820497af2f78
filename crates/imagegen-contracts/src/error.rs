use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerateError>;

/// Every way a single generation run can fail. None of these are retried.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("invalid size '{input}': expected WIDTHxHEIGHT with each side in 1..=4096")]
    InvalidSizeFormat { input: String },

    #[error("API key must be provided via --api-key or the GEMINI_API_KEY environment variable")]
    MissingCredential,

    #[error("prompt cannot be empty")]
    EmptyPrompt,

    /// Body is kept verbatim for diagnostics and never parsed.
    #[error("upstream request failed ({status}): {body}")]
    UpstreamRequestFailed { status: u16, body: String },

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("upstream transport failed: {reason}")]
    Transport { reason: String },

    #[error("response contained no image payload")]
    MissingPayload,

    #[error("response image payload is malformed: {reason}")]
    MalformedPayload { reason: String },

    #[error("image bytes could not be decoded: {reason}")]
    UndecodableImage { reason: String },

    #[error("image could not be encoded: {reason}")]
    EncodeFailed { reason: String },
}

impl GenerateError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
