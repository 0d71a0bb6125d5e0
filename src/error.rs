use thiserror::Error;

/// Terminal input problems. No retry, no partial result.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("document is encrypted and cannot be processed")]
    EncryptedDocument,
    #[error("no extractable text on any page")]
    NoExtractableText,
}

/// Caller-facing validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at most {max} fields allowed per extraction, got {requested}")]
    TooManyFields { requested: usize, max: usize },
}

/// Failures of the inference collaborator. Retryable variants are retried
/// per call with bounded backoff; exhaustion degrades the enclosing pass
/// to an empty result instead of aborting the run.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("inference service rate limited (status {status})")]
    RateLimited { status: u16 },
    #[error("inference service error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("transport failure calling inference service: {0}")]
    Transport(String),
    #[error("inference response was not usable: {0}")]
    MalformedResponse(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::MalformedResponse(_) => false,
        }
    }
}
