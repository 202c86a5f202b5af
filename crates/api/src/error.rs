use thiserror::Error;

/// Typed failures from the rate-limited client.
///
/// The taxonomy deliberately keeps three outcomes distinguishable for
/// callers: transient limits exhausted (`RateLimited`/`Server`), a rejected
/// credential (`Unauthorized`), and everything else.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("rate limited after {attempts} attempts (last retry-after {retry_after}s)")]
    RateLimited { attempts: u32, retry_after: f64 },
    #[error("server error {status} persisted after {attempts} attempts")]
    Server { status: u16, attempts: u32 },
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("credential rejected by the platform")]
    Unauthorized,
    #[error("platform reported an error: {0}")]
    Platform(String),
    #[error("malformed response payload: {0}")]
    Payload(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
