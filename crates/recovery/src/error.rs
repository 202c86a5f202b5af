use thiserror::Error;

/// Errors for genuinely unexpected conditions during credential recovery.
///
/// Expected misses (no store directory, no token in a file, an undecryptable
/// candidate) are not errors; those paths return `None` or empty collections
/// and extraction moves on to the next candidate.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no home directory for the current user")]
    NoHomeDir,
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
}
