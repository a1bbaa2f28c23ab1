use thiserror::Error;

/// Queue index errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Unsupported index endpoint: {0}")]
    UnsupportedEndpoint(String),
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}
