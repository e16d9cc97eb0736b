/// Error types shared across rulebook crates.
///
/// These errors represent failures in infrastructure components (Redis, stored JSON)
/// that sit behind the server's own boundaries. The server crate wraps `CommonError`
/// via `#[from]` and decides how each failure surfaces to callers.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis unavailable")]
    RedisUnavailable,

    #[error("stored record is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
