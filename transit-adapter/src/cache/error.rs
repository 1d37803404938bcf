//! Cache backend error types.

/// Errors from a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The shared backend failed or is unreachable
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A stored value could not be read back as a feed message
    #[error("corrupt cache entry: {0}")]
    Decode(#[from] prost::DecodeError),
}
